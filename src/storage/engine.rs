//! Web Storage Engine with Expiry Support
//!
//! This module implements the core of FlashStore: a typed wrapper around one
//! synchronous key-value namespace that adds per-item expiry, key prefixes,
//! optional obfuscation and change events.
//!
//! ## Design Decisions
//!
//! 1. **Envelopes**: Every item is stored as `{value, expires, created}` text.
//! 2. **Lazy Expiry**: Items are checked for expiry on access, plus a sweep on
//!    construction and an optional background sweeper.
//! 3. **Prefix Scoping**: The engine never reads, lists or deletes a key that
//!    lacks its prefix.
//! 4. **Total Operations**: No failure escapes. Faults become `false`, `None`
//!    or a count, and are logged.
//!
//! ## Data Flow
//!
//! ```text
//! caller ──> WebStorage ──> codec ──> StorageBackend
//!                │
//!                └──> ListenerRegistry ──> listeners (synchronous)
//! ```
//!
//! ## Known Hazards
//!
//! - Enumerating operations (`clear`, `clear_expired`, `keys`, `get_stats`)
//!   snapshot the key list first. Writes made in between, for instance by a
//!   listener that calls back into the engine, may or may not be seen.
//! - A prefix that is itself a prefix of another engine's prefix on the same
//!   namespace (`"app-"` vs `"app-v2-"`) makes the shorter one enumerate and
//!   clear the longer one's keys. Delimited prefixes do not prevent this.

use crate::codec::{self, Envelope, Value};
use crate::config::{Lifetime, SetOptions, StorageOptions};
use crate::error::StorageResult;
use crate::events::{EventKind, Listener, ListenerRegistry, StorageEvent};
use crate::storage::backend::{NamespaceKind, Namespaces, StorageBackend};
use crate::storage::expiry::{has_expired, to_absolute, Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of reading one full key.
enum Lookup {
    /// Nothing usable under the key (absent, undecodable or malformed).
    Missing,
    /// The item had expired and has been deleted.
    Evicted,
    /// A live item.
    Live(Envelope),
}

/// Snapshot of the items under one prefix.
///
/// `total == expired + valid` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of prefixed keys
    pub total: usize,
    /// Keys whose envelope has expired but not yet been evicted
    pub expired: usize,
    /// Keys that are live, or whose shape is unknown
    pub valid: usize,
    /// Byte length of every prefixed key plus its stored text
    pub used_bytes: usize,
}

/// A storage engine bound to one namespace and one prefix.
///
/// # Thread Safety
///
/// All operations take `&self`; the engine can be wrapped in an `Arc` and
/// shared. Operations are not atomic with respect to each other: two writers
/// to the same key follow last-write-wins.
///
/// # Example
///
/// ```
/// use flashstore::config::{SetOptions, StorageOptions};
/// use flashstore::storage::{MemoryBackend, WebStorage};
/// use flashstore::Value;
/// use std::time::Duration;
///
/// let storage = WebStorage::new(MemoryBackend::new(), StorageOptions::default().with_prefix("app:"));
///
/// assert!(storage.set("name", "Ariz", SetOptions::default()));
/// assert_eq!(storage.get("name", None), Some(Value::from("Ariz")));
///
/// // Set with expiry
/// storage.set("session", "abc123", SetOptions::expires_in(Duration::from_secs(60)));
/// assert!(storage.has("session"));
/// ```
pub struct WebStorage {
    /// The namespace all full keys live in
    backend: Arc<dyn StorageBackend>,

    /// Resolved configuration, immutable after construction
    options: StorageOptions,

    /// Wall-clock source for expiry and event timestamps
    clock: Arc<dyn Clock>,

    /// Event listeners by kind
    listeners: ListenerRegistry,
}

impl fmt::Debug for WebStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebStorage")
            .field("namespace", &self.options.namespace)
            .field("prefix", &self.options.key_prefix)
            .field("obfuscate", &self.options.obfuscate)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl WebStorage {
    /// Creates an engine over `backend` using the system clock.
    ///
    /// Sweeps expired items under the prefix before returning.
    pub fn new(backend: impl StorageBackend + 'static, options: StorageOptions) -> Self {
        Self::with_clock(backend, options, Arc::new(SystemClock))
    }

    /// Creates an engine over the namespace `options.namespace` selects.
    pub fn open(namespaces: &Namespaces, options: StorageOptions) -> Self {
        Self::from_parts(
            namespaces.select(options.namespace),
            options,
            Arc::new(SystemClock),
        )
    }

    /// Creates an engine with an explicit clock.
    pub fn with_clock(
        backend: impl StorageBackend + 'static,
        options: StorageOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_parts(Arc::new(backend), options, clock)
    }

    /// Creates an engine from an already shared backend handle.
    pub fn from_parts(
        backend: Arc<dyn StorageBackend>,
        options: StorageOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if !options.prefix_is_delimited() {
            warn!(
                prefix = %options.key_prefix,
                "Key prefix has no trailing delimiter; enumeration may include foreign keys"
            );
        }

        let engine = Self {
            backend,
            options,
            clock,
            listeners: ListenerRegistry::new(),
        };

        let swept = engine.clear_expired();
        debug!(
            namespace = %engine.options.namespace,
            prefix = %engine.options.key_prefix,
            swept = swept,
            "Storage engine ready"
        );
        engine
    }

    /// The resolved options.
    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    pub fn namespace(&self) -> NamespaceKind {
        self.options.namespace
    }

    #[inline]
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.options.key_prefix, key)
    }

    #[inline]
    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Full keys in the namespace that carry this engine's prefix.
    fn prefixed_keys(&self) -> Vec<String> {
        let prefix = &self.options.key_prefix;
        self.backend
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix.as_str()))
            .collect()
    }

    fn decode(&self, text: &str) -> StorageResult<Envelope> {
        codec::decode_envelope(text, &self.options.obfuscation_key)
    }

    fn emit(&self, event: StorageEvent) {
        self.listeners.emit(&event);
    }

    /// Reads a full key, evicting it if expired.
    ///
    /// Emits nothing; callers decide which event an eviction produces.
    fn lookup(&self, full_key: &str) -> Lookup {
        let Some(text) = self.backend.get(full_key) else {
            return Lookup::Missing;
        };

        let envelope = match self.decode(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(key = %full_key, error = %err, "Ignoring undecodable item");
                return Lookup::Missing;
            }
        };

        if has_expired(envelope.expires, self.now()) {
            if let Err(err) = self.backend.remove(full_key) {
                warn!(key = %full_key, error = %err, "Failed to evict expired item");
            }
            trace!(key = %full_key, "Evicted expired item");
            return Lookup::Evicted;
        }

        Lookup::Live(envelope)
    }

    /// Stores `value` under `key`.
    ///
    /// The expiry comes from `overrides.lifetime`, falling back to the
    /// configured default. Obfuscation likewise. Returns `false` if the namespace
    /// rejects the write (e.g. quota exceeded).
    pub fn set(&self, key: &str, value: impl Into<Value>, overrides: SetOptions) -> bool {
        let value = value.into();
        let created = self.now();
        let duration = match overrides.lifetime {
            Lifetime::Default => self.options.default_duration.filter(|d| !d.is_zero()),
            Lifetime::Expires(duration) => Some(duration),
            Lifetime::Never => None,
        };
        let obfuscate = overrides.obfuscate.unwrap_or(self.options.obfuscate);

        let envelope = Envelope::new(value.deep_clone(), created, to_absolute(duration, created));
        let full_key = self.full_key(key);

        let written = codec::serialize(&envelope, obfuscate, &self.options.obfuscation_key)
            .and_then(|text| self.backend.set(&full_key, &text));

        if let Err(err) = written {
            warn!(key = %full_key, error = %err, "Failed to store item");
            return false;
        }

        self.emit(StorageEvent::Set {
            key: key.to_string(),
            value,
            timestamp: self.now(),
        });
        true
    }

    /// Serializes `value` with serde and stores it.
    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T, overrides: SetOptions) -> bool {
        match Value::from_typed(value) {
            Ok(value) => self.set(key, value, overrides),
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to convert item for storage");
                false
            }
        }
    }

    /// Gets the value for `key`, or `default` if there is no live item.
    ///
    /// Absent, undecodable and malformed items all count as missing. An
    /// expired item is deleted and reported with an `Expired` event.
    pub fn get(&self, key: &str, default: Option<Value>) -> Option<Value> {
        match self.lookup(&self.full_key(key)) {
            Lookup::Missing => default,
            Lookup::Evicted => {
                self.emit(StorageEvent::Expired {
                    key: key.to_string(),
                    timestamp: self.now(),
                });
                default
            }
            Lookup::Live(envelope) => {
                let result = envelope.value.deep_clone();
                self.emit(StorageEvent::Get {
                    key: key.to_string(),
                    value: envelope.value,
                    timestamp: self.now(),
                });
                Some(result)
            }
        }
    }

    /// Gets the value for `key` and deserializes it with serde.
    ///
    /// Returns `None` if the item is missing or has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key, None)?;
        match value.to_typed() {
            Ok(typed) => Some(typed),
            Err(err) => {
                debug!(key = %key, error = %err, "Stored item does not match requested type");
                None
            }
        }
    }

    /// Checks if a live item exists under `key`.
    ///
    /// Evicts the item if it has expired, without emitting any event.
    pub fn has(&self, key: &str) -> bool {
        matches!(self.lookup(&self.full_key(key)), Lookup::Live(_))
    }

    /// Removes `key`. Removing an absent key succeeds.
    pub fn remove(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        if let Err(err) = self.backend.remove(&full_key) {
            warn!(key = %full_key, error = %err, "Failed to remove item");
            return false;
        }

        self.emit(StorageEvent::Remove {
            key: key.to_string(),
            timestamp: self.now(),
        });
        true
    }

    /// Removes every key carrying this engine's prefix.
    ///
    /// Emits a single `Clear` event once all deletions succeeded.
    pub fn clear(&self) -> bool {
        let mut ok = true;
        let mut removed = 0usize;

        for full_key in self.prefixed_keys() {
            match self.backend.remove(&full_key) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(key = %full_key, error = %err, "Failed to remove item during clear");
                    ok = false;
                }
            }
        }

        debug!(prefix = %self.options.key_prefix, removed = removed, "Cleared storage");

        if ok {
            self.emit(StorageEvent::Clear {
                timestamp: self.now(),
            });
        }
        ok
    }

    /// Deletes every expired item under the prefix.
    ///
    /// Items that cannot be decoded are left alone. Emits one
    /// `ExpiredSweep` event when anything was deleted.
    ///
    /// # Returns
    ///
    /// Returns the number of items that were deleted.
    pub fn clear_expired(&self) -> usize {
        let now = self.now();
        let mut cleaned = 0usize;

        for full_key in self.prefixed_keys() {
            let Some(text) = self.backend.get(&full_key) else {
                continue;
            };
            let Ok(envelope) = self.decode(&text) else {
                continue;
            };
            if !has_expired(envelope.expires, now) {
                continue;
            }
            match self.backend.remove(&full_key) {
                Ok(()) => cleaned += 1,
                Err(err) => warn!(key = %full_key, error = %err, "Failed to evict expired item"),
            }
        }

        if cleaned > 0 {
            self.emit(StorageEvent::ExpiredSweep {
                count: cleaned,
                timestamp: self.now(),
            });
        }
        cleaned
    }

    /// Returns the logical keys of all live items.
    ///
    /// Every candidate goes through [`has`](Self::has), so expired items
    /// met along the way are evicted.
    pub fn keys(&self) -> Vec<String> {
        let prefix_len = self.options.key_prefix.len();
        self.prefixed_keys()
            .into_iter()
            .map(|full_key| full_key[prefix_len..].to_string())
            .filter(|key| self.has(key))
            .collect()
    }

    /// Returns the number of prefixed keys, live or not.
    pub fn len(&self) -> usize {
        self.prefixed_keys().len()
    }

    /// Returns true if no key carries this engine's prefix.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counts items under the prefix without evicting anything.
    ///
    /// Items that do not decode as an envelope are counted as valid.
    pub fn get_stats(&self) -> StorageStats {
        let now = self.now();
        let mut stats = StorageStats::default();

        for full_key in self.prefixed_keys() {
            let Some(text) = self.backend.get(&full_key) else {
                continue;
            };
            stats.total += 1;
            stats.used_bytes += full_key.len() + text.len();

            match self.decode(&text) {
                Ok(envelope) if has_expired(envelope.expires, now) => stats.expired += 1,
                _ => stats.valid += 1,
            }
        }

        stats
    }

    /// Registers `listener` for events of `kind`.
    ///
    /// Registering the same listener twice has no effect.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        if !self.listeners.add(kind, listener) {
            trace!(kind = %kind, "Listener already registered");
        }
    }

    /// Deregisters `listener` from `kind`. Unknown listeners are ignored.
    pub fn off(&self, kind: EventKind, listener: &Listener) {
        self.listeners.remove(kind, listener);
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.count(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::events::listener;
    use crate::storage::backend::MemoryBackend;
    use crate::storage::expiry::ManualClock;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    const START: i64 = 1_700_000_000_000;

    /// Memory namespace whose deletes fail for a fixed set of full keys.
    #[derive(Debug, Clone)]
    struct FailingBackend {
        inner: MemoryBackend,
        locked: Arc<HashSet<String>>,
    }

    impl FailingBackend {
        fn new(inner: &MemoryBackend, locked: &[&str]) -> Self {
            Self {
                inner: inner.clone(),
                locked: Arc::new(locked.iter().map(|k| k.to_string()).collect()),
            }
        }
    }

    impl StorageBackend for FailingBackend {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            if self.locked.contains(key) {
                return Err(StorageError::Unavailable(format!("{} is locked", key)));
            }
            self.inner.remove(key)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn key_at(&self, index: usize) -> Option<String> {
            self.inner.key_at(index)
        }
    }

    fn engine_on(backend: &MemoryBackend, prefix: &str, clock: &ManualClock) -> WebStorage {
        WebStorage::with_clock(
            backend.clone(),
            StorageOptions::default().with_prefix(prefix),
            Arc::new(clock.clone()),
        )
    }

    fn setup() -> (WebStorage, MemoryBackend, ManualClock) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        (engine_on(&backend, "t-", &clock), backend, clock)
    }

    fn record(engine: &WebStorage, kind: EventKind) -> Arc<Mutex<Vec<StorageEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.on(
            kind,
            listener(move |event| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            }),
        );
        seen
    }

    #[test]
    fn test_set_and_get() {
        let (engine, _, _) = setup();

        assert!(engine.set("key", "value", SetOptions::default()));
        assert_eq!(engine.get("key", None), Some(Value::from("value")));
    }

    #[test]
    fn test_get_nonexistent_uses_default() {
        let (engine, _, _) = setup();
        assert_eq!(engine.get("nope", None), None);
        assert_eq!(
            engine.get("nope", Some(Value::from(5))),
            Some(Value::from(5))
        );
    }

    #[test]
    fn test_full_key_and_envelope_on_backend() {
        let (engine, backend, _) = setup();
        engine.set("a", 1, SetOptions::default());

        let raw = backend.get("t-a").unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["value"], 1);
        assert_eq!(json["expires"], serde_json::Value::Null);
        assert_eq!(json["created"], START);
    }

    #[test]
    fn test_expiry_boundary() {
        let (engine, backend, clock) = setup();
        engine.set("b", "x", SetOptions::expires_in(Duration::from_millis(1000)));

        clock.advance(Duration::from_millis(999));
        assert_eq!(engine.get("b", None), Some(Value::from("x")));

        clock.advance(Duration::from_millis(1));
        assert!(engine.has("b"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(engine.get("b", None), None);
        assert!(backend.get("t-b").is_none());
    }

    #[test]
    fn test_zero_duration_expires_at_write_time() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let engine = WebStorage::with_clock(
            backend.clone(),
            StorageOptions::default()
                .with_prefix("z:")
                .with_default_duration(Duration::from_secs(10)),
            Arc::new(clock.clone()),
        );

        assert!(engine.set("z", 1, SetOptions::expires_in(Duration::ZERO)));
        let env = codec::decode_envelope(&backend.get("z:z").unwrap(), "").unwrap();
        assert_eq!(env.expires, Some(START));
        assert_eq!(engine.get("z", None), Some(Value::from(1)));

        clock.advance(Duration::from_millis(1));
        assert_eq!(engine.get("z", None), None);
        assert!(backend.get("z:z").is_none());
    }

    #[test]
    fn test_default_duration_and_override() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let engine = WebStorage::with_clock(
            backend.clone(),
            StorageOptions::default()
                .with_prefix("d:")
                .with_default_duration(Duration::from_secs(10)),
            Arc::new(clock.clone()),
        );

        engine.set("short", 1, SetOptions::default());
        engine.set("forever", 2, SetOptions::never_expires());
        engine.set("long", 3, SetOptions::expires_in(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(11));
        assert!(!engine.has("short"));
        assert!(engine.has("forever"));
        assert!(engine.has("long"));
    }

    #[test]
    fn test_created_is_write_time() {
        let (engine, backend, clock) = setup();
        clock.advance(Duration::from_secs(5));
        engine.set("late", true, SetOptions::expires_in(Duration::from_secs(1)));

        let env = codec::decode_envelope(&backend.get("t-late").unwrap(), "").unwrap();
        assert_eq!(env.created, START + 5_000);
        assert_eq!(env.expires, Some(START + 6_000));
    }

    #[test]
    fn test_undecodable_and_malformed_count_as_absent() {
        let (engine, backend, _) = setup();
        backend.set("t-junk", "not json at all").unwrap();
        backend.set("t-shape", r#"{"created": 1}"#).unwrap();

        assert_eq!(engine.get("junk", Some(Value::from("d"))), Some(Value::from("d")));
        assert!(!engine.has("shape"));
        // Nothing proves them expired, so they stay
        assert!(backend.get("t-junk").is_some());
        assert!(backend.get("t-shape").is_some());
    }

    #[test]
    fn test_obfuscated_items() {
        let backend = MemoryBackend::new();
        let engine = WebStorage::new(
            backend.clone(),
            StorageOptions::default()
                .with_prefix("o:")
                .with_obfuscation(true)
                .with_obfuscation_key("k3y"),
        );

        engine.set("secret", "hidden text", SetOptions::default());
        engine.set("plain", "visible text", SetOptions::default().obfuscated(false));

        assert!(!backend.get("o:secret").unwrap().contains("hidden"));
        assert!(backend.get("o:plain").unwrap().contains("visible"));
        assert_eq!(engine.get("secret", None), Some(Value::from("hidden text")));
        assert_eq!(engine.get("plain", None), Some(Value::from("visible text")));
    }

    #[test]
    fn test_remove() {
        let (engine, _, _) = setup();
        engine.set("key", "value", SetOptions::default());
        assert!(engine.remove("key"));
        assert_eq!(engine.get("key", None), None);
        // Already gone
        assert!(engine.remove("key"));
    }

    #[test]
    fn test_remove_failure_returns_false_without_event() {
        let memory = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let engine = WebStorage::with_clock(
            FailingBackend::new(&memory, &["f-stuck"]),
            StorageOptions::default().with_prefix("f-"),
            Arc::new(clock.clone()),
        );
        let removes = record(&engine, EventKind::Remove);

        engine.set("stuck", 1, SetOptions::default());
        assert!(!engine.remove("stuck"));
        assert!(removes.lock().unwrap().is_empty());
        assert!(engine.has("stuck"));
    }

    #[test]
    fn test_clear_failure_keeps_going_without_event() {
        let memory = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let engine = WebStorage::with_clock(
            FailingBackend::new(&memory, &["f-stuck"]),
            StorageOptions::default().with_prefix("f-"),
            Arc::new(clock.clone()),
        );
        let clears = record(&engine, EventKind::Clear);

        engine.set("a", 1, SetOptions::default());
        engine.set("stuck", 2, SetOptions::default());
        engine.set("b", 3, SetOptions::default());

        assert!(!engine.clear());
        assert!(clears.lock().unwrap().is_empty());
        assert_eq!(engine.keys(), vec!["stuck".to_string()]);
        assert!(memory.get("f-a").is_none());
        assert!(memory.get("f-b").is_none());
    }

    #[test]
    fn test_clear_is_prefix_scoped() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let a = engine_on(&backend, "a-", &clock);
        let b = engine_on(&backend, "b-", &clock);
        backend.set("foreign", "untouched").unwrap();

        a.set("k1", 1, SetOptions::default());
        b.set("k2", 2, SetOptions::default());

        assert!(a.clear());
        assert!(!a.has("k1"));
        assert!(b.has("k2"));
        assert_eq!(backend.get("foreign").as_deref(), Some("untouched"));
    }

    #[test]
    fn test_clear_expired_counts_and_skips_junk() {
        let (engine, backend, clock) = setup();
        let expired = record(&engine, EventKind::Expired);

        engine.set("a", 1, SetOptions::expires_in(Duration::from_millis(10)));
        engine.set("b", 2, SetOptions::expires_in(Duration::from_millis(10)));
        engine.set("c", 3, SetOptions::default());
        backend.set("t-junk", "???").unwrap();

        assert_eq!(engine.clear_expired(), 0);
        clock.advance(Duration::from_millis(11));
        assert_eq!(engine.clear_expired(), 2);

        assert!(backend.get("t-junk").is_some());
        assert_eq!(engine.len(), 2);

        let events = expired.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StorageEvent::ExpiredSweep { count: 2, .. }));
    }

    #[test]
    fn test_construction_sweeps_stale_items() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(START);
        let first = engine_on(&backend, "s:", &clock);
        first.set("old", 1, SetOptions::expires_in(Duration::from_secs(1)));
        first.set("keep", 2, SetOptions::default());

        clock.advance(Duration::from_secs(2));
        let _second = engine_on(&backend, "s:", &clock);

        assert!(backend.get("s:old").is_none());
        assert!(backend.get("s:keep").is_some());
    }

    #[test]
    fn test_keys_lists_live_items_only() {
        let (engine, backend, clock) = setup();
        engine.set("live", 1, SetOptions::default());
        engine.set("dying", 2, SetOptions::expires_in(Duration::from_millis(5)));
        backend.set("other-prefix", "x").unwrap();

        clock.advance(Duration::from_millis(6));
        let mut keys = engine.keys();
        keys.sort();
        assert_eq!(keys, vec!["live".to_string()]);
        // The expired one was evicted on the way
        assert!(backend.get("t-dying").is_none());
    }

    #[test]
    fn test_stats() {
        let (engine, backend, clock) = setup();
        engine.set("b", "x", SetOptions::expires_in(Duration::from_millis(1000)));

        let before = engine.get_stats();
        assert_eq!((before.total, before.valid, before.expired), (1, 1, 0));
        let raw = backend.get("t-b").unwrap();
        assert_eq!(before.used_bytes, "t-b".len() + raw.len());

        clock.advance(Duration::from_millis(1001));
        let after = engine.get_stats();
        assert_eq!((after.total, after.valid, after.expired), (1, 0, 1));

        backend.set("t-junk", "garbage").unwrap();
        let with_junk = engine.get_stats();
        assert_eq!(with_junk.total, 2);
        assert_eq!(with_junk.valid, 1);
        assert_eq!(with_junk.total, with_junk.expired + with_junk.valid);
    }

    #[test]
    fn test_set_failure_returns_false() {
        let backend = MemoryBackend::with_quota(16);
        let engine = WebStorage::new(backend, StorageOptions::default().with_prefix("q:"));
        let sets = record(&engine, EventKind::Set);

        assert!(!engine.set("big", "x".repeat(100), SetOptions::default()));
        assert!(sets.lock().unwrap().is_empty());
        assert!(!engine.has("big"));
    }

    #[test]
    fn test_events_per_operation() {
        let (engine, _, clock) = setup();
        let sets = record(&engine, EventKind::Set);
        let gets = record(&engine, EventKind::Get);
        let removes = record(&engine, EventKind::Remove);
        let clears = record(&engine, EventKind::Clear);
        let expired = record(&engine, EventKind::Expired);

        engine.set("a", 1, SetOptions::default());
        engine.get("a", None);
        engine.has("a");
        engine.remove("a");
        engine.set("x", 1, SetOptions::default());
        engine.set("y", 2, SetOptions::default());
        engine.clear();

        engine.set("e", 1, SetOptions::expires_in(Duration::from_millis(1)));
        clock.advance(Duration::from_millis(2));
        assert!(!engine.has("e"));
        engine.get("e", None);

        assert_eq!(sets.lock().unwrap().len(), 4);
        assert_eq!(gets.lock().unwrap().len(), 1);
        assert_eq!(removes.lock().unwrap().len(), 1);
        assert_eq!(clears.lock().unwrap().len(), 1);
        // `has` evicted silently, so `get` found nothing to report
        assert!(expired.lock().unwrap().is_empty());

        let set_events = sets.lock().unwrap();
        assert_eq!(set_events[0].key(), Some("a"));
        assert_eq!(set_events[0].value(), Some(&Value::from(1)));
        assert_eq!(set_events[0].timestamp(), START);
    }

    #[test]
    fn test_expired_event_on_get() {
        let (engine, _, clock) = setup();
        let expired = record(&engine, EventKind::Expired);

        engine.set("e", 1, SetOptions::expires_in(Duration::from_millis(1)));
        clock.advance(Duration::from_millis(2));
        assert_eq!(engine.get("e", None), None);
        assert_eq!(engine.get("e", None), None);

        let events = expired.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key(), Some("e"));
    }

    #[test]
    fn test_off_stops_delivery() {
        let (engine, _, _) = setup();
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let l = listener(move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        engine.on(EventKind::Set, Arc::clone(&l));
        engine.on(EventKind::Set, Arc::clone(&l));
        engine.set("a", 1, SetOptions::default());
        engine.off(EventKind::Set, &l);
        engine.off(EventKind::Set, &l);
        engine.set("a", 2, SetOptions::default());

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(engine.listener_count(EventKind::Set), 0);
    }

    #[test]
    fn test_failing_listener_does_not_break_set() {
        let (engine, _, _) = setup();
        engine.on(EventKind::Set, listener(|_| anyhow::bail!("listener exploded")));
        let sets = record(&engine, EventKind::Set);

        assert!(engine.set("a", 1, SetOptions::default()));
        assert_eq!(sets.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_can_reenter_engine() {
        let backend = MemoryBackend::new();
        let engine = Arc::new(WebStorage::new(backend, StorageOptions::default().with_prefix("r:")));
        let weak = Arc::downgrade(&engine);

        engine.on(
            EventKind::Set,
            listener(move |event| {
                if let (Some(engine), Some("source")) = (weak.upgrade(), event.key()) {
                    engine.set("mirror", event.value().cloned().unwrap_or_default(), SetOptions::default());
                }
                Ok(())
            }),
        );

        engine.set("source", "copied", SetOptions::default());
        assert_eq!(engine.get("mirror", None), Some(Value::from("copied")));
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Cart {
            items: Vec<String>,
            total: i64,
        }

        let (engine, _, _) = setup();
        let cart = Cart {
            items: vec!["apple".into()],
            total: 3,
        };
        assert!(engine.set_as("cart", &cart, SetOptions::default()));
        assert_eq!(engine.get_as::<Cart>("cart"), Some(cart));

        engine.set("number", 5, SetOptions::default());
        assert_eq!(engine.get_as::<Cart>("number"), None);
    }

    #[test]
    fn test_object_shaped_like_date_is_not_a_date() {
        let (engine, _, _) = setup();
        let lookalike = Value::object([("$date", Value::from(5))]);

        engine.set("d", lookalike.clone(), SetOptions::default());
        assert_eq!(engine.get("d", None), Some(lookalike.clone()));

        engine.set("d", lookalike.clone(), SetOptions::default().obfuscated(true));
        assert_eq!(engine.get("d", None), Some(lookalike));
        assert_ne!(engine.get("d", None), Some(Value::Date(5)));
    }

    #[test]
    fn test_returned_value_is_a_copy() {
        let (engine, _, _) = setup();
        let original = Value::object([("n", Value::from(1))]);
        engine.set("obj", original.clone(), SetOptions::default());

        let mut first = engine.get("obj", None).unwrap();
        if let Value::Object(map) = &mut first {
            map.insert("n".into(), Value::from(99));
        }
        assert_eq!(engine.get("obj", None), Some(original));
    }
}
