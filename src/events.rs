//! Storage Events
//!
//! Every mutation (and every successful read) of a [`WebStorage`] produces
//! one [`StorageEvent`], delivered synchronously to the listeners registered
//! for its [`EventKind`] before the triggering call returns.
//!
//! ## Delivery Rules
//!
//! - A listener is registered at most once per kind (identity is the `Arc`)
//! - A listener returning `Err` is logged and skipped; the others still run
//! - Listeners are called outside the registry lock, so a listener may call
//!   back into the engine or (de)register listeners
//!
//! [`WebStorage`]: crate::storage::WebStorage

use crate::codec::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// The kinds of event a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Set,
    Get,
    Remove,
    Clear,
    Expired,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Set => "set",
            EventKind::Get => "get",
            EventKind::Remove => "remove",
            EventKind::Clear => "clear",
            EventKind::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A notification about one storage operation.
///
/// Keys are logical keys (without the engine prefix). Timestamps are
/// milliseconds since the Unix epoch, taken at emission.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    /// A value was written. Carries the value the caller passed in.
    Set {
        key: String,
        value: Value,
        timestamp: i64,
    },
    /// A live value was read.
    Get {
        key: String,
        value: Value,
        timestamp: i64,
    },
    /// A key was removed on request.
    Remove { key: String, timestamp: i64 },
    /// Every key under the prefix was removed.
    Clear { timestamp: i64 },
    /// One key was found expired on access and evicted.
    Expired { key: String, timestamp: i64 },
    /// A sweep evicted `count` expired keys.
    ExpiredSweep { count: usize, timestamp: i64 },
}

impl StorageEvent {
    /// The kind listeners subscribe to for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            StorageEvent::Set { .. } => EventKind::Set,
            StorageEvent::Get { .. } => EventKind::Get,
            StorageEvent::Remove { .. } => EventKind::Remove,
            StorageEvent::Clear { .. } => EventKind::Clear,
            StorageEvent::Expired { .. } | StorageEvent::ExpiredSweep { .. } => EventKind::Expired,
        }
    }

    /// The logical key, for per-key events.
    pub fn key(&self) -> Option<&str> {
        match self {
            StorageEvent::Set { key, .. }
            | StorageEvent::Get { key, .. }
            | StorageEvent::Remove { key, .. }
            | StorageEvent::Expired { key, .. } => Some(key),
            StorageEvent::Clear { .. } | StorageEvent::ExpiredSweep { .. } => None,
        }
    }

    /// The value, for `Set` and `Get`.
    pub fn value(&self) -> Option<&Value> {
        match self {
            StorageEvent::Set { value, .. } | StorageEvent::Get { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            StorageEvent::Set { timestamp, .. }
            | StorageEvent::Get { timestamp, .. }
            | StorageEvent::Remove { timestamp, .. }
            | StorageEvent::Clear { timestamp }
            | StorageEvent::Expired { timestamp, .. }
            | StorageEvent::ExpiredSweep { timestamp, .. } => *timestamp,
        }
    }
}

/// A callback invoked for each event of the kinds it is registered for.
pub type Listener = Arc<dyn Fn(&StorageEvent) -> anyhow::Result<()> + Send + Sync>;

/// Wraps a closure as a [`Listener`].
///
/// Keep the returned `Arc` around: it is the handle `off` needs.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&StorageEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Listeners grouped by event kind.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kind`.
    ///
    /// Returns `false` if that exact listener was already registered.
    pub fn add(&self, kind: EventKind, listener: Listener) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let slot = listeners.entry(kind).or_default();
        if slot.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        slot.push(listener);
        true
    }

    /// Deregisters `listener` from `kind`. Returns `false` if it was not registered.
    pub fn remove(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|l| !Arc::ptr_eq(l, listener));
        let removed = slot.len() != before;
        if slot.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Number of listeners registered for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Delivers `event` to every listener of its kind.
    ///
    /// Returns the number of listeners that failed.
    pub fn emit(&self, event: &StorageEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            match listeners.get(&kind) {
                Some(slot) => slot.clone(),
                None => return 0,
            }
        };

        let mut failures = 0;
        for listener in snapshot {
            if let Err(err) = listener(event) {
                failures += 1;
                warn!(kind = %kind, key = ?event.key(), error = %err, "Storage event listener failed");
            }
        }
        failures
    }
}
