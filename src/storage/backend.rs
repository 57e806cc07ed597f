//! Storage Backend Contract
//!
//! The engine never touches a concrete storage facility. It talks to a
//! [`StorageBackend`]: a synchronous, string-keyed, string-valued namespace
//! with positional enumeration, the same surface a browser exposes for
//! `localStorage` and `sessionStorage`.
//!
//! A namespace is shared: several engines (with different prefixes, or the
//! same prefix) may hold handles to one backend. Writes are last-write-wins.
//!
//! [`MemoryBackend`] is the in-process implementation used by tests, the demo
//! binary and any host without a real web storage facility.

use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Which underlying namespace an engine binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NamespaceKind {
    /// Survives restarts (`localStorage`).
    #[default]
    Persistent,
    /// Scoped to one session (`sessionStorage`).
    Session,
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceKind::Persistent => write!(f, "persistent"),
            NamespaceKind::Session => write!(f, "session"),
        }
    }
}

/// A synchronous key-value namespace.
///
/// # Invariants
///
/// - `key_at(i)` returns `Some` for every `i < len()` and `None` otherwise
/// - the order reported by `key_at` is stable while the namespace is not mutated
/// - `remove` of an absent key succeeds
pub trait StorageBackend: Send + Sync {
    /// Reads the text stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous text.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace refuses the write (e.g. quota).
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the facility is unavailable.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Number of keys in the namespace, across all prefixes.
    fn len(&self) -> usize;

    /// Key at position `index` in enumeration order.
    fn key_at(&self, index: usize) -> Option<String>;

    /// Returns true if the namespace holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every key in the namespace.
    fn keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|i| self.key_at(i)).collect()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, String>,
    used_bytes: usize,
}

/// An in-memory namespace.
///
/// Cloning yields another handle to the *same* namespace, which is how
/// several engines are made to share one.
///
/// # Example
///
/// ```
/// use flashstore::storage::{MemoryBackend, StorageBackend};
///
/// let backend = MemoryBackend::new();
/// let shared = backend.clone();
/// backend.set("k", "v").unwrap();
/// assert_eq!(shared.get("k").as_deref(), Some("v"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    /// Maximum key+value bytes the namespace will hold (None = unlimited)
    quota: Option<usize>,
}

impl MemoryBackend {
    /// Creates an empty, unbounded namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty namespace that rejects writes beyond `quota` bytes.
    ///
    /// Usage is measured as the byte length of every key plus its value,
    /// which is close to how browsers account for web storage.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            state: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.read(|state| state.used_bytes)
    }

    /// Removes every key, regardless of prefix.
    pub fn wipe(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.used_bytes = 0;
    }

    fn read<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.read(|state| state.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let replaced = state
            .entries
            .get(key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        let needed = key.len() + value.len();
        let after = state.used_bytes - replaced + needed;

        if let Some(quota) = self.quota {
            if after > quota {
                return Err(StorageError::QuotaExceeded {
                    needed,
                    available: quota.saturating_sub(state.used_bytes - replaced),
                });
            }
        }

        state.entries.insert(key.to_string(), value.to_string());
        state.used_bytes = after;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = state.entries.remove(key) {
            state.used_bytes -= key.len() + old.len();
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.read(|state| state.entries.len())
    }

    fn key_at(&self, index: usize) -> Option<String> {
        self.read(|state| state.entries.keys().nth(index).cloned())
    }

    fn keys(&self) -> Vec<String> {
        self.read(|state| state.entries.keys().cloned().collect())
    }
}

/// The two namespaces a host offers: one persistent, one per session.
#[derive(Clone)]
pub struct Namespaces {
    persistent: Arc<dyn StorageBackend>,
    session: Arc<dyn StorageBackend>,
}

impl fmt::Debug for Namespaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespaces")
            .field("persistent_keys", &self.persistent.len())
            .field("session_keys", &self.session.len())
            .finish()
    }
}

impl Namespaces {
    pub fn new(persistent: Arc<dyn StorageBackend>, session: Arc<dyn StorageBackend>) -> Self {
        Self {
            persistent,
            session,
        }
    }

    /// Two fresh, independent in-memory namespaces.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
        )
    }

    /// Returns a handle to the namespace of the given kind.
    pub fn select(&self, kind: NamespaceKind) -> Arc<dyn StorageBackend> {
        match kind {
            NamespaceKind::Persistent => Arc::clone(&self.persistent),
            NamespaceKind::Session => Arc::clone(&self.session),
        }
    }
}
