//! Reactive Bindings
//!
//! A [`StorageBinding`] mirrors one key of a [`WebStorage`] into a
//! `tokio::sync::watch` channel, which serves as the observable cell. UI
//! code subscribes to the channel and writes back through the binding.
//!
//! ```text
//!  binding.set(v) ──> WebStorage::set ──> Set event ──┐
//!                                                     ▼
//!  other writers ──> WebStorage ──> events ──> binding listener ──> watch cell ──> subscribers
//! ```
//!
//! The engine knows nothing about bindings: the binding registers an
//! ordinary event listener and removes it again on [`teardown`], or when
//! dropped. The engine stays fully usable afterwards.
//!
//! [`teardown`]: StorageBinding::teardown

use crate::codec::Value;
use crate::config::SetOptions;
use crate::events::{listener, EventKind, Listener, StorageEvent};
use crate::storage::WebStorage;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::trace;

/// Event kinds that can change the bound value.
const MIRRORED: [EventKind; 4] = [
    EventKind::Set,
    EventKind::Remove,
    EventKind::Clear,
    EventKind::Expired,
];

/// Two-way link between one stored key and a watch cell.
///
/// # Example
///
/// ```
/// use flashstore::binding::StorageBinding;
/// use flashstore::config::StorageOptions;
/// use flashstore::storage::{MemoryBackend, WebStorage};
/// use flashstore::Value;
/// use std::sync::Arc;
///
/// let engine = Arc::new(WebStorage::new(MemoryBackend::new(), StorageOptions::default()));
/// let theme = StorageBinding::new(Arc::clone(&engine), "theme", Some(Value::from("light")));
/// let rx = theme.subscribe();
///
/// theme.set("dark");
/// assert_eq!(*rx.borrow(), Some(Value::from("dark")));
/// assert_eq!(engine.get("theme", None), Some(Value::from("dark")));
///
/// theme.teardown();
/// ```
pub struct StorageBinding {
    engine: Arc<WebStorage>,
    key: String,
    default: Option<Value>,
    options: SetOptions,
    cell: Arc<watch::Sender<Option<Value>>>,
    listener: Listener,
    attached: bool,
}

impl std::fmt::Debug for StorageBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageBinding")
            .field("key", &self.key)
            .field("value", &*self.cell.borrow())
            .field("attached", &self.attached)
            .finish()
    }
}

impl StorageBinding {
    /// Binds `key`, seeding the cell with the stored value or `default`.
    pub fn new(engine: Arc<WebStorage>, key: impl Into<String>, default: Option<Value>) -> Self {
        Self::with_options(engine, key, default, SetOptions::default())
    }

    /// Like [`new`](Self::new), with options applied to every write.
    pub fn with_options(
        engine: Arc<WebStorage>,
        key: impl Into<String>,
        default: Option<Value>,
        options: SetOptions,
    ) -> Self {
        let key = key.into();
        let initial = engine.get(&key, default.clone());
        let (tx, _) = watch::channel(initial);
        let cell = Arc::new(tx);

        let listener = mirror_listener(
            Arc::downgrade(&engine),
            key.clone(),
            default.clone(),
            Arc::clone(&cell),
        );
        for kind in MIRRORED {
            engine.on(kind, Arc::clone(&listener));
        }

        Self {
            engine,
            key,
            default,
            options,
            cell,
            listener,
            attached: true,
        }
    }

    /// The bound logical key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value of the cell.
    pub fn get(&self) -> Option<Value> {
        self.cell.borrow().clone()
    }

    /// A receiver notified whenever the bound value changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Value>> {
        self.cell.subscribe()
    }

    /// Persists `value`. The cell follows through the engine's `Set` event.
    ///
    /// Returns `false` if the write failed; the cell keeps its old value.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        self.engine.set(&self.key, value, self.options)
    }

    /// Applies `f` to the current value and persists the result.
    pub fn update(&self, f: impl FnOnce(Option<Value>) -> Value) -> bool {
        self.set(f(self.get()))
    }

    /// Removes the key and resets the cell to the default.
    pub fn remove(&self) -> bool {
        self.engine.remove(&self.key)
    }

    /// Re-reads the stored value into the cell.
    pub fn refresh(&self) {
        let current = self.engine.get(&self.key, self.default.clone());
        self.cell.send_replace(current);
    }

    /// Stops mirroring engine events and releases the binding.
    pub fn teardown(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        for kind in MIRRORED {
            self.engine.off(kind, &self.listener);
        }
        self.attached = false;
        trace!(key = %self.key, "Storage binding detached");
    }
}

impl Drop for StorageBinding {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Builds the listener that feeds engine events for `key` into `cell`.
///
/// Holds the engine weakly so the engine's registry does not keep itself alive.
fn mirror_listener(
    engine: Weak<WebStorage>,
    key: String,
    default: Option<Value>,
    cell: Arc<watch::Sender<Option<Value>>>,
) -> Listener {
    listener(move |event| {
        match event {
            StorageEvent::Set { key: k, value, .. } if *k == key => {
                cell.send_replace(Some(value.deep_clone()));
            }
            StorageEvent::Remove { key: k, .. } | StorageEvent::Expired { key: k, .. }
                if *k == key =>
            {
                cell.send_replace(default.clone());
            }
            StorageEvent::Clear { .. } => {
                cell.send_replace(default.clone());
            }
            StorageEvent::ExpiredSweep { .. } => {
                if let Some(engine) = engine.upgrade() {
                    if !engine.has(&key) {
                        cell.send_replace(default.clone());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    })
}
