//! Application Plugin
//!
//! [`StoragePlugin`] is run once at application start. It builds one engine
//! for the persistent namespace and one for the session namespace and hands
//! back [`Storages`], a cheap-to-clone handle that the composition root
//! passes to whatever needs storage.
//!
//! ```text
//! StoragePlugin::new()
//!     .with_local(StorageOptions)      ─┐
//!     .with_session(StorageOptions)    ─┼─> install(&Namespaces) ─> Storages { local, session }
//!                                       ┘
//! ```

use crate::binding::StorageBinding;
use crate::codec::Value;
use crate::config::{SetOptions, StorageOptions};
use crate::storage::{ExpiryConfig, ExpirySweeper, NamespaceKind, Namespaces, WebStorage};
use std::sync::Arc;
use tracing::info;

/// Builder for the pair of engines an application uses.
#[derive(Debug, Clone, Default)]
pub struct StoragePlugin {
    local: StorageOptions,
    session: StorageOptions,
}

impl StoragePlugin {
    /// Uses default options for both engines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for the persistent engine. The namespace field is forced to `Persistent`.
    pub fn with_local(mut self, options: StorageOptions) -> Self {
        self.local = options;
        self
    }

    /// Options for the session engine. The namespace field is forced to `Session`.
    pub fn with_session(mut self, options: StorageOptions) -> Self {
        self.session = options;
        self
    }

    /// Builds both engines over `namespaces`.
    pub fn install(self, namespaces: &Namespaces) -> Storages {
        let local = WebStorage::open(
            namespaces,
            self.local.with_namespace(NamespaceKind::Persistent),
        );
        let session = WebStorage::open(
            namespaces,
            self.session.with_namespace(NamespaceKind::Session),
        );

        info!(
            local_prefix = %local.options().key_prefix,
            session_prefix = %session.options().key_prefix,
            "Storage plugin installed"
        );

        Storages {
            local: Arc::new(local),
            session: Arc::new(session),
        }
    }
}

/// The application's persistent and session engines.
#[derive(Debug, Clone)]
pub struct Storages {
    local: Arc<WebStorage>,
    session: Arc<WebStorage>,
}

impl Storages {
    /// The persistent engine.
    pub fn local(&self) -> &Arc<WebStorage> {
        &self.local
    }

    /// The session engine.
    pub fn session(&self) -> &Arc<WebStorage> {
        &self.session
    }

    /// The engine for `kind`.
    pub fn engine(&self, kind: NamespaceKind) -> &Arc<WebStorage> {
        match kind {
            NamespaceKind::Persistent => &self.local,
            NamespaceKind::Session => &self.session,
        }
    }

    pub fn set_local(&self, key: &str, value: impl Into<Value>, options: SetOptions) -> bool {
        self.local.set(key, value, options)
    }

    pub fn get_local(&self, key: &str, default: Option<Value>) -> Option<Value> {
        self.local.get(key, default)
    }

    pub fn remove_local(&self, key: &str) -> bool {
        self.local.remove(key)
    }

    pub fn set_session(&self, key: &str, value: impl Into<Value>, options: SetOptions) -> bool {
        self.session.set(key, value, options)
    }

    pub fn get_session(&self, key: &str, default: Option<Value>) -> Option<Value> {
        self.session.get(key, default)
    }

    pub fn remove_session(&self, key: &str) -> bool {
        self.session.remove(key)
    }

    /// Binds `key` of the persistent engine to a watch cell.
    pub fn bind_local(&self, key: &str, default: Option<Value>) -> StorageBinding {
        StorageBinding::new(Arc::clone(&self.local), key, default)
    }

    /// Binds `key` of the session engine to a watch cell.
    pub fn bind_session(&self, key: &str, default: Option<Value>) -> StorageBinding {
        StorageBinding::new(Arc::clone(&self.session), key, default)
    }

    /// Starts one background sweeper per engine.
    ///
    /// Must be called from within a Tokio runtime. Keep the handles alive for
    /// as long as sweeping should continue.
    pub fn start_sweepers(&self, config: ExpiryConfig) -> [ExpirySweeper; 2] {
        [
            ExpirySweeper::start(Arc::clone(&self.local), config.clone()),
            ExpirySweeper::start(Arc::clone(&self.session), config),
        ]
    }
}
