//! # FlashStore - Typed Key-Value Persistence over Web Storage
//!
//! FlashStore wraps a synchronous, string-based key-value namespace (the kind
//! browsers expose as `localStorage` and `sessionStorage`) and adds the
//! pieces the raw facility lacks.
//!
//! ## Features
//!
//! - **Expiry**: Items can carry a lifetime, evicted lazily and by sweeps
//! - **Prefixes**: Every key is namespaced so independent consumers can share storage
//! - **Obfuscation**: Optional reversible XOR masking of stored payloads
//! - **Events**: Listeners are notified synchronously of every mutation
//! - **Bindings**: A key can be mirrored into a `tokio::sync::watch` cell
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashStore                                 │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Storages   │───>│ WebStorage  │───>│   Codec     │                  │
//! │  │  (plugin)   │    │  (engine)   │    │ JSON · XOR  │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │        ┌───────────────────┤                  ▼                         │
//! │        ▼                   ▼          ┌──────────────────────────────┐  │
//! │  ┌─────────────┐    ┌─────────────┐   │  StorageBackend              │  │
//! │  │  Listeners  │───>│  Bindings   │   │  (persistent | session)      │  │
//! │  └─────────────┘    └─────────────┘   └──────────────────────────────┘  │
//! │                                                  ▲                      │
//! │                     ┌────────────────────────────┴────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashstore::{Namespaces, SetOptions, StorageOptions, StoragePlugin, Value};
//! use std::time::Duration;
//!
//! let storages = StoragePlugin::new()
//!     .with_local(StorageOptions::default().with_prefix("shop:"))
//!     .install(&Namespaces::in_memory());
//!
//! storages.set_local("cart", Value::from(vec!["apple", "pear"]), SetOptions::default());
//! storages.set_session(
//!     "token",
//!     "abc123",
//!     SetOptions::expires_in(Duration::from_secs(900)),
//! );
//!
//! assert!(storages.local().has("cart"));
//! assert_eq!(storages.get_session("token", None), Some(Value::from("abc123")));
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Backend contract, the engine and the expiry policy
//! - [`codec`]: Values, envelopes, serialization and obfuscation
//! - [`events`]: Event records and the listener registry
//! - [`config`]: Engine and per-write options
//! - [`binding`]: Reactive mirroring of one key
//! - [`plugin`]: Start-up construction of the two engines
//!
//! ## Failure Model
//!
//! No operation on [`WebStorage`] returns an error or panics on bad data.
//! Writes report success as a `bool`, reads return `None` (or the caller's
//! default) for anything missing, expired or undecodable, and failures are
//! logged through `tracing`.

pub mod binding;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod plugin;
pub mod storage;

// Re-export commonly used types for convenience
pub use binding::StorageBinding;
pub use codec::{Envelope, Value};
pub use config::{Lifetime, SetOptions, StorageOptions};
pub use error::{StorageError, StorageResult};
pub use events::{listener, EventKind, Listener, StorageEvent};
pub use plugin::{StoragePlugin, Storages};
pub use storage::{
    start_expiry_sweeper, ExpiryConfig, ExpirySweeper, MemoryBackend, NamespaceKind, Namespaces,
    StorageBackend, StorageStats, WebStorage,
};

/// Version of FlashStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
