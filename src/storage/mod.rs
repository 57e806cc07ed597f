//! Storage Engine Module
//!
//! This module provides the core storage functionality for FlashStore:
//! the [`StorageBackend`] contract for synchronous key-value namespaces,
//! the [`WebStorage`] engine built on top of it, and the expiry policy
//! with its optional background sweeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WebStorage                            │
//! │   prefix · default expiry · obfuscation · listeners         │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ full keys, envelope text
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           StorageBackend (persistent | session)             │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ clear_expired()
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use flashstore::config::{SetOptions, StorageOptions};
//! use flashstore::storage::{MemoryBackend, WebStorage};
//! use flashstore::Value;
//! use std::time::Duration;
//!
//! let storage = WebStorage::new(MemoryBackend::new(), StorageOptions::default());
//!
//! storage.set("name", "Ariz", SetOptions::default());
//! assert_eq!(storage.get("name", None), Some(Value::from("Ariz")));
//!
//! storage.set("token", "abc", SetOptions::expires_in(Duration::from_secs(3600)));
//! assert_eq!(storage.get_stats().total, 2);
//! ```

pub mod backend;
pub mod engine;
pub mod expiry;

pub use backend::{MemoryBackend, NamespaceKind, Namespaces, StorageBackend};
pub use engine::{StorageStats, WebStorage};
pub use expiry::{
    has_expired, start_expiry_sweeper, to_absolute, Clock, ExpiryConfig, ExpirySweeper,
    ManualClock, SystemClock,
};
