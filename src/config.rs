//! Engine Configuration
//!
//! [`StorageOptions`] is resolved once when an engine is built and never
//! changes afterwards. [`SetOptions`] carries per-write overrides.

use crate::storage::NamespaceKind;
use std::time::Duration;

/// Prefix used when the caller does not pick one.
pub const DEFAULT_PREFIX: &str = "flashstore:";

/// Obfuscation key used when the caller does not pick one.
pub const DEFAULT_OBFUSCATION_KEY: &str = "flashstore-obfuscation-key";

/// Characters that end a prefix unambiguously.
pub const PREFIX_DELIMITERS: [char; 5] = [':', '-', '_', '.', '/'];

/// Options for one storage engine.
///
/// # Example
///
/// ```
/// use flashstore::config::StorageOptions;
/// use flashstore::storage::NamespaceKind;
/// use std::time::Duration;
///
/// let options = StorageOptions::default()
///     .with_namespace(NamespaceKind::Session)
///     .with_prefix("cart:")
///     .with_default_duration(Duration::from_secs(3600));
/// assert_eq!(options.key_prefix, "cart:");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StorageOptions {
    /// Persistent or session namespace
    pub namespace: NamespaceKind,
    /// Lifetime applied to writes without their own (None or zero = never)
    pub default_duration: Option<Duration>,
    /// Prepended to every logical key; scopes enumeration and clear
    pub key_prefix: String,
    /// Obfuscate writes unless the call says otherwise
    pub obfuscate: bool,
    /// XOR keystream for obfuscation
    pub obfuscation_key: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            namespace: NamespaceKind::Persistent,
            default_duration: None,
            key_prefix: DEFAULT_PREFIX.to_string(),
            obfuscate: false,
            obfuscation_key: DEFAULT_OBFUSCATION_KEY.to_string(),
        }
    }
}

impl StorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: NamespaceKind) -> Self {
        self.namespace = namespace;
        self
    }

    /// Sets the lifetime for writes that do not specify one.
    ///
    /// A zero duration disables the default.
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = Some(duration).filter(|d| !d.is_zero());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_obfuscation(mut self, enabled: bool) -> Self {
        self.obfuscate = enabled;
        self
    }

    pub fn with_obfuscation_key(mut self, key: impl Into<String>) -> Self {
        self.obfuscation_key = key.into();
        self
    }

    /// Returns true if the prefix ends in one of [`PREFIX_DELIMITERS`].
    ///
    /// Without a delimiter, a prefix such as `"app"` also matches keys
    /// written under `"apps"`, and enumeration picks them up.
    pub fn prefix_is_delimited(&self) -> bool {
        self.key_prefix
            .chars()
            .last()
            .map(|c| PREFIX_DELIMITERS.contains(&c))
            .unwrap_or(false)
    }
}

/// How long a single write lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifetime {
    /// Use the engine's `default_duration`.
    #[default]
    Default,
    /// Expire this long after the write. Zero expires at the write time.
    Expires(Duration),
    /// Never expire, even if the engine has a default duration.
    Never,
}

/// Per-write overrides of [`StorageOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub lifetime: Lifetime,
    /// Obfuscate this item regardless of the engine default
    pub obfuscate: Option<bool>,
}

impl SetOptions {
    /// Expire the item `duration` after the write.
    pub fn expires_in(duration: Duration) -> Self {
        Self {
            lifetime: Lifetime::Expires(duration),
            ..Default::default()
        }
    }

    /// Keep the item forever, even if the engine has a default duration.
    pub fn never_expires() -> Self {
        Self {
            lifetime: Lifetime::Never,
            ..Default::default()
        }
    }

    pub fn obfuscated(mut self, enabled: bool) -> Self {
        self.obfuscate = Some(enabled);
        self
    }
}
