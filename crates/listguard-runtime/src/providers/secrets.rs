//! Credential handling for model providers.
//!
//! A provider declares where its key may come from with a [`KeyLookup`].
//! Whatever is found is wrapped in [`ApiCredential`] immediately; the
//! wrapper prints `[REDACTED]` in `Debug` and `Display` and zeroes its
//! memory on drop.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// The provider's JSON config block.
    ProviderConfig,
    Environment,
    /// Passed directly by the caller.
    Explicit,
}

impl fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyOrigin::ProviderConfig => "provider config",
            KeyOrigin::Environment => "environment",
            KeyOrigin::Explicit => "caller",
        })
    }
}

/// Where a provider looks for its key: a config field first, then an
/// environment variable. Blank values count as absent in both places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLookup {
    pub label: &'static str,
    pub config_key: &'static str,
    pub env_var: &'static str,
}

impl KeyLookup {
    pub const fn new(label: &'static str, config_key: &'static str, env_var: &'static str) -> Self {
        Self {
            label,
            config_key,
            env_var,
        }
    }

    pub fn find(&self, config: &JsonValue) -> Option<ApiCredential> {
        let from_config = config
            .get(self.config_key)
            .and_then(JsonValue::as_str)
            .filter(|v| !v.trim().is_empty())
            .map(|v| ApiCredential::new(v, KeyOrigin::ProviderConfig, self.label));

        from_config.or_else(|| {
            std::env::var(self.env_var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| ApiCredential::new(v, KeyOrigin::Environment, self.label))
        })
    }

    /// Like [`find`](Self::find), but a missing key is a `NotConfigured` error
    /// naming both places that were searched.
    pub fn require(&self, config: &JsonValue) -> Result<ApiCredential, ProviderError> {
        self.find(config).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "{} missing: set '{}' in the provider config or export {}",
                self.label, self.config_key, self.env_var
            ))
        })
    }

    pub fn is_present(&self, config: &JsonValue) -> bool {
        self.find(config).is_some()
    }
}

/// An API key that never shows up in logs.
pub struct ApiCredential {
    key: SecretString,
    origin: KeyOrigin,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(key: impl Into<String>, origin: KeyOrigin, label: &'static str) -> Self {
        Self {
            key: SecretString::from(key.into()),
            origin,
            label,
        }
    }

    /// The raw key. Only the request builder should call this.
    pub fn expose(&self) -> &str {
        self.key.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.key.expose_secret().trim().is_empty()
    }

    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("label", &self.label)
            .field("origin", &self.origin)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): [REDACTED]", self.label, self.origin)
    }
}
