//! Provider factories.
//!
//! New providers are added by registering a [`ProviderFactory`]; the rest of
//! the runtime only ever sees `Arc<dyn LlmProvider>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{KeyLookup, LlmProvider, ProviderError};

/// Creates providers of one type from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique type name, e.g. "openai".
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate configuration without creating a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Where this provider's key is looked up, if it needs one.
    fn key_lookup(&self) -> Option<KeyLookup> {
        None
    }
}

/// Why [`ProviderRegistry::resolve`] produced no provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// No factory of that type is compiled into this build.
    UnknownType(String),
    /// The factory exists but its key is absent from config and environment.
    MissingKey(KeyLookup),
}

/// Registry of provider factories keyed by type name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any existing one of the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    pub fn available_types(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn get_factory(&self, provider_type: &str) -> Option<&Arc<dyn ProviderFactory>> {
        self.factories.get(provider_type)
    }

    /// Build the provider of `provider_type`.
    ///
    /// The outer `Err` is a broken configuration. `Ok(Err(_))` means the
    /// provider simply is not available, which callers treat as running
    /// without a model.
    pub fn resolve(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Result<Arc<dyn LlmProvider>, Unresolved>, ProviderError> {
        let Some(factory) = self.get_factory(provider_type) else {
            return Ok(Err(Unresolved::UnknownType(provider_type.to_string())));
        };

        if let Some(lookup) = factory.key_lookup() {
            if !lookup.is_present(config) {
                return Ok(Err(Unresolved::MissingKey(lookup)));
            }
        }

        factory.validate_config(config)?;
        factory.create(config).map(Ok)
    }

    /// Registry with every provider compiled into this build.
    #[cfg(feature = "openai")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    /// Registry with every provider compiled into this build.
    #[cfg(not(feature = "openai"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
