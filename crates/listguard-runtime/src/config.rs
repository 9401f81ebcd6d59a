//! Runtime configuration.
//!
//! Loaded from YAML or JSON, then overlaid with environment variables. The
//! API key is never part of this struct; it is read by the provider factory
//! straight into an [`ApiCredential`](crate::providers::ApiCredential).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use listguard_core::DEFAULT_EXCERPT_CHARS;

use crate::providers::{CompletionConfig, LlmProvider, ProviderError, ProviderRegistry, Unresolved};

pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL_NAME";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid YAML config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid provider configuration: {0}")]
    Provider(#[from] ProviderError),
}

/// Sampling settings for one model-backed stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    pub temperature: f32,

    pub max_tokens: u32,
}

impl StageSettings {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Registry key of the provider factory
    pub provider: String,

    pub model: String,

    pub base_url: String,

    pub assessor: StageSettings,

    pub generator: StageSettings,

    pub reviewer: StageSettings,

    /// Per-request transport timeout, e.g. "30s" or "2m"
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum characters per evidence excerpt in the report
    pub excerpt_chars: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            assessor: StageSettings::new(0.0, 2000),
            generator: StageSettings::new(0.7, 3000),
            reviewer: StageSettings::new(0.0, 800),
            request_timeout: Duration::from_secs(60),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Overlay `OPENAI_BASE_URL` and `OPENAI_MODEL_NAME` when set.
    pub fn apply_env(mut self) -> Self {
        if let Some(url) = env_value(OPENAI_BASE_URL_ENV) {
            self.base_url = url;
        }
        if let Some(model) = env_value(OPENAI_MODEL_ENV) {
            self.model = model;
        }
        self
    }

    /// Completion settings for a stage.
    pub fn completion(&self, settings: StageSettings, json_mode: bool) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: self.request_timeout,
            json_mode,
        }
    }

    fn provider_config(&self) -> serde_json::Value {
        serde_json::json!({ "base_url": self.base_url })
    }

    /// Build the configured provider.
    ///
    /// `Ok(None)` means no generation capability: the provider type is not
    /// compiled in or its credential is missing. Invalid configuration of an
    /// otherwise available provider is an error.
    pub fn build_provider(
        &self,
        registry: &ProviderRegistry,
    ) -> Result<Option<Arc<dyn LlmProvider>>, ConfigError> {
        match registry.resolve(&self.provider, &self.provider_config())? {
            Ok(provider) => Ok(Some(provider)),
            Err(Unresolved::UnknownType(name)) => {
                tracing::warn!(provider = %name, "Provider not available in this build");
                Ok(None)
            }
            Err(Unresolved::MissingKey(lookup)) => {
                tracing::warn!(provider = %self.provider, env = lookup.env_var, "No credential configured");
                Ok(None)
            }
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{KeyLookup, ProviderFactory};

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.assessor.temperature, 0.0);
        assert_eq!(config.generator.temperature, 0.7);
        assert_eq!(config.reviewer.temperature, 0.0);
        assert_eq!(config.excerpt_chars, 200);
    }

    #[test]
    fn test_yaml_with_humantime_timeout() {
        let config = RuntimeConfig::from_yaml(
            r#"
model: gpt-4o-mini
request_timeout: 2m 30s
generator:
  temperature: 0.5
  max_tokens: 1500
"#,
        )
        .unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.request_timeout, Duration::from_secs(150));
        assert_eq!(config.generator, StageSettings::new(0.5, 1500));
        assert_eq!(config.assessor, StageSettings::new(0.0, 2000));
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        assert!(RuntimeConfig::from_yaml("request_timeout: soon").is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_duration_readable() {
        let json = serde_json::to_string(&RuntimeConfig::default()).unwrap();
        assert!(json.contains("\"request_timeout\":\"1m\""));
        assert_eq!(RuntimeConfig::from_json(&json).unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_completion_settings() {
        let config = RuntimeConfig::default();
        let completion = config.completion(config.assessor, true);
        assert_eq!(completion.temperature, 0.0);
        assert!(completion.json_mode);
        assert_eq!(completion.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_provider_means_no_capability() {
        let config = RuntimeConfig {
            provider: "nonexistent".to_string(),
            ..Default::default()
        };
        let provider = config.build_provider(&ProviderRegistry::new()).unwrap();
        assert!(provider.is_none());
    }

    struct KeyedFactory;

    impl ProviderFactory for KeyedFactory {
        fn provider_type(&self) -> &'static str {
            "keyed"
        }

        fn create(
            &self,
            _config: &serde_json::Value,
        ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            Err(ProviderError::NotConfigured("unreachable in test".to_string()))
        }

        fn validate_config(&self, _config: &serde_json::Value) -> Result<(), ProviderError> {
            Ok(())
        }

        fn key_lookup(&self) -> Option<KeyLookup> {
            Some(KeyLookup::new("Test key", "api_key", "LISTGUARD_TEST_NEVER_SET_KEY"))
        }
    }

    #[test]
    fn test_missing_credential_means_no_capability() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(KeyedFactory));
        let config = RuntimeConfig {
            provider: "keyed".to_string(),
            ..Default::default()
        };
        assert!(config.build_provider(&registry).unwrap().is_none());
    }
}
