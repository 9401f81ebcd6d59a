//! Structured and free-text model calls.
//!
//! [`ModelClient`] is the `generate_structured` / `generate_text` pair the
//! stages depend on. A structured reply goes through four gates before it
//! reaches a stage: JSON extraction, schema validation, deserialization and
//! (in the caller) domain validation. Any gate failing is an error; replies
//! are never repaired.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

use listguard_core::{DiagnosticKind, Stage};

use crate::config::{RuntimeConfig, StageSettings};
use crate::providers::{ChatMessage, LlmProvider, ProviderError};
use crate::schema::OutputSchema;
use crate::usage::UsageTracker;

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap();
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Model call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Model reply is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Model reply violates the {schema} schema: {}", .errors.join("; "))]
    SchemaViolation {
        schema: OutputSchema,
        errors: Vec<String>,
    },

    #[error("Model reply does not match the expected shape: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl GenerationError {
    /// Diagnostic category for this failure.
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            GenerationError::Provider(_) => DiagnosticKind::ExternalCallFailure,
            _ => DiagnosticKind::MalformedOutput,
        }
    }
}

/// Model access for one pipeline, with usage recorded per stage.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn LlmProvider>,
    config: RuntimeConfig,
    usage: Arc<UsageTracker>,
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.name())
            .field("model", &self.config.model)
            .finish()
    }
}

impl ModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: RuntimeConfig, usage: Arc<UsageTracker>) -> Self {
        Self {
            provider,
            config,
            usage,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Request a reply conforming to `schema` and deserialize it.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        stage: Stage,
        messages: Vec<ChatMessage>,
        schema: OutputSchema,
        settings: StageSettings,
    ) -> Result<T, GenerationError> {
        let content = self.call(stage, messages, settings, true).await?;

        let json = extract_json(&content)
            .ok_or_else(|| GenerationError::MalformedJson("no JSON object in reply".to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| GenerationError::MalformedJson(e.to_string()))?;

        schema
            .validate(&value)
            .map_err(|errors| GenerationError::SchemaViolation { schema, errors })?;

        Ok(serde_json::from_value(value)?)
    }

    /// Request an unstructured reply.
    pub async fn generate_text(
        &self,
        stage: Stage,
        messages: Vec<ChatMessage>,
        settings: StageSettings,
    ) -> Result<String, GenerationError> {
        self.call(stage, messages, settings, false).await
    }

    async fn call(
        &self,
        stage: Stage,
        messages: Vec<ChatMessage>,
        settings: StageSettings,
        json_mode: bool,
    ) -> Result<String, GenerationError> {
        let completion = self.config.completion(settings, json_mode);

        tracing::debug!(
            stage = %stage,
            provider = self.provider.name(),
            model = %completion.model,
            "Model call"
        );

        let response = self.provider.complete(messages, &completion).await?;
        self.usage.record(stage, &response.usage, &response.model);

        Ok(response.content)
    }
}

/// Locate the JSON object in a reply: fenced block first, then the outermost braces.
fn extract_json(content: &str) -> Option<&str> {
    if let Some(captures) = FENCED_JSON.captures(content) {
        return captures.get(1).map(|m| m.as_str());
    }

    let trimmed = content.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::{CompletionConfig, CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use listguard_core::ComplianceVerdict;
    use parking_lot::Mutex;

    /// Replies with queued responses, in order; errors once exhausted.
    pub(crate) struct MockProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        pub(crate) seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl MockProvider {
        pub(crate) fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn replying(reply: impl Into<String>) -> Self {
            Self::new(vec![Ok(reply.into())])
        }

        pub(crate) fn failing() -> Self {
            Self::new(vec![Err(ProviderError::Transport("connection refused".to_string()))])
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.seen.lock().push(messages);
            let reply = self
                .replies
                .lock()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::NotConfigured("no reply queued".to_string())))?;
            Ok(CompletionResponse {
                content: reply,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    pub(crate) fn client_with(provider: MockProvider) -> ModelClient {
        ModelClient::new(
            Arc::new(provider),
            RuntimeConfig::default(),
            Arc::new(UsageTracker::new()),
        )
    }

    const VERDICT: &str = r#"{"risk_level":"GREEN","confidence_score":0.9,"issues":[],"required_qualifications":[],"prohibited_expressions":[]}"#;

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json(VERDICT), Some(VERDICT));
        let fenced = format!("Here you go:\n```json\n{}\n```\nThanks", VERDICT);
        assert_eq!(extract_json(&fenced), Some(VERDICT));
        let chatty = format!("Sure! {} Hope that helps.", VERDICT);
        assert_eq!(extract_json(&chatty), Some(VERDICT));
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_structured_success_records_usage() {
        let client = client_with(MockProvider::replying(VERDICT));
        let verdict: ComplianceVerdict = client
            .generate_structured(
                Stage::Audit,
                vec![ChatMessage::system("assess")],
                OutputSchema::ComplianceVerdict,
                client.config().assessor,
            )
            .await
            .unwrap();
        assert_eq!(verdict.confidence_score, 0.9);

        let usage = client.usage().for_stage(Stage::Audit);
        assert_eq!(usage.llm_calls, 1);
        assert_eq!(usage.total_tokens, 150);
    }

    #[tokio::test]
    async fn test_schema_violation_is_malformed_output() {
        let client = client_with(MockProvider::replying(r#"{"risk_level":"PURPLE"}"#));
        let err = client
            .generate_structured::<ComplianceVerdict>(
                Stage::Audit,
                vec![],
                OutputSchema::ComplianceVerdict,
                client.config().assessor,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::SchemaViolation { .. }));
        assert_eq!(err.kind(), DiagnosticKind::MalformedOutput);
    }

    #[tokio::test]
    async fn test_non_json_reply_is_malformed() {
        let client = client_with(MockProvider::replying("I cannot help with that."));
        let err = client
            .generate_structured::<ComplianceVerdict>(
                Stage::Audit,
                vec![],
                OutputSchema::ComplianceVerdict,
                client.config().assessor,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedJson(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_external_call_failure() {
        let client = client_with(MockProvider::failing());
        let err = client
            .generate_text(Stage::Eval, vec![], client.config().reviewer)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), DiagnosticKind::ExternalCallFailure);
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(client.usage().for_stage(Stage::Eval).llm_calls, 0);
    }
}
