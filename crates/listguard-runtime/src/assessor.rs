//! Risk assessment.
//!
//! Three outcomes, all of them a verdict:
//! - no model or no evidence: UNKNOWN, a valid result
//! - model reply accepted: the assessed verdict
//! - anything failing on the way: ERROR with one synthetic issue

use listguard_core::{
    ComplianceVerdict, Diagnostic, DiagnosticKind, EvidenceSet, ProductDescriptor, Stage,
};

use crate::client::{GenerationError, ModelClient};
use crate::prompts;
use crate::schema::OutputSchema;

/// Verdict plus whatever went wrong producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: ComplianceVerdict,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct RiskAssessor {
    client: Option<ModelClient>,
}

impl RiskAssessor {
    pub fn new(client: Option<ModelClient>) -> Self {
        Self { client }
    }

    pub async fn assess(&self, product: &ProductDescriptor, evidence: &EvidenceSet) -> Assessment {
        let Some(client) = &self.client else {
            tracing::info!("No model configured, risk assessment skipped");
            return Assessment {
                verdict: ComplianceVerdict::unknown(),
                diagnostics: vec![Diagnostic::new(
                    Stage::Audit,
                    DiagnosticKind::ToolUnavailable,
                    "no model configured; risk tier is UNKNOWN",
                )],
            };
        };

        if evidence.is_empty() {
            tracing::info!("No evidence, risk assessment skipped");
            return Assessment {
                verdict: ComplianceVerdict::unknown(),
                diagnostics: Vec::new(),
            };
        }

        match self.request(client, product, evidence).await {
            Ok(verdict) => {
                tracing::info!(
                    risk = %verdict.risk_level,
                    issues = verdict.issues.len(),
                    "Risk assessment complete"
                );
                Assessment {
                    verdict,
                    diagnostics: Vec::new(),
                }
            }
            Err((kind, message)) => {
                tracing::warn!(error = %message, "Risk assessment failed");
                Assessment {
                    verdict: ComplianceVerdict::error(&message),
                    diagnostics: vec![Diagnostic::new(Stage::Audit, kind, message)],
                }
            }
        }
    }

    async fn request(
        &self,
        client: &ModelClient,
        product: &ProductDescriptor,
        evidence: &EvidenceSet,
    ) -> Result<ComplianceVerdict, (DiagnosticKind, String)> {
        let fail = |e: GenerationError| (e.kind(), e.to_string());

        let messages = prompts::assessor_messages(product, evidence)
            .map_err(|e| fail(GenerationError::Deserialize(e)))?;

        let verdict: ComplianceVerdict = client
            .generate_structured(
                Stage::Audit,
                messages,
                OutputSchema::ComplianceVerdict,
                client.config().assessor,
            )
            .await
            .map_err(fail)?;

        verdict
            .validate_against(evidence)
            .map_err(|e| (DiagnosticKind::MalformedOutput, format!("rejected verdict: {}", e)))?;

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{client_with, MockProvider};
    use chrono::NaiveDate;
    use listguard_core::{Citation, IntakeForm, RiskTier, SearchHit, Severity};

    fn product() -> ProductDescriptor {
        ProductDescriptor::from_intake(
            IntakeForm::from_yaml("category: Dietary Supplements\nproduct_name: Vitamin C Capsules")
                .unwrap(),
        )
    }

    fn evidence() -> EvidenceSet {
        EvidenceSet::from_tagged_hits(
            vec![
                ("q1", SearchHit::new("Supplements may not claim to cure disease.")),
                ("q2", SearchHit::new("Labels must show a supplement facts panel.")),
            ],
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        )
    }

    const CITED_VERDICT: &str = r#"{
        "risk_level": "YELLOW",
        "confidence_score": 0.8,
        "issues": [{
            "issue": "Disease claim",
            "risk_level": "RED",
            "severity": "High",
            "suggestion": "Remove 'cures colds'",
            "evidence_id": "E1",
            "quote": "may not claim to cure disease"
        }, {
            "issue": "Missing facts panel",
            "risk_level": "YELLOW",
            "severity": "Medium",
            "suggestion": "Add panel",
            "evidence_id": "Rule Inference"
        }],
        "required_qualifications": ["Supplement facts panel"],
        "prohibited_expressions": [{"original": "cures colds", "suggested": "contains vitamin C"}]
    }"#;

    #[tokio::test]
    async fn test_no_model_is_unknown() {
        let assessment = RiskAssessor::new(None).assess(&product(), &evidence()).await;
        assert_eq!(assessment.verdict, ComplianceVerdict::unknown());
        assert_eq!(assessment.diagnostics[0].kind, DiagnosticKind::ToolUnavailable);
    }

    #[tokio::test]
    async fn test_empty_evidence_is_unknown_without_model_call() {
        let provider = MockProvider::replying(CITED_VERDICT);
        let client = client_with(provider);
        let assessment = RiskAssessor::new(Some(client.clone()))
            .assess(&product(), &EvidenceSet::empty())
            .await;
        assert_eq!(assessment.verdict.risk_level, RiskTier::Unknown);
        assert_eq!(assessment.verdict.confidence_score, 0.0);
        assert!(assessment.verdict.issues.is_empty());
        assert_eq!(client.usage().for_stage(Stage::Audit).llm_calls, 0);
    }

    #[tokio::test]
    async fn test_accepted_verdict() {
        let client = client_with(MockProvider::replying(CITED_VERDICT));
        let assessment = RiskAssessor::new(Some(client)).assess(&product(), &evidence()).await;
        assert_eq!(assessment.verdict.risk_level, RiskTier::Yellow);
        assert!(assessment.diagnostics.is_empty());
        assert_eq!(assessment.verdict.issues[1].citation, Citation::RuleInference);
    }

    #[tokio::test]
    async fn test_transport_failure_is_error_verdict() {
        let client = client_with(MockProvider::failing());
        let assessment = RiskAssessor::new(Some(client)).assess(&product(), &evidence()).await;
        let verdict = assessment.verdict;
        assert_eq!(verdict.risk_level, RiskTier::Error);
        assert_eq!(verdict.confidence_score, 0.0);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].severity, Severity::Critical);
        assert_eq!(assessment.diagnostics[0].kind, DiagnosticKind::ExternalCallFailure);
    }

    #[tokio::test]
    async fn test_dangling_citation_is_error_verdict() {
        let dangling = CITED_VERDICT.replace("\"E1\"", "\"E7\"");
        let client = client_with(MockProvider::replying(dangling));
        let assessment = RiskAssessor::new(Some(client)).assess(&product(), &evidence()).await;
        assert_eq!(assessment.verdict.risk_level, RiskTier::Error);
        assert_eq!(assessment.diagnostics[0].kind, DiagnosticKind::MalformedOutput);
        assert!(assessment.verdict.issues[0].issue.contains("E7"));
    }

    #[tokio::test]
    async fn test_escalating_replacement_is_error_verdict() {
        let escalating = CITED_VERDICT.replace("contains vitamin C", "clinically proven to prevent colds");
        let client = client_with(MockProvider::replying(escalating));
        let assessment = RiskAssessor::new(Some(client)).assess(&product(), &evidence()).await;
        assert_eq!(assessment.verdict.risk_level, RiskTier::Error);
    }
}
