//! Output auditor.
//!
//! Deterministic rule checks over the generated listings. No model call is
//! involved, and the same inputs always produce the same metrics. This is the
//! only place that decides whether generated output may be exported.

use serde::{Deserialize, Serialize};

use crate::listing::ListingsCollection;
use crate::product::ProductDescriptor;
use crate::verdict::ComplianceVerdict;

/// Regulated keywords that must be backed by a declared qualification.
pub const HIGH_RISK_KEYWORDS: &[&str] = &[
    "fda registered",
    "fda approved",
    "gmp",
    "usda organic",
    "clinically tested",
    "clinically proven",
    "certified",
    "guaranteed",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetrics {
    /// Prohibited phrases flagged in the seller's claims.
    pub prohibited_terms_input: usize,
    /// How many of those phrases still appear in the generated listings.
    pub prohibited_terms_output: usize,
    pub hallucination_count: usize,
    pub risk_gating_passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub metrics: AuditMetrics,
    /// Prohibited phrases found in the output.
    pub leaked_terms: Vec<String>,
    /// High-risk keywords found in the output but not in the declared qualifications.
    pub hallucinations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputAuditor;

impl OutputAuditor {
    pub fn new() -> Self {
        Self
    }

    pub fn audit(
        &self,
        listings: &ListingsCollection,
        verdict: &ComplianceVerdict,
        product: &ProductDescriptor,
    ) -> AuditOutcome {
        let haystack = listings.haystack();

        let prohibited: Vec<&str> = verdict.prohibited_phrases().collect();
        let leaked_terms: Vec<String> = prohibited
            .iter()
            .filter(|phrase| haystack.contains(&phrase.to_lowercase()))
            .map(|phrase| phrase.to_string())
            .collect();

        let declared = product.qualifications_text();
        let hallucinations: Vec<String> = HIGH_RISK_KEYWORDS
            .iter()
            .filter(|kw| haystack.contains(*kw) && !declared.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();

        if !hallucinations.is_empty() {
            tracing::warn!(
                count = hallucinations.len(),
                keywords = %hallucinations.join(", "),
                "Unverified regulated claims in generated output"
            );
        }

        AuditOutcome {
            metrics: AuditMetrics {
                prohibited_terms_input: prohibited.len(),
                prohibited_terms_output: leaked_terms.len(),
                hallucination_count: hallucinations.len(),
                risk_gating_passed: hallucinations.is_empty(),
            },
            leaked_terms,
            hallucinations,
        }
    }
}

/// Parsed form of an advisory review, when the reviewer returned JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReview {
    #[serde(default)]
    pub overall_score: Option<f64>,

    #[serde(default)]
    pub tone_feedback: Option<String>,

    #[serde(default)]
    pub clarity_feedback: Option<String>,
}

/// Best-effort tone and clarity narrative. Never affects metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvisoryReview {
    Review {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        structured: Option<StructuredReview>,
    },
    #[default]
    Unavailable,
    Failed {
        reason: String,
    },
}

impl AdvisoryReview {
    /// Wrap reviewer text, parsing it as JSON when it looks like JSON.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let structured = extract_json_object(&text)
            .and_then(|json| serde_json::from_str::<StructuredReview>(json).ok());
        AdvisoryReview::Review { text, structured }
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Everything the Eval stage produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub outcome: AuditOutcome,
    pub advisory: AdvisoryReview,
    /// False when the listings collection was empty at audit time.
    pub listings_present: bool,
}
