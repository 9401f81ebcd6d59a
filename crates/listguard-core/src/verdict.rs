//! Compliance verdicts.
//!
//! A verdict is produced once per run by the risk assessor. Assessed verdicts
//! come from an external model and are only accepted after
//! [`ComplianceVerdict::validate_against`] has checked them against the
//! evidence set. Degraded verdicts (UNKNOWN, ERROR) are built locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::evidence::{EvidenceId, EvidenceSet};
use crate::vocabulary::{check_replacement, ReplacementViolation};

/// Overall risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    /// Prohibited or high risk.
    Red,
    /// Restricted; needs qualification or rewording.
    Yellow,
    /// No issues found.
    Green,
    /// No assessment was possible (no model, or no evidence).
    Unknown,
    /// The assessment itself failed.
    Error,
}

impl RiskTier {
    /// RED and ERROR both force the safe-mode generation template.
    pub fn requires_safe_mode(&self) -> bool {
        matches!(self, RiskTier::Red | RiskTier::Error)
    }

    /// UNKNOWN and ERROR are degraded states, not findings.
    pub fn is_degraded(&self) -> bool {
        matches!(self, RiskTier::Unknown | RiskTier::Error)
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Red => "RED",
            RiskTier::Yellow => "YELLOW",
            RiskTier::Green => "GREEN",
            RiskTier::Unknown => "UNKNOWN",
            RiskTier::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(label)
    }
}

const RULE_INFERENCE: &str = "Rule Inference";
const DIAGNOSTIC: &str = "N/A";

/// What an issue rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Citation {
    /// A passage in the run's evidence set.
    Evidence(EvidenceId),
    /// General regulatory knowledge; no passage directly supports it.
    RuleInference,
    /// Synthetic issue describing a failed assessment.
    Diagnostic,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Citation::Evidence(id) => write!(f, "{}", id),
            Citation::RuleInference => f.write_str(RULE_INFERENCE),
            Citation::Diagnostic => f.write_str(DIAGNOSTIC),
        }
    }
}

impl TryFrom<String> for Citation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(RULE_INFERENCE) {
            return Ok(Citation::RuleInference);
        }
        if trimmed == DIAGNOSTIC {
            return Ok(Citation::Diagnostic);
        }
        trimmed
            .parse::<EvidenceId>()
            .map(Citation::Evidence)
            .map_err(|e| e.to_string())
    }
}

impl From<Citation> for String {
    fn from(citation: Citation) -> Self {
        citation.to_string()
    }
}

/// One compliance finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue: String,
    pub risk_level: RiskTier,
    pub severity: Severity,
    pub suggestion: String,

    #[serde(rename = "evidence_id")]
    pub citation: Citation,

    /// Verbatim excerpt of the cited passage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

/// A risky phrase and the safe wording that replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProhibitedExpression {
    pub original: String,

    #[serde(rename = "suggested")]
    pub replacement: String,
}

/// Why an assessed verdict was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("Issue {index} cites {id}, which is not in the evidence set")]
    DanglingCitation { index: usize, id: EvidenceId },

    #[error("Issue {index} uses the diagnostic citation outside an ERROR verdict")]
    DiagnosticCitation { index: usize },

    #[error("Issue {index} quote does not appear in {id}: '{quote}'")]
    QuoteMismatch {
        index: usize,
        id: EvidenceId,
        quote: String,
    },

    #[error("Issue {index} carries degraded tier {tier}")]
    DegradedIssueTier { index: usize, tier: RiskTier },

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Model reported ERROR tier")]
    ErrorTierFromModel,

    #[error("UNKNOWN verdict must have zero confidence and no findings")]
    InconsistentUnknown,

    #[error("Unsafe replacement: {0}")]
    UnsafeReplacement(#[from] ReplacementViolation),
}

/// Structured outcome of the risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub risk_level: RiskTier,

    /// Self-reported by the model; advisory only.
    pub confidence_score: f64,

    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(default)]
    pub required_qualifications: Vec<String>,

    #[serde(default)]
    pub prohibited_expressions: Vec<ProhibitedExpression>,
}

impl ComplianceVerdict {
    /// No assessment was possible.
    pub fn unknown() -> Self {
        Self {
            risk_level: RiskTier::Unknown,
            confidence_score: 0.0,
            issues: Vec::new(),
            required_qualifications: Vec::new(),
            prohibited_expressions: Vec::new(),
        }
    }

    /// The assessment failed; carries a single critical diagnostic issue.
    pub fn error(message: impl fmt::Display) -> Self {
        Self {
            risk_level: RiskTier::Error,
            confidence_score: 0.0,
            issues: vec![Issue {
                issue: format!("Analysis failed: {}", message),
                risk_level: RiskTier::Red,
                severity: Severity::Critical,
                suggestion: "Check logs".to_string(),
                citation: Citation::Diagnostic,
                quote: None,
            }],
            required_qualifications: Vec::new(),
            prohibited_expressions: Vec::new(),
        }
    }

    /// Check a model-produced verdict: citations resolve, quotes match,
    /// replacements stay in the safe vocabulary, degraded tiers are consistent.
    pub fn validate_against(&self, evidence: &EvidenceSet) -> Result<(), VerdictError> {
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(VerdictError::ConfidenceOutOfRange(self.confidence_score));
        }

        match self.risk_level {
            RiskTier::Error => return Err(VerdictError::ErrorTierFromModel),
            RiskTier::Unknown
                if self.confidence_score != 0.0
                    || !self.issues.is_empty()
                    || !self.prohibited_expressions.is_empty() =>
            {
                return Err(VerdictError::InconsistentUnknown);
            }
            _ => {}
        }

        for (index, issue) in self.issues.iter().enumerate() {
            if issue.risk_level.is_degraded() {
                return Err(VerdictError::DegradedIssueTier {
                    index,
                    tier: issue.risk_level,
                });
            }

            match issue.citation {
                Citation::RuleInference => {}
                Citation::Diagnostic => return Err(VerdictError::DiagnosticCitation { index }),
                Citation::Evidence(id) => {
                    let item = evidence
                        .get(id)
                        .ok_or(VerdictError::DanglingCitation { index, id })?;

                    if let Some(quote) = issue.quote.as_deref() {
                        if !quote_matches(&item.content, quote) {
                            return Err(VerdictError::QuoteMismatch {
                                index,
                                id,
                                quote: quote.to_string(),
                            });
                        }
                    }
                }
            }
        }

        for expression in &self.prohibited_expressions {
            check_replacement(expression)?;
        }

        Ok(())
    }

    /// Prohibited phrases with blank entries removed.
    pub fn prohibited_phrases(&self) -> impl Iterator<Item = &str> {
        self.prohibited_expressions
            .iter()
            .map(|e| e.original.trim())
            .filter(|p| !p.is_empty())
    }
}

/// Whitespace- and case-insensitive containment.
fn quote_matches(content: &str, quote: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let quote = normalize(quote);
    quote.is_empty() || normalize(content).contains(&quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::SearchHit;
    use chrono::NaiveDate;

    fn evidence() -> EvidenceSet {
        EvidenceSet::from_tagged_hits(
            vec![
                ("q1", SearchHit::new("Supplements may not claim to cure   any disease.")),
                ("q2", SearchHit::new("Labels must list all ingredients.")),
            ],
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        )
    }

    fn issue(citation: Citation) -> Issue {
        Issue {
            issue: "Disease claim".to_string(),
            risk_level: RiskTier::Red,
            severity: Severity::High,
            suggestion: "Remove the claim".to_string(),
            citation,
            quote: None,
        }
    }

    fn verdict(issues: Vec<Issue>) -> ComplianceVerdict {
        ComplianceVerdict {
            risk_level: RiskTier::Red,
            confidence_score: 0.8,
            issues,
            required_qualifications: vec!["FDA Facility Registration".to_string()],
            prohibited_expressions: vec![ProhibitedExpression {
                original: "Cures colds".to_string(),
                replacement: "Contains Vitamin C".to_string(),
            }],
        }
    }

    #[test]
    fn test_parse_model_json() {
        let json = r#"{
            "risk_level": "YELLOW",
            "confidence_score": 0.6,
            "issues": [
                {"issue": "x", "risk_level": "YELLOW", "severity": "Medium", "suggestion": "y", "evidence_id": "E2"},
                {"issue": "z", "risk_level": "RED", "severity": "High", "suggestion": "w", "evidence_id": "Rule Inference"}
            ],
            "required_qualifications": [],
            "prohibited_expressions": [{"original": "Cures colds", "suggested": "Contains zinc"}]
        }"#;
        let verdict: ComplianceVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.risk_level, RiskTier::Yellow);
        assert_eq!(verdict.issues[0].citation, Citation::Evidence(EvidenceId::new(2).unwrap()));
        assert_eq!(verdict.issues[1].citation, Citation::RuleInference);
        assert_eq!(verdict.prohibited_expressions[0].replacement, "Contains zinc");
        assert!(verdict.validate_against(&evidence()).is_ok());
    }

    #[test]
    fn test_unparseable_citation_is_rejected_at_parse() {
        let json = r#"{"issue": "x", "risk_level": "RED", "severity": "High", "suggestion": "y", "evidence_id": "policy 3"}"#;
        assert!(serde_json::from_str::<Issue>(json).is_err());
    }

    #[test]
    fn test_valid_citations_pass() {
        let v = verdict(vec![
            issue(Citation::Evidence(EvidenceId::new(1).unwrap())),
            issue(Citation::RuleInference),
        ]);
        assert!(v.validate_against(&evidence()).is_ok());
    }

    #[test]
    fn test_dangling_citation_fails() {
        let v = verdict(vec![issue(Citation::Evidence(EvidenceId::new(9).unwrap()))]);
        assert!(matches!(
            v.validate_against(&evidence()),
            Err(VerdictError::DanglingCitation { index: 0, .. })
        ));
    }

    #[test]
    fn test_quote_must_appear_in_cited_passage() {
        let mut matching = issue(Citation::Evidence(EvidenceId::new(1).unwrap()));
        matching.quote = Some("claim to cure any disease".to_string());
        assert!(verdict(vec![matching]).validate_against(&evidence()).is_ok());

        let mut invented = issue(Citation::Evidence(EvidenceId::new(1).unwrap()));
        invented.quote = Some("banned in all states".to_string());
        assert!(matches!(
            verdict(vec![invented]).validate_against(&evidence()),
            Err(VerdictError::QuoteMismatch { .. })
        ));
    }

    #[test]
    fn test_unsafe_replacement_fails() {
        let mut v = verdict(vec![]);
        v.prohibited_expressions[0].replacement = "Clinically proven immune booster".to_string();
        assert!(matches!(
            v.validate_against(&evidence()),
            Err(VerdictError::UnsafeReplacement(_))
        ));
    }

    #[test]
    fn test_model_cannot_report_degraded_states() {
        let mut v = verdict(vec![]);
        v.risk_level = RiskTier::Error;
        assert_eq!(v.validate_against(&evidence()), Err(VerdictError::ErrorTierFromModel));

        v.risk_level = RiskTier::Unknown;
        assert_eq!(v.validate_against(&evidence()), Err(VerdictError::InconsistentUnknown));

        assert!(ComplianceVerdict::unknown().validate_against(&evidence()).is_ok());
    }

    #[test]
    fn test_error_verdict_shape() {
        let v = ComplianceVerdict::error("connection refused");
        assert_eq!(v.risk_level, RiskTier::Error);
        assert_eq!(v.confidence_score, 0.0);
        assert_eq!(v.issues.len(), 1);
        assert_eq!(v.issues[0].severity, Severity::Critical);
        assert_eq!(v.issues[0].citation, Citation::Diagnostic);
        assert!(v.issues[0].issue.contains("connection refused"));
        assert!(v.risk_level.requires_safe_mode());
    }

    #[test]
    fn test_unknown_verdict_shape() {
        let v = ComplianceVerdict::unknown();
        assert_eq!(v.confidence_score, 0.0);
        assert!(v.issues.is_empty());
        assert!(!v.risk_level.requires_safe_mode());
        assert!(v.risk_level.is_degraded());
    }

    #[test]
    fn test_citation_wire_text() {
        assert_eq!(serde_json::to_string(&Citation::RuleInference).unwrap(), "\"Rule Inference\"");
        assert_eq!(serde_json::to_string(&Citation::Diagnostic).unwrap(), "\"N/A\"");
    }
}
