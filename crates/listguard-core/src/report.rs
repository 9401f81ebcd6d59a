//! Launch report composition.
//!
//! The report is a read-only projection of a finished run, ready for export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::audit::{AdvisoryReview, AuditOutcome};
use crate::evidence::{CoverageReport, EvidenceId};
use crate::listing::{ListingVariant, ListingsCollection};
use crate::market::MarketContext;
use crate::run::{Diagnostic, RunState, StageUsage};
use crate::verdict::{Issue, ProhibitedExpression, RiskTier};

pub const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Whether the generated listings may leave the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportGate {
    Open,
    /// The seller must explicitly accept the risk first: a RED or ERROR
    /// verdict, or an UNKNOWN one where no assessment was made.
    RequiresAcknowledgement,
    /// Risk gating failed; the output contains unverified regulated claims.
    Blocked,
}

impl ExportGate {
    pub fn evaluate(tier: RiskTier, risk_gating_passed: bool) -> Self {
        if !risk_gating_passed {
            ExportGate::Blocked
        } else if tier.requires_safe_mode() || tier.is_degraded() {
            ExportGate::RequiresAcknowledgement
        } else {
            ExportGate::Open
        }
    }

    pub fn permits_export(&self, acknowledged: bool) -> bool {
        match self {
            ExportGate::Open => true,
            ExportGate::RequiresAcknowledgement => acknowledged,
            ExportGate::Blocked => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceExcerpt {
    pub id: EvidenceId,
    pub source: String,
    pub url: String,
    pub query: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchReport {
    pub generated_at: DateTime<Utc>,
    pub product_name: String,
    pub category: String,
    pub jurisdiction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_warning: Option<String>,
    pub risk_level: RiskTier,
    pub confidence_score: f64,
    pub issues: Vec<Issue>,
    pub required_qualifications: Vec<String>,
    pub prohibited_expressions: Vec<ProhibitedExpression>,
    pub safe_mode: bool,
    pub listings_present: bool,
    pub listings: ListingsCollection,
    pub audit: AuditOutcome,
    pub advisory: AdvisoryReview,
    pub market: MarketContext,
    pub evidence_appendix: Vec<EvidenceExcerpt>,
    pub coverage: CoverageReport,
    pub diagnostics: Vec<Diagnostic>,
    pub usage: StageUsage,
    pub export_gate: ExportGate,
}

impl LaunchReport {
    pub fn compose(state: &RunState, excerpt_chars: usize) -> Self {
        let verdict = state.verdict();
        let product = state.product();
        let outcome = state.eval().outcome.clone();

        let evidence_appendix = state
            .evidence()
            .iter()
            .map(|item| EvidenceExcerpt {
                id: item.id,
                source: item.source.clone(),
                url: item.url.clone(),
                query: item.query.clone(),
                excerpt: truncate_excerpt(&item.content, excerpt_chars),
            })
            .collect();

        Self {
            generated_at: state.finished_at().unwrap_or_else(Utc::now),
            product_name: product.name().to_string(),
            category: product.category().to_string(),
            jurisdiction: product.jurisdiction().to_string(),
            intake_warning: state.intake_warning().map(|w| w.message.clone()),
            risk_level: verdict.risk_level,
            confidence_score: verdict.confidence_score,
            issues: verdict.issues.clone(),
            required_qualifications: verdict.required_qualifications.clone(),
            prohibited_expressions: verdict.prohibited_expressions.clone(),
            safe_mode: state.constraints().is_some_and(|c| c.is_safe_mode()),
            listings_present: !state.listings().is_empty(),
            listings: state.listings().clone(),
            export_gate: ExportGate::evaluate(verdict.risk_level, outcome.metrics.risk_gating_passed),
            audit: outcome,
            advisory: state.eval().advisory.clone(),
            market: state.market().clone(),
            evidence_appendix,
            coverage: state.evidence().coverage(),
            diagnostics: state.diagnostics().to_vec(),
            usage: state.total_usage(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Launch Package: {}", self.product_name);
        let _ = writeln!(md);
        let _ = writeln!(md, "- Date: {}", self.generated_at.format("%Y-%m-%d"));
        let _ = writeln!(md, "- Market: {} / {}", self.jurisdiction, self.category);
        let _ = writeln!(md, "- Risk level: **{}** (confidence {:.2})", self.risk_level, self.confidence_score);
        let _ = writeln!(md, "- Evidence coverage: {} ({} items)", self.coverage.health, self.coverage.items);
        let _ = writeln!(md, "- Export: {}", export_label(self.export_gate));
        if let Some(warning) = &self.intake_warning {
            let _ = writeln!(md, "- Intake warning: {}", warning);
        }

        let _ = writeln!(md, "\n## Compliance Issues\n");
        if self.issues.is_empty() {
            let _ = writeln!(md, "No issues recorded.");
        }
        for issue in &self.issues {
            let _ = writeln!(
                md,
                "- [{} / {}] {} (evidence: {})\n  - Suggestion: {}",
                issue.risk_level, issue.severity, issue.issue, issue.citation, issue.suggestion
            );
        }

        if !self.required_qualifications.is_empty() {
            let _ = writeln!(md, "\n## Required Qualifications\n");
            for q in &self.required_qualifications {
                let _ = writeln!(md, "- {}", q);
            }
        }

        if !self.prohibited_expressions.is_empty() {
            let _ = writeln!(md, "\n## Prohibited Expressions\n");
            let _ = writeln!(md, "| Original | Suggested |\n|---|---|");
            for e in &self.prohibited_expressions {
                let _ = writeln!(md, "| {} | {} |", e.original, e.replacement);
            }
        }

        let _ = writeln!(md, "\n## Listings\n");
        if self.listings_present {
            if self.safe_mode {
                let _ = writeln!(md, "> Safe mode was active: listings are withheld drafts.\n");
            }
            for (label, variant) in self.listings.variants() {
                let _ = writeln!(md, "### {}\n", label);
                render_variant(&mut md, variant);
            }
            for difference in &self.listings.differences {
                let _ = writeln!(md, "- {}", difference);
            }
        } else {
            let _ = writeln!(md, "No listings were produced.");
        }

        let metrics = &self.audit.metrics;
        let _ = writeln!(md, "\n## Output Audit\n");
        let _ = writeln!(md, "- Prohibited terms in claims: {}", metrics.prohibited_terms_input);
        let _ = writeln!(md, "- Prohibited terms in output: {}", metrics.prohibited_terms_output);
        let _ = writeln!(md, "- Hallucinated claims: {}", metrics.hallucination_count);
        let _ = writeln!(
            md,
            "- Risk gating: {}",
            if metrics.risk_gating_passed { "PASSED" } else { "FAILED" }
        );
        if !self.audit.hallucinations.is_empty() {
            let _ = writeln!(md, "- Unverified keywords: {}", self.audit.hallucinations.join(", "));
        }
        if !self.audit.leaked_terms.is_empty() {
            let _ = writeln!(md, "- Leaked phrases: {}", self.audit.leaked_terms.join(", "));
        }
        match &self.advisory {
            AdvisoryReview::Review { text, .. } => {
                let _ = writeln!(md, "\n### Advisory Review\n\n{}", text);
            }
            AdvisoryReview::Failed { reason } => {
                let _ = writeln!(md, "\nAdvisory review failed: {}", reason);
            }
            AdvisoryReview::Unavailable => {}
        }

        let _ = writeln!(md, "\n## Evidence Appendix\n");
        if self.evidence_appendix.is_empty() {
            let _ = writeln!(md, "No evidence was retrieved.");
        }
        for item in &self.evidence_appendix {
            let _ = writeln!(md, "**[{}]** {} ({})\n> {}\n", item.id, item.source, item.url, item.excerpt);
        }

        if !self.diagnostics.is_empty() {
            let _ = writeln!(md, "\n## Diagnostics\n");
            for d in &self.diagnostics {
                let _ = writeln!(md, "- {}", d);
            }
        }

        md
    }
}

fn export_label(gate: ExportGate) -> &'static str {
    match gate {
        ExportGate::Open => "ready",
        ExportGate::RequiresAcknowledgement => "requires risk acknowledgement",
        ExportGate::Blocked => "blocked (risk gating failed)",
    }
}

fn render_variant(md: &mut String, variant: &ListingVariant) {
    let _ = writeln!(md, "**{}**\n", variant.title);
    for bullet in &variant.bullets {
        let _ = writeln!(md, "- {}", bullet);
    }
    let _ = writeln!(md, "\n{}\n", variant.description);
    for entry in &variant.faq {
        let _ = writeln!(md, "Q: {}\nA: {}\n", entry.question, entry.answer);
    }
    if let Some(script) = &variant.video_script {
        let _ = writeln!(md, "Video script:\n{}\n", script);
    }
}

/// Cut to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditMetrics, EvalReport};
    use crate::evidence::{EvidenceSet, SearchHit};
    use crate::gate::GenerationGate;
    use crate::listing::ListingVariant;
    use crate::product::{IntakeForm, ProductDescriptor};
    use crate::run::{Stage, StageDelta, StageOutput};
    use crate::verdict::ComplianceVerdict;
    use chrono::NaiveDate;

    fn finished_state(verdict: ComplianceVerdict, gating_passed: bool) -> RunState {
        let form = IntakeForm {
            product_name: Some("Rose Face Cream".to_string()),
            ..Default::default()
        };
        let product = ProductDescriptor::from_intake(form.clone());
        let constraints = GenerationGate::new().constrain(&verdict, product.qualifications());
        let listings = ListingsCollection {
            conversion: ListingVariant {
                title: "Rose Face Cream".to_string(),
                ..Default::default()
            },
            compliance: ListingVariant::default(),
            differences: vec![],
        };

        let mut state = RunState::new(form);
        let deltas = vec![
            StageDelta::Intake { product, warning: None },
            StageDelta::Evidence {
                queries: vec![],
                evidence: EvidenceSet::from_tagged_hits(
                    vec![("q", SearchHit::new("é".repeat(250)))],
                    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                ),
            },
            StageDelta::Audit { verdict },
            StageDelta::Insight { market: MarketContext::unavailable() },
            StageDelta::Generate { constraints, listings },
            StageDelta::Eval {
                report: EvalReport {
                    outcome: AuditOutcome {
                        metrics: AuditMetrics {
                            risk_gating_passed: gating_passed,
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    advisory: AdvisoryReview::Unavailable,
                    listings_present: true,
                },
            },
        ];
        for (stage, delta) in Stage::ALL.into_iter().zip(deltas) {
            state.begin(stage).unwrap();
            state.apply(StageOutput::new(delta)).unwrap();
        }
        state.finish().unwrap();
        state
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_excerpt("short", 200), "short");
        assert_eq!(truncate_excerpt("abcdef", 3), "abc...");
        let multibyte = "日本語テキスト";
        assert_eq!(truncate_excerpt(multibyte, 2), "日本...");
        assert_eq!(truncate_excerpt("abc", 3), "abc");
    }

    #[test]
    fn test_export_gate() {
        assert_eq!(ExportGate::evaluate(RiskTier::Green, true), ExportGate::Open);
        assert_eq!(ExportGate::evaluate(RiskTier::Red, true), ExportGate::RequiresAcknowledgement);
        assert_eq!(ExportGate::evaluate(RiskTier::Error, true), ExportGate::RequiresAcknowledgement);
        assert_eq!(ExportGate::evaluate(RiskTier::Green, false), ExportGate::Blocked);
        assert_eq!(ExportGate::evaluate(RiskTier::Yellow, true), ExportGate::Open);
        assert!(ExportGate::RequiresAcknowledgement.permits_export(true));
        assert!(!ExportGate::RequiresAcknowledgement.permits_export(false));
        assert!(!ExportGate::Blocked.permits_export(true));
    }

    #[test]
    fn test_compose_from_run() {
        let state = finished_state(ComplianceVerdict::error("timeout"), true);
        let report = LaunchReport::compose(&state, DEFAULT_EXCERPT_CHARS);

        assert_eq!(report.risk_level, RiskTier::Error);
        assert!(report.safe_mode);
        assert_eq!(report.export_gate, ExportGate::RequiresAcknowledgement);
        assert_eq!(report.evidence_appendix.len(), 1);
        assert_eq!(report.evidence_appendix[0].excerpt.chars().count(), 203);
        assert!(report.evidence_appendix[0].excerpt.ends_with("..."));

        let md = report.to_markdown();
        assert!(md.contains("# Launch Package: Rose Face Cream"));
        assert!(md.contains("**ERROR**"));
        assert!(md.contains("[E1]"));
    }

    #[test]
    fn test_unassessed_run_needs_acknowledgement() {
        let state = finished_state(ComplianceVerdict::unknown(), true);
        let report = LaunchReport::compose(&state, DEFAULT_EXCERPT_CHARS);
        assert_eq!(report.risk_level, RiskTier::Unknown);
        assert!(!report.safe_mode);
        assert_eq!(report.export_gate, ExportGate::RequiresAcknowledgement);
        assert!(!report.export_gate.permits_export(false));
    }

    #[test]
    fn test_failed_gating_blocks_export() {
        let state = finished_state(ComplianceVerdict::unknown(), false);
        let report = LaunchReport::compose(&state, DEFAULT_EXCERPT_CHARS);
        assert_eq!(report.export_gate, ExportGate::Blocked);
        assert!(report.to_markdown().contains("Risk gating: FAILED"));
    }
}
