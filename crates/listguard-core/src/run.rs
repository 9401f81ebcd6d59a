//! Run state.
//!
//! One [`RunState`] is threaded through the six pipeline stages. Stages never
//! mutate it directly: each reads the state and returns a [`StageOutput`]
//! carrying only the delta it owns. [`RunState::apply`] merges that delta and
//! refuses anything out of order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::audit::EvalReport;
use crate::evidence::EvidenceSet;
use crate::gate::ConstraintSet;
use crate::listing::ListingsCollection;
use crate::market::MarketContext;
use crate::product::{IntakeForm, IntakeWarning, ProductDescriptor};
use crate::verdict::ComplianceVerdict;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Evidence,
    Audit,
    Insight,
    Generate,
    Eval,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Intake,
        Stage::Evidence,
        Stage::Audit,
        Stage::Insight,
        Stage::Generate,
        Stage::Eval,
    ];

    pub fn next(&self) -> Option<Stage> {
        let index = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(index + 1).copied()
    }

    /// Human-readable progress label.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Intake => "Structuring product information",
            Stage::Evidence => "Retrieving policy evidence",
            Stage::Audit => "Assessing compliance risk",
            Stage::Insight => "Gathering market context",
            Stage::Generate => "Generating listings",
            Stage::Eval => "Auditing generated output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Intake => "intake",
            Stage::Evidence => "evidence",
            Stage::Audit => "audit",
            Stage::Insight => "insight",
            Stage::Generate => "generate",
            Stage::Eval => "eval",
        };
        f.write_str(name)
    }
}

/// Category of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// No generation capability configured.
    ToolUnavailable,
    /// Transport failure from an external collaborator.
    ExternalCallFailure,
    /// External output did not match the declared shape or failed validation.
    MalformedOutput,
    /// Zero or thin evidence.
    EvidenceGap,
    /// Advisory finding about the input itself.
    InputWarning,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::ToolUnavailable => "tool unavailable",
            DiagnosticKind::ExternalCallFailure => "external call failure",
            DiagnosticKind::MalformedOutput => "malformed output",
            DiagnosticKind::EvidenceGap => "evidence gap",
            DiagnosticKind::InputWarning => "input warning",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.message)
    }
}

/// The fields a single stage owns.
#[derive(Debug, Clone, PartialEq)]
pub enum StageDelta {
    Intake {
        product: ProductDescriptor,
        warning: Option<IntakeWarning>,
    },
    Evidence {
        queries: Vec<String>,
        evidence: EvidenceSet,
    },
    Audit {
        verdict: ComplianceVerdict,
    },
    Insight {
        market: MarketContext,
    },
    Generate {
        constraints: ConstraintSet,
        listings: ListingsCollection,
    },
    Eval {
        report: EvalReport,
    },
}

impl StageDelta {
    pub fn stage(&self) -> Stage {
        match self {
            StageDelta::Intake { .. } => Stage::Intake,
            StageDelta::Evidence { .. } => Stage::Evidence,
            StageDelta::Audit { .. } => Stage::Audit,
            StageDelta::Insight { .. } => Stage::Insight,
            StageDelta::Generate { .. } => Stage::Generate,
            StageDelta::Eval { .. } => Stage::Eval,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub delta: StageDelta,
    pub diagnostics: Vec<Diagnostic>,
}

impl StageOutput {
    pub fn new(delta: StageDelta) -> Self {
        Self {
            delta,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) -> Self {
        self.diagnostics.extend(diagnostics);
        self
    }
}

/// Model usage and timing recorded for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageUsage {
    pub llm_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub duration_ms: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunStateError {
    #[error("Stage {got} started out of order; expected {expected:?}")]
    OutOfOrder { expected: Option<Stage>, got: Stage },

    #[error("Delta for {delta} applied while {current:?} is running")]
    DeltaMismatch { current: Option<Stage>, delta: Stage },

    #[error("Run cannot finish: only {completed} of 6 stages completed")]
    Incomplete { completed: usize },

    #[error("Run already finished")]
    AlreadyFinished,
}

/// The single record threaded through one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    form: IntakeForm,
    product: ProductDescriptor,
    intake_warning: Option<IntakeWarning>,
    queries: Vec<String>,
    evidence: EvidenceSet,
    verdict: ComplianceVerdict,
    market: MarketContext,
    constraints: Option<ConstraintSet>,
    listings: ListingsCollection,
    eval: EvalReport,
    diagnostics: Vec<Diagnostic>,
    current_stage: Option<Stage>,
    completed: Vec<Stage>,
    usage: BTreeMap<Stage, StageUsage>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(form: IntakeForm) -> Self {
        Self {
            form,
            product: ProductDescriptor::default(),
            intake_warning: None,
            queries: Vec::new(),
            evidence: EvidenceSet::empty(),
            verdict: ComplianceVerdict::unknown(),
            market: MarketContext::unavailable(),
            constraints: None,
            listings: ListingsCollection::empty(),
            eval: EvalReport::default(),
            diagnostics: Vec::new(),
            current_stage: None,
            completed: Vec::new(),
            usage: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// The stage expected to run next, or `None` once all six have completed.
    pub fn expected_stage(&self) -> Option<Stage> {
        match self.completed.last() {
            None => Some(Stage::Intake),
            Some(last) => last.next(),
        }
    }

    /// Move the current-stage marker.
    pub fn begin(&mut self, stage: Stage) -> Result<(), RunStateError> {
        if self.finished_at.is_some() {
            return Err(RunStateError::AlreadyFinished);
        }
        let expected = self.expected_stage();
        if expected != Some(stage) || self.current_stage == Some(stage) {
            return Err(RunStateError::OutOfOrder { expected, got: stage });
        }
        self.current_stage = Some(stage);
        Ok(())
    }

    /// Merge a stage's delta. Each variant writes only its own fields.
    pub fn apply(&mut self, output: StageOutput) -> Result<(), RunStateError> {
        let delta_stage = output.delta.stage();
        let running = self.current_stage.filter(|s| !self.completed.contains(s));
        if running != Some(delta_stage) {
            return Err(RunStateError::DeltaMismatch {
                current: running,
                delta: delta_stage,
            });
        }

        match output.delta {
            StageDelta::Intake { product, warning } => {
                self.product = product;
                self.intake_warning = warning;
            }
            StageDelta::Evidence { queries, evidence } => {
                self.queries = queries;
                self.evidence = evidence;
            }
            StageDelta::Audit { verdict } => self.verdict = verdict,
            StageDelta::Insight { market } => self.market = market,
            StageDelta::Generate { constraints, listings } => {
                self.constraints = Some(constraints);
                self.listings = listings;
            }
            StageDelta::Eval { report } => self.eval = report,
        }

        self.diagnostics.extend(output.diagnostics);
        self.completed.push(delta_stage);
        Ok(())
    }

    pub fn record_usage(&mut self, stage: Stage, usage: StageUsage) {
        self.usage.insert(stage, usage);
    }

    /// Mark the run terminal. All six stages must have completed.
    pub fn finish(&mut self) -> Result<(), RunStateError> {
        if self.finished_at.is_some() {
            return Err(RunStateError::AlreadyFinished);
        }
        if self.completed.len() != Stage::ALL.len() {
            return Err(RunStateError::Incomplete {
                completed: self.completed.len(),
            });
        }
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn form(&self) -> &IntakeForm {
        &self.form
    }

    pub fn product(&self) -> &ProductDescriptor {
        &self.product
    }

    pub fn intake_warning(&self) -> Option<&IntakeWarning> {
        self.intake_warning.as_ref()
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn evidence(&self) -> &EvidenceSet {
        &self.evidence
    }

    pub fn verdict(&self) -> &ComplianceVerdict {
        &self.verdict
    }

    pub fn market(&self) -> &MarketContext {
        &self.market
    }

    pub fn constraints(&self) -> Option<&ConstraintSet> {
        self.constraints.as_ref()
    }

    pub fn listings(&self) -> &ListingsCollection {
        &self.listings
    }

    pub fn eval(&self) -> &EvalReport {
        &self.eval
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.current_stage
    }

    pub fn completed_stages(&self) -> &[Stage] {
        &self.completed
    }

    pub fn usage(&self) -> &BTreeMap<Stage, StageUsage> {
        &self.usage
    }

    pub fn total_usage(&self) -> StageUsage {
        self.usage.values().fold(StageUsage::default(), |acc, u| StageUsage {
            llm_calls: acc.llm_calls + u.llm_calls,
            input_tokens: acc.input_tokens + u.input_tokens,
            output_tokens: acc.output_tokens + u.output_tokens,
            estimated_cost_usd: acc.estimated_cost_usd + u.estimated_cost_usd,
            duration_ms: acc.duration_ms + u.duration_ms,
        })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GenerationGate;

    fn delta_for(stage: Stage) -> StageDelta {
        match stage {
            Stage::Intake => StageDelta::Intake {
                product: ProductDescriptor::from_intake(IntakeForm::default()),
                warning: None,
            },
            Stage::Evidence => StageDelta::Evidence {
                queries: vec!["q".to_string()],
                evidence: EvidenceSet::empty(),
            },
            Stage::Audit => StageDelta::Audit {
                verdict: ComplianceVerdict::error("boom"),
            },
            Stage::Insight => StageDelta::Insight {
                market: MarketContext::unavailable(),
            },
            Stage::Generate => StageDelta::Generate {
                constraints: GenerationGate::new().constrain(&ComplianceVerdict::unknown(), &[]),
                listings: ListingsCollection::empty(),
            },
            Stage::Eval => StageDelta::Eval {
                report: EvalReport::default(),
            },
        }
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::Intake.next(), Some(Stage::Evidence));
        assert_eq!(Stage::Generate.next(), Some(Stage::Eval));
        assert_eq!(Stage::Eval.next(), None);
    }

    #[test]
    fn test_full_run_visits_every_stage_once() {
        let mut state = RunState::new(IntakeForm::default());
        for stage in Stage::ALL {
            state.begin(stage).unwrap();
            assert_eq!(state.current_stage(), Some(stage));
            state
                .apply(StageOutput::new(delta_for(stage)).with_diagnostic(Diagnostic::new(
                    stage,
                    DiagnosticKind::InputWarning,
                    "note",
                )))
                .unwrap();
        }
        state.finish().unwrap();

        assert!(state.is_finished());
        assert_eq!(state.completed_stages(), &Stage::ALL);
        assert_eq!(state.diagnostics().len(), 6);
        assert_eq!(state.verdict().risk_level, crate::verdict::RiskTier::Error);
        assert_eq!(state.product().jurisdiction(), "US");
    }

    #[test]
    fn test_out_of_order_begin_is_rejected() {
        let mut state = RunState::new(IntakeForm::default());
        assert_eq!(
            state.begin(Stage::Audit),
            Err(RunStateError::OutOfOrder {
                expected: Some(Stage::Intake),
                got: Stage::Audit
            })
        );
    }

    #[test]
    fn test_stage_cannot_write_another_stages_fields() {
        let mut state = RunState::new(IntakeForm::default());
        state.begin(Stage::Intake).unwrap();
        let result = state.apply(StageOutput::new(delta_for(Stage::Audit)));
        assert!(matches!(result, Err(RunStateError::DeltaMismatch { .. })));
        assert_eq!(state.verdict(), &ComplianceVerdict::unknown());
    }

    #[test]
    fn test_stage_cannot_apply_twice() {
        let mut state = RunState::new(IntakeForm::default());
        state.begin(Stage::Intake).unwrap();
        state.apply(StageOutput::new(delta_for(Stage::Intake))).unwrap();
        assert!(state.apply(StageOutput::new(delta_for(Stage::Intake))).is_err());
    }

    #[test]
    fn test_finish_requires_all_stages() {
        let mut state = RunState::new(IntakeForm::default());
        assert_eq!(state.finish(), Err(RunStateError::Incomplete { completed: 0 }));
    }

    #[test]
    fn test_usage_totals() {
        let mut state = RunState::new(IntakeForm::default());
        state.record_usage(
            Stage::Audit,
            StageUsage {
                llm_calls: 1,
                input_tokens: 100,
                output_tokens: 50,
                ..Default::default()
            },
        );
        state.record_usage(
            Stage::Generate,
            StageUsage {
                llm_calls: 1,
                input_tokens: 200,
                ..Default::default()
            },
        );
        let total = state.total_usage();
        assert_eq!(total.llm_calls, 2);
        assert_eq!(total.input_tokens, 300);
    }
}
