//! Pipeline orchestrator.
//!
//! A strict linear run: Intake, Evidence, Audit, Insight, Generate, Eval.
//! Every stage runs exactly once, in that order, whatever earlier stages
//! found. Stages read the run state and return only their own delta; the
//! orchestrator merges it. A stage never fails the run: it degrades its own
//! output and records diagnostics instead.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

use listguard_core::{
    Diagnostic, DiagnosticKind, EvalReport, IntakeForm, MarketContext, OutputAuditor,
    ProductDescriptor, RunState, RunStateError, Stage, StageDelta, StageOutput,
};

use crate::assessor::RiskAssessor;
use crate::client::ModelClient;
use crate::config::RuntimeConfig;
use crate::evidence::{EvidenceAggregator, PolicySearch};
use crate::generator::{GenerationInput, ListingGenerator};
use crate::market::MarketInsightSource;
use crate::providers::LlmProvider;
use crate::reviewer::AdvisoryReviewer;
use crate::usage::UsageTracker;

/// Errors from the orchestrator itself. Stage failures are never errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Policy search backend not configured")]
    MissingSearch,

    #[error("Run state violation: {0}")]
    State(#[from] RunStateError),
}

/// One pipeline stage.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn stage(&self) -> Stage;

    /// Produce this stage's delta from a read-only view of the run.
    async fn run(&self, state: &RunState) -> StageOutput;
}

/// Progress hook. Carries no meaning for the pipeline itself.
pub trait StageObserver: Send + Sync {
    fn stage_started(&self, stage: Stage);

    fn stage_finished(&self, _stage: Stage, _state: &RunState) {}
}

pub struct IntakeStage;

#[async_trait]
impl PipelineStage for IntakeStage {
    fn stage(&self) -> Stage {
        Stage::Intake
    }

    async fn run(&self, state: &RunState) -> StageOutput {
        let product = ProductDescriptor::from_intake(state.form().clone());
        let warning = product.consistency_warning();

        let mut output = StageOutput::new(StageDelta::Intake {
            product,
            warning: warning.clone(),
        });
        if let Some(warning) = warning {
            tracing::warn!(warning = %warning, "Intake consistency warning");
            output = output.with_diagnostic(Diagnostic::new(
                Stage::Intake,
                DiagnosticKind::InputWarning,
                warning.message,
            ));
        }
        output
    }
}

pub struct EvidenceStage {
    search: Arc<dyn PolicySearch>,
    aggregator: EvidenceAggregator,
    retrieved_on: Option<NaiveDate>,
}

impl EvidenceStage {
    pub fn new(search: Arc<dyn PolicySearch>) -> Self {
        Self {
            search,
            aggregator: EvidenceAggregator::new(),
            retrieved_on: None,
        }
    }

    /// Fix the retrieval date instead of using today's.
    pub fn with_retrieval_date(mut self, date: NaiveDate) -> Self {
        self.retrieved_on = Some(date);
        self
    }
}

#[async_trait]
impl PipelineStage for EvidenceStage {
    fn stage(&self) -> Stage {
        Stage::Evidence
    }

    async fn run(&self, state: &RunState) -> StageOutput {
        let date = self.retrieved_on.unwrap_or_else(|| Utc::now().date_naive());
        let gathered = self
            .aggregator
            .gather(state.product(), self.search.as_ref(), date)
            .await;

        StageOutput::new(StageDelta::Evidence {
            queries: gathered.queries,
            evidence: gathered.evidence,
        })
        .with_diagnostics(gathered.diagnostics)
    }
}

pub struct AuditStage {
    assessor: RiskAssessor,
}

impl AuditStage {
    pub fn new(client: Option<ModelClient>) -> Self {
        Self {
            assessor: RiskAssessor::new(client),
        }
    }
}

#[async_trait]
impl PipelineStage for AuditStage {
    fn stage(&self) -> Stage {
        Stage::Audit
    }

    async fn run(&self, state: &RunState) -> StageOutput {
        let assessment = self.assessor.assess(state.product(), state.evidence()).await;
        StageOutput::new(StageDelta::Audit {
            verdict: assessment.verdict,
        })
        .with_diagnostics(assessment.diagnostics)
    }
}

pub struct InsightStage {
    source: Option<Arc<dyn MarketInsightSource>>,
}

impl InsightStage {
    pub fn new(source: Option<Arc<dyn MarketInsightSource>>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PipelineStage for InsightStage {
    fn stage(&self) -> Stage {
        Stage::Insight
    }

    async fn run(&self, state: &RunState) -> StageOutput {
        let Some(source) = &self.source else {
            return StageOutput::new(StageDelta::Insight {
                market: MarketContext::unavailable(),
            })
            .with_diagnostic(Diagnostic::new(
                Stage::Insight,
                DiagnosticKind::ToolUnavailable,
                "no market insight source configured",
            ));
        };

        match source.insight(state.product()).await {
            Ok(market) => StageOutput::new(StageDelta::Insight { market }),
            Err(e) => {
                tracing::warn!(error = %e, "Market insight failed");
                StageOutput::new(StageDelta::Insight {
                    market: MarketContext::unavailable(),
                })
                .with_diagnostic(Diagnostic::new(
                    Stage::Insight,
                    DiagnosticKind::ExternalCallFailure,
                    e.to_string(),
                ))
            }
        }
    }
}

pub struct GenerateStage {
    generator: ListingGenerator,
}

impl GenerateStage {
    pub fn new(client: Option<ModelClient>) -> Self {
        Self {
            generator: ListingGenerator::new(client),
        }
    }
}

#[async_trait]
impl PipelineStage for GenerateStage {
    fn stage(&self) -> Stage {
        Stage::Generate
    }

    async fn run(&self, state: &RunState) -> StageOutput {
        let generation = self
            .generator
            .generate(GenerationInput {
                product: state.product(),
                evidence: state.evidence(),
                verdict: state.verdict(),
                market: state.market(),
            })
            .await;

        StageOutput::new(StageDelta::Generate {
            constraints: generation.constraints,
            listings: generation.listings,
        })
        .with_diagnostics(generation.diagnostics)
    }
}

pub struct EvalStage {
    auditor: OutputAuditor,
    reviewer: AdvisoryReviewer,
}

impl EvalStage {
    pub fn new(client: Option<ModelClient>) -> Self {
        Self {
            auditor: OutputAuditor::new(),
            reviewer: AdvisoryReviewer::new(client),
        }
    }
}

#[async_trait]
impl PipelineStage for EvalStage {
    fn stage(&self) -> Stage {
        Stage::Eval
    }

    async fn run(&self, state: &RunState) -> StageOutput {
        let listings = state.listings();
        // Metrics first; the review cannot influence them.
        let outcome = self.auditor.audit(listings, state.verdict(), state.product());
        let (advisory, diagnostic) = self.reviewer.review(listings).await;

        tracing::info!(
            gating_passed = outcome.metrics.risk_gating_passed,
            hallucinations = outcome.metrics.hallucination_count,
            leaked = outcome.metrics.prohibited_terms_output,
            "Output audit complete"
        );

        StageOutput::new(StageDelta::Eval {
            report: EvalReport {
                outcome,
                advisory,
                listings_present: !listings.is_empty(),
            },
        })
        .with_diagnostics(diagnostic)
    }
}

/// The six-stage launch pipeline.
pub struct LaunchPipeline {
    intake: IntakeStage,
    evidence: EvidenceStage,
    audit: AuditStage,
    insight: InsightStage,
    generate: GenerateStage,
    eval: EvalStage,
    observer: Option<Arc<dyn StageObserver>>,
    usage: Arc<UsageTracker>,
    config: RuntimeConfig,
}

impl LaunchPipeline {
    pub fn builder() -> LaunchPipelineBuilder {
        LaunchPipelineBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn stages(&self) -> [&dyn PipelineStage; 6] {
        [
            &self.intake,
            &self.evidence,
            &self.audit,
            &self.insight,
            &self.generate,
            &self.eval,
        ]
    }

    /// Run every stage once, in order, and return the finished state.
    ///
    /// Only a broken state machine is an error; degraded stages are not.
    pub async fn run(&self, form: IntakeForm) -> Result<RunState, PipelineError> {
        let mut state = RunState::new(form);

        for stage in self.stages() {
            let name = stage.stage();
            state.begin(name)?;
            if let Some(observer) = &self.observer {
                observer.stage_started(name);
            }

            let before = self.usage.for_stage(name);
            let started = Instant::now();

            let span = tracing::info_span!("stage", stage = %name);
            let output = stage.run(&state).instrument(span).await;

            let elapsed = started.elapsed().as_millis() as u64;
            let used = self.usage.for_stage(name).since(&before);

            for diagnostic in &output.diagnostics {
                tracing::debug!(stage = %name, kind = %diagnostic.kind, "{}", diagnostic.message);
            }

            state.apply(output)?;
            state.record_usage(name, used.to_stage_usage(elapsed));

            if let Some(observer) = &self.observer {
                observer.stage_finished(name, &state);
            }
        }

        state.finish()?;
        tracing::info!(
            risk = %state.verdict().risk_level,
            diagnostics = state.diagnostics().len(),
            "Run finished"
        );
        Ok(state)
    }
}

/// Builder for [`LaunchPipeline`].
pub struct LaunchPipelineBuilder {
    config: RuntimeConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    search: Option<Arc<dyn PolicySearch>>,
    market: Option<Arc<dyn MarketInsightSource>>,
    observer: Option<Arc<dyn StageObserver>>,
    retrieved_on: Option<NaiveDate>,
}

impl LaunchPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            provider: None,
            search: None,
            market: None,
            observer: None,
            retrieved_on: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Model provider. Without one, the model-backed stages degrade.
    pub fn provider(mut self, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        self.provider = provider;
        self
    }

    pub fn search(mut self, search: Arc<dyn PolicySearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn market(mut self, market: Arc<dyn MarketInsightSource>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn retrieval_date(mut self, date: NaiveDate) -> Self {
        self.retrieved_on = Some(date);
        self
    }

    pub fn build(self) -> Result<LaunchPipeline, PipelineError> {
        let search = self.search.ok_or(PipelineError::MissingSearch)?;
        let usage = Arc::new(UsageTracker::new());

        let client = self
            .provider
            .map(|provider| ModelClient::new(provider, self.config.clone(), Arc::clone(&usage)));

        let mut evidence = EvidenceStage::new(search);
        if let Some(date) = self.retrieved_on {
            evidence = evidence.with_retrieval_date(date);
        }

        Ok(LaunchPipeline {
            intake: IntakeStage,
            evidence,
            audit: AuditStage::new(client.clone()),
            insight: InsightStage::new(self.market),
            generate: GenerateStage::new(client.clone()),
            eval: EvalStage::new(client),
            observer: self.observer,
            usage,
            config: self.config,
        })
    }
}

impl Default for LaunchPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
