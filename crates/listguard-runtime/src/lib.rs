//! # listguard-runtime
//!
//! Model-backed pipeline runtime for listguard.
//!
//! `listguard-core` decides what a listing may say and checks what it does
//! say. This crate wires the core to its external collaborators:
//! - a [`PolicySearch`] backend for policy evidence
//! - an [`LlmProvider`] for risk assessment, copy generation and advisory review
//! - a [`MarketInsightSource`] for market context
//!
//! Every collaborator is optional at run time except the search backend. A
//! missing or failing collaborator degrades its stage; the run always
//! reaches its terminal state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use listguard_runtime::{LaunchPipeline, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("listguard.yaml")?.apply_env();
//! let provider = config.build_provider(&ProviderRegistry::with_defaults())?;
//!
//! let pipeline = LaunchPipeline::builder()
//!     .config(config)
//!     .provider(provider)
//!     .search(Arc::new(policy_index))
//!     .build()?;
//!
//! let state = pipeline.run(intake_form).await?;
//! ```

pub mod assessor;
pub mod client;
pub mod config;
pub mod evidence;
pub mod generator;
pub mod market;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod reviewer;
pub mod schema;
pub mod usage;

pub use assessor::{Assessment, RiskAssessor};
pub use client::{GenerationError, ModelClient};
pub use config::{ConfigError, RuntimeConfig, StageSettings};
pub use evidence::{EvidenceAggregator, GatheredEvidence, PolicySearch, SearchError};
pub use generator::{Generation, GenerationInput, ListingGenerator};
pub use market::{MarketError, MarketInsightSource, SimulatedMarketInsight};
pub use orchestrator::{
    AuditStage, EvalStage, EvidenceStage, GenerateStage, InsightStage, IntakeStage,
    LaunchPipeline, LaunchPipelineBuilder, PipelineError, PipelineStage, StageObserver,
};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, KeyLookup, LlmProvider,
    ProviderError, ProviderFactory, ProviderRegistry, TokenUsage,
};
pub use reviewer::AdvisoryReviewer;
pub use schema::OutputSchema;
pub use usage::{LlmUsage, UsageTracker};
