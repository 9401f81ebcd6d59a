//! Token usage and cost accounting.
//!
//! Every model call is recorded against the stage that made it; the
//! orchestrator folds the per-stage totals into the run state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use listguard_core::{Stage, StageUsage};

use crate::providers::TokenUsage;

/// Accumulated LLM usage for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,

    pub prompt_tokens: u64,

    pub completion_tokens: u64,

    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
            m if m.contains("gpt-4.1") => (2.0, 8.0),
            _ => (2.5, 10.0),
        };

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;

        input_cost + output_cost
    }

    /// Usage accumulated after `earlier` was taken.
    pub fn since(&self, earlier: &LlmUsage) -> LlmUsage {
        LlmUsage {
            total_tokens: self.total_tokens.saturating_sub(earlier.total_tokens),
            prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_sub(earlier.completion_tokens),
            llm_calls: self.llm_calls.saturating_sub(earlier.llm_calls),
            estimated_cost: (self.estimated_cost - earlier.estimated_cost).max(0.0),
        }
    }

    /// Convert to the run-state record, attaching wall-clock duration.
    pub fn to_stage_usage(&self, duration_ms: u64) -> StageUsage {
        StageUsage {
            llm_calls: self.llm_calls,
            input_tokens: self.prompt_tokens,
            output_tokens: self.completion_tokens,
            estimated_cost_usd: self.estimated_cost,
            duration_ms,
        }
    }
}

/// Per-stage usage shared by every model client in one pipeline.
#[derive(Debug, Default)]
pub struct UsageTracker {
    stages: RwLock<BTreeMap<Stage, LlmUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: Stage, usage: &TokenUsage, model: &str) {
        self.stages
            .write()
            .entry(stage)
            .or_default()
            .add(usage, model);
    }

    pub fn for_stage(&self, stage: Stage) -> LlmUsage {
        self.stages.read().get(&stage).cloned().unwrap_or_default()
    }

    pub fn total(&self) -> LlmUsage {
        self.stages
            .read()
            .values()
            .fold(LlmUsage::default(), |mut acc, u| {
                acc.total_tokens += u.total_tokens;
                acc.prompt_tokens += u.prompt_tokens;
                acc.completion_tokens += u.completion_tokens;
                acc.llm_calls += u.llm_calls;
                acc.estimated_cost += u.estimated_cost;
                acc
            })
    }

    /// Clear all recorded usage, e.g. between runs sharing one pipeline.
    pub fn reset(&self) {
        self.stages.write().clear();
    }
}
