//! One evidence pass: the three policy queries run in order against a
//! [`PolicySearch`] backend, and their hits are merged into an [`EvidenceSet`].
//! Search failures become diagnostics and never abort the pass.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use listguard_core::{
    policy_queries, Diagnostic, DiagnosticKind, EvidenceSet, ProductDescriptor, SearchHit, Stage,
};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search backend unavailable: {0}")]
    Unavailable(String),

    #[error("Search failed: {0}")]
    Failed(String),
}

/// Evidence backend. Returns hits in relevance order; may return none.
#[async_trait]
pub trait PolicySearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;

    /// Backend name for logs.
    fn name(&self) -> &str {
        "policy-search"
    }
}

/// Output of one evidence pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GatheredEvidence {
    pub queries: Vec<String>,
    pub evidence: EvidenceSet,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs the three policy queries and merges their hits.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvidenceAggregator;

impl EvidenceAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Query `search` once per policy query, in order, without retry.
    ///
    /// A failed query contributes no hits and a diagnostic; it never aborts
    /// the pass.
    pub async fn gather(
        &self,
        product: &ProductDescriptor,
        search: &dyn PolicySearch,
        retrieved_on: NaiveDate,
    ) -> GatheredEvidence {
        let queries = policy_queries(product);
        let mut tagged: Vec<(String, SearchHit)> = Vec::new();
        let mut diagnostics = Vec::new();

        for query in &queries {
            match search.search(query).await {
                Ok(hits) => {
                    tracing::debug!(query = %query, hits = hits.len(), "Policy search");
                    tagged.extend(hits.into_iter().map(|hit| (query.clone(), hit)));
                }
                Err(e) => {
                    tracing::warn!(
                        query = %query,
                        backend = search.name(),
                        error = %e,
                        "Policy search failed"
                    );
                    diagnostics.push(Diagnostic::new(
                        Stage::Evidence,
                        DiagnosticKind::ExternalCallFailure,
                        format!("search for '{}' failed: {}", query, e),
                    ));
                }
            }
        }

        let evidence = EvidenceSet::from_tagged_hits(tagged, retrieved_on);

        if evidence.is_empty() {
            tracing::warn!(category = product.category(), "No policy evidence retrieved");
            diagnostics.push(Diagnostic::new(
                Stage::Evidence,
                DiagnosticKind::EvidenceGap,
                "no policy evidence retrieved; risk assessment will be skipped",
            ));
        } else {
            let coverage = evidence.coverage();
            tracing::info!(
                items = evidence.len(),
                health = %coverage.health,
                "Evidence gathered"
            );
        }

        GatheredEvidence {
            queries: queries.to_vec(),
            evidence,
            diagnostics,
        }
    }
}
