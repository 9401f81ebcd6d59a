//! Listing generation under the gate's constraints.

use listguard_core::{
    ComplianceVerdict, ConstraintSet, Diagnostic, DiagnosticKind, EvidenceSet, GenerationGate,
    ListingsCollection, MarketContext, ProductDescriptor, Stage,
};

use crate::client::{GenerationError, ModelClient};
use crate::prompts;
use crate::schema::OutputSchema;

/// Everything the generate stage needs, borrowed from the run state.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub product: &'a ProductDescriptor,
    pub evidence: &'a EvidenceSet,
    pub verdict: &'a ComplianceVerdict,
    pub market: &'a MarketContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub constraints: ConstraintSet,
    pub listings: ListingsCollection,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ListingGenerator {
    client: Option<ModelClient>,
    gate: GenerationGate,
}

impl ListingGenerator {
    pub fn new(client: Option<ModelClient>) -> Self {
        Self {
            client,
            gate: GenerationGate::new(),
        }
    }

    /// Constrain, generate, then enforce the constraints on what came back.
    ///
    /// Without a model, or when the call fails, the listings are empty.
    pub async fn generate(&self, input: GenerationInput<'_>) -> Generation {
        let constraints = self
            .gate
            .constrain(input.verdict, input.product.qualifications());

        if constraints.is_safe_mode() {
            tracing::warn!(risk = %input.verdict.risk_level, "Safe mode active for listing generation");
        }

        let Some(client) = &self.client else {
            return Generation {
                constraints,
                listings: ListingsCollection::empty(),
                diagnostics: vec![Diagnostic::new(
                    Stage::Generate,
                    DiagnosticKind::ToolUnavailable,
                    "no model configured; no listings generated",
                )],
            };
        };

        match request(client, &input, &constraints).await {
            Ok(listings) => {
                let listings = constraints.enforce(listings, input.product);
                tracing::info!(safe_mode = constraints.is_safe_mode(), "Listings generated");
                Generation {
                    constraints,
                    listings,
                    diagnostics: Vec::new(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Listing generation failed");
                Generation {
                    constraints,
                    listings: ListingsCollection::empty(),
                    diagnostics: vec![Diagnostic::new(
                        Stage::Generate,
                        e.kind(),
                        format!("listing generation failed: {}", e),
                    )],
                }
            }
        }
    }
}

async fn request(
    client: &ModelClient,
    input: &GenerationInput<'_>,
    constraints: &ConstraintSet,
) -> Result<ListingsCollection, GenerationError> {
    let messages = prompts::copywriter_messages(
        input.product,
        input.evidence,
        input.verdict,
        input.market,
        constraints,
    )?;

    client
        .generate_structured(
            Stage::Generate,
            messages,
            OutputSchema::Listings,
            client.config().generator,
        )
        .await
}
