//! Best-effort advisory review of generated listings.
//!
//! The review is informational. It runs after the deterministic audit and
//! nothing it returns feeds back into metrics or the export gate.

use listguard_core::{AdvisoryReview, Diagnostic, ListingsCollection, Stage};

use crate::client::ModelClient;
use crate::prompts;

pub struct AdvisoryReviewer {
    client: Option<ModelClient>,
}

impl AdvisoryReviewer {
    pub fn new(client: Option<ModelClient>) -> Self {
        Self { client }
    }

    pub async fn review(&self, listings: &ListingsCollection) -> (AdvisoryReview, Option<Diagnostic>) {
        let Some(client) = &self.client else {
            return (AdvisoryReview::Unavailable, None);
        };

        if listings.is_empty() {
            return (AdvisoryReview::Unavailable, None);
        }

        let messages = match prompts::reviewer_messages(listings) {
            Ok(messages) => messages,
            Err(e) => {
                return (
                    AdvisoryReview::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        };

        match client
            .generate_text(Stage::Eval, messages, client.config().reviewer)
            .await
        {
            Ok(text) => (AdvisoryReview::from_text(text), None),
            Err(e) => {
                tracing::warn!(error = %e, "Advisory review failed");
                let diagnostic = Diagnostic::new(
                    Stage::Eval,
                    e.kind(),
                    format!("advisory review failed: {}", e),
                );
                (
                    AdvisoryReview::Failed {
                        reason: e.to_string(),
                    },
                    Some(diagnostic),
                )
            }
        }
    }
}
