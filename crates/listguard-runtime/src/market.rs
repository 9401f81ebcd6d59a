//! Market insight port.

use async_trait::async_trait;
use thiserror::Error;

use listguard_core::{MarketContext, ProductDescriptor};

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Market data unavailable: {0}")]
    Unavailable(String),
}

/// Supplies market context for a product. The pipeline forwards it unread.
#[async_trait]
pub trait MarketInsightSource: Send + Sync {
    async fn insight(&self, product: &ProductDescriptor) -> Result<MarketContext, MarketError>;
}

/// Deterministic demo data derived from the category.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedMarketInsight;

pub const SIMULATED_SOURCE: &str = "Simulated Data (Demo)";

impl SimulatedMarketInsight {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MarketInsightSource for SimulatedMarketInsight {
    async fn insight(&self, product: &ProductDescriptor) -> Result<MarketContext, MarketError> {
        let category = product.category();
        let mut details = serde_json::Map::new();
        details.insert(
            "competitor_analysis".to_string(),
            serde_json::Value::String("Moderate competition".to_string()),
        );

        Ok(MarketContext {
            keywords: vec![
                format!("best {} 2026", category),
                format!("{} for beginners", category),
                format!("organic {}", category),
                format!("{} deals", category),
            ],
            trend: "Rising".to_string(),
            source: SIMULATED_SOURCE.to_string(),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listguard_core::IntakeForm;

    #[tokio::test]
    async fn test_simulated_insight_is_deterministic() {
        let product = ProductDescriptor::from_intake(
            IntakeForm::from_yaml("category: yoga mats").unwrap(),
        );
        let source = SimulatedMarketInsight::new();
        let first = source.insight(&product).await.unwrap();
        let second = source.insight(&product).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.keywords[0], "best yoga mats 2026");
        assert_eq!(first.source, SIMULATED_SOURCE);
        assert_eq!(first.details["competitor_analysis"], "Moderate competition");
    }
}
