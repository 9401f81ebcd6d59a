//! Market context.
//!
//! Supplied by an external source and forwarded unmodified into the
//! generation prompt. Nothing in the pipeline interprets these fields.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub trend: String,

    #[serde(default)]
    pub source: String,

    /// Any extra fields the source provides.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl MarketContext {
    pub fn unavailable() -> Self {
        Self {
            keywords: Vec::new(),
            trend: "Unknown".to_string(),
            source: "Unavailable".to_string(),
            details: serde_json::Map::new(),
        }
    }
}

impl Default for MarketContext {
    fn default() -> Self {
        Self::unavailable()
    }
}
