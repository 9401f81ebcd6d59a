//! JSON Schema validation for structured model output.
//!
//! Model replies are validated against the embedded schemas before they are
//! deserialized, so a reply that only loosely matches the Rust types is
//! rejected rather than coerced.

use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

const VERDICT_SCHEMA_JSON: &str = include_str!("../schemas/compliance_verdict.schema.json");
const LISTINGS_SCHEMA_JSON: &str = include_str!("../schemas/listings.schema.json");

static VERDICT_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static LISTINGS_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// Output shapes the pipeline requests from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    ComplianceVerdict,
    Listings,
}

impl OutputSchema {
    pub fn name(&self) -> &'static str {
        match self {
            OutputSchema::ComplianceVerdict => "ComplianceVerdict",
            OutputSchema::Listings => "ListingsCollection",
        }
    }

    /// Raw schema text, embedded into prompts.
    pub fn source(&self) -> &'static str {
        match self {
            OutputSchema::ComplianceVerdict => VERDICT_SCHEMA_JSON,
            OutputSchema::Listings => LISTINGS_SCHEMA_JSON,
        }
    }

    fn validator(&self) -> Result<&'static jsonschema::Validator, SchemaError> {
        let cell = match self {
            OutputSchema::ComplianceVerdict => &VERDICT_SCHEMA,
            OutputSchema::Listings => &LISTINGS_SCHEMA,
        };
        let source = self.source();

        let result = cell.get_or_init(|| {
            let schema_value: serde_json::Value = match serde_json::from_str(source) {
                Ok(v) => v,
                Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
            };

            jsonschema::options()
                .build(&schema_value)
                .map_err(|e| format!("Failed to compile schema: {}", e))
        });

        match result {
            Ok(v) => Ok(v),
            Err(e) => Err(SchemaError::LoadError(e.clone())),
        }
    }

    /// Validate a value, collecting every violation with its location.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), Vec<String>> {
        let validator = self.validator().map_err(|e| vec![e.to_string()])?;

        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl fmt::Display for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_schemas_compile() {
        assert!(OutputSchema::ComplianceVerdict.validator().is_ok());
        assert!(OutputSchema::Listings.validator().is_ok());
    }

    #[test]
    fn test_valid_verdict_passes() {
        let verdict = json!({
            "risk_level": "YELLOW",
            "confidence_score": 0.7,
            "issues": [{
                "issue": "Unsubstantiated immune claim",
                "risk_level": "YELLOW",
                "severity": "High",
                "suggestion": "Remove the claim",
                "evidence_id": "E2",
                "quote": "must be substantiated"
            }],
            "required_qualifications": ["Supplement facts panel"],
            "prohibited_expressions": [{"original": "boosts immunity", "suggested": "contains vitamin C"}]
        });
        assert!(OutputSchema::ComplianceVerdict.validate(&verdict).is_ok());
    }

    #[test]
    fn test_verdict_rejects_error_tier_and_bad_citation() {
        let verdict = json!({
            "risk_level": "ERROR",
            "confidence_score": 0.0,
            "issues": [{
                "issue": "x",
                "risk_level": "RED",
                "severity": "Critical",
                "suggestion": "y",
                "evidence_id": "Evidence 3"
            }],
            "required_qualifications": [],
            "prohibited_expressions": []
        });
        let errors = OutputSchema::ComplianceVerdict.validate(&verdict).unwrap_err();
        assert!(errors.len() >= 2);
        assert!(errors.iter().any(|e| e.contains("/issues/0/evidence_id")));
    }

    #[test]
    fn test_listings_require_both_variants() {
        let listings = json!({
            "version_a": {"title": "A", "bullets": [], "description": "d"},
            "difference_summary": []
        });
        assert!(OutputSchema::Listings.validate(&listings).is_err());
    }

    #[test]
    fn test_valid_listings_pass() {
        let listings = json!({
            "version_a": {"title": "A", "bullets": ["b"], "description": "d"},
            "version_b": {"title": "B", "bullets": [], "description": "d",
                          "faq": [{"question": "q", "answer": "a"}], "video_script": null},
            "difference_summary": ["A is bolder"]
        });
        assert!(OutputSchema::Listings.validate(&listings).is_ok());
    }
}
