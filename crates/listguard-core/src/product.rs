//! Product intake.
//!
//! The seller fills in a loosely-typed [`IntakeForm`]. Intake turns it into a
//! [`ProductDescriptor`], which is read by every later stage and never
//! mutated after construction.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Jurisdiction used when the seller leaves the target market blank.
pub const DEFAULT_JURISDICTION: &str = "US";

/// Product-name terms that indicate a topical cosmetic rather than a supplement.
const COSMETIC_NAME_TERMS: &[&str] = &["serum", "cream", "lotion", "moisturizer", "oil"];

lazy_static! {
    static ref URL_PATTERN: Regex = Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap();

    /// Alphanumeric token containing at least one digit (registration numbers, certificate ids).
    static ref IDENTIFIER_PATTERN: Regex = Regex::new(r"[A-Za-z0-9][A-Za-z0-9-]*").unwrap();
}

/// Errors that can occur when loading an intake form.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Failed to read intake file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Qualifications as typed by the seller: either a list or one comma-separated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualificationInput {
    List(Vec<String>),
    Text(String),
}

impl Default for QualificationInput {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl QualificationInput {
    fn into_labels(self) -> Vec<String> {
        let raw = match self {
            Self::List(items) => items,
            Self::Text(line) => line.split(',').map(str::to_string).collect(),
        };

        raw.into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect()
    }
}

/// Raw seller input, before intake.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeForm {
    #[serde(default)]
    pub target_country: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub product_name: Option<String>,

    #[serde(default)]
    pub material: Option<String>,

    #[serde(default)]
    pub function: Option<String>,

    #[serde(default)]
    pub target_audience: Option<String>,

    /// Marketing claims the seller wants to make.
    #[serde(default)]
    pub claims: Option<String>,

    /// Certificates or registrations the seller says they hold.
    #[serde(default)]
    pub qualifications: QualificationInput,
}

impl IntakeForm {
    /// Parse an intake form from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, IntakeError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse an intake form from JSON.
    pub fn from_json(json: &str) -> Result<Self, IntakeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load an intake form from disk; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }
}

/// A certificate or registration the seller claims to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qualification(String);

impl Qualification {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// True when the qualification carries an identifying detail: a link, or a
    /// token of four or more characters containing a digit (e.g. a registration number).
    ///
    /// A bare category name such as "FDA" or "GMP" is not specific.
    pub fn is_specific(&self) -> bool {
        if URL_PATTERN.is_match(&self.0) {
            return true;
        }

        IDENTIFIER_PATTERN.find_iter(&self.0).any(|m| {
            let token = m.as_str();
            token.chars().any(|c| c.is_ascii_digit())
                && token.chars().filter(|c| c.is_ascii_alphanumeric()).count() >= 4
        })
    }

    /// Case-insensitive check whether the label states `phrase` (e.g. "FDA registered").
    pub fn mentions(&self, phrase: &str) -> bool {
        self.0.to_lowercase().contains(&phrase.to_lowercase())
    }
}

impl fmt::Display for Qualification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Advisory raised at intake when the declared category and the product look inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeWarning {
    pub message: String,
}

impl fmt::Display for IntakeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The structured, immutable description of the product being listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDescriptor {
    jurisdiction: String,
    category: String,
    name: String,
    materials: String,
    function: String,
    audience: String,
    claims: String,
    qualifications: Vec<Qualification>,
}

impl ProductDescriptor {
    /// Build the descriptor from raw intake. Never fails: blank fields stay blank
    /// and the jurisdiction falls back to [`DEFAULT_JURISDICTION`].
    pub fn from_intake(form: IntakeForm) -> Self {
        fn clean(value: Option<String>) -> String {
            value.map(|v| v.trim().to_string()).unwrap_or_default()
        }

        let jurisdiction = match clean(form.target_country) {
            j if j.is_empty() => DEFAULT_JURISDICTION.to_string(),
            j => j,
        };

        Self {
            jurisdiction,
            category: clean(form.category),
            name: clean(form.product_name),
            materials: clean(form.material),
            function: clean(form.function),
            audience: clean(form.target_audience),
            claims: clean(form.claims),
            qualifications: form
                .qualifications
                .into_labels()
                .into_iter()
                .map(Qualification::new)
                .collect(),
        }
    }

    pub fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn materials(&self) -> &str {
        &self.materials
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn claims(&self) -> &str {
        &self.claims
    }

    pub fn qualifications(&self) -> &[Qualification] {
        &self.qualifications
    }

    /// All declared qualifications joined into one lower-case string.
    pub fn qualifications_text(&self) -> String {
        self.qualifications
            .iter()
            .map(Qualification::label)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Rule-based category consistency check.
    ///
    /// Flags a supplement category paired with a product name that reads like
    /// a topical cosmetic. The category itself is never changed here.
    pub fn consistency_warning(&self) -> Option<IntakeWarning> {
        let category = self.category.to_lowercase();
        if !category.contains("supplement") {
            return None;
        }

        let name = self.name.to_lowercase();
        let hits: Vec<&str> = COSMETIC_NAME_TERMS
            .iter()
            .copied()
            .filter(|term| name.contains(term))
            .collect();

        if hits.is_empty() {
            return None;
        }

        Some(IntakeWarning {
            message: format!(
                "Category mismatch detected: category is '{}' but product name '{}' contains cosmetic terms ({}). Please verify.",
                self.category,
                self.name,
                hits.join(", ")
            ),
        })
    }
}
