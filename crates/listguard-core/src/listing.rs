//! Generated listing copy.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// One version of the listing copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingVariant {
    pub title: String,

    #[serde(default)]
    pub bullets: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faq: Vec<FaqEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_script: Option<String>,
}

impl ListingVariant {
    /// Every piece of visible text, in display order.
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str())
            .chain(self.bullets.iter().map(String::as_str))
            .chain(std::iter::once(self.description.as_str()))
            .chain(
                self.faq
                    .iter()
                    .flat_map(|entry| [entry.question.as_str(), entry.answer.as_str()]),
            )
            .chain(self.video_script.as_deref())
    }

    pub fn is_blank(&self) -> bool {
        self.text_fragments().all(|t| t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantLabel {
    ConversionOriented,
    ComplianceOriented,
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantLabel::ConversionOriented => f.write_str("Version A (conversion-oriented)"),
            VariantLabel::ComplianceOriented => f.write_str("Version B (compliance-oriented)"),
        }
    }
}

/// The two listing variants produced in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingsCollection {
    #[serde(rename = "version_a")]
    pub conversion: ListingVariant,

    #[serde(rename = "version_b")]
    pub compliance: ListingVariant,

    #[serde(rename = "difference_summary", default)]
    pub differences: Vec<String>,
}

impl ListingsCollection {
    /// Stand-in when generation was unavailable or failed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conversion.is_blank() && self.compliance.is_blank()
    }

    pub fn variants(&self) -> [(VariantLabel, &ListingVariant); 2] {
        [
            (VariantLabel::ConversionOriented, &self.conversion),
            (VariantLabel::ComplianceOriented, &self.compliance),
        ]
    }

    pub fn variants_mut(&mut self) -> [&mut ListingVariant; 2] {
        [&mut self.conversion, &mut self.compliance]
    }

    /// All text of both variants, lower-cased and newline-joined.
    pub fn haystack(&self) -> String {
        self.conversion
            .text_fragments()
            .chain(self.compliance.text_fragments())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase()
    }
}
