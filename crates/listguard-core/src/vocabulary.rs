//! Claim vocabulary.
//!
//! Marketing phrases are classified into a fixed ordering of claim strength.
//! Safe replacements for prohibited expressions are checked against that
//! ordering: a replacement may hedge or describe, never escalate.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::verdict::ProhibitedExpression;

/// Claim strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrength {
    /// Objective facts: ingredients, size, count, materials.
    Descriptive,
    /// Appearance, feel, scent.
    Cosmetic,
    /// Asserts the product changes something ("boosts", "reduces").
    Functional,
    /// Asserts how well or how fast it works.
    Efficacy,
    /// Regulated certification, registration or guarantee.
    Certification,
    /// Disease, treatment or cure.
    Medical,
}

impl fmt::Display for ClaimStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClaimStrength::Descriptive => "descriptive",
            ClaimStrength::Cosmetic => "cosmetic",
            ClaimStrength::Functional => "functional",
            ClaimStrength::Efficacy => "efficacy",
            ClaimStrength::Certification => "certification",
            ClaimStrength::Medical => "medical",
        };
        f.write_str(label)
    }
}

/// Hedges a safe replacement may use to soften an appearance-type claim.
pub const APPROVED_HEDGES: &[&str] = &[
    "formulated to",
    "formulated with",
    "appearance of",
    "contains",
    "made with",
    "made from",
    "designed for",
    "crafted with",
];

lazy_static! {
    // =========================================================================
    // CLAIM STRENGTH PATTERNS (checked strongest first)
    // =========================================================================

    pub static ref MEDICAL_PATTERN: Regex = Regex::new(
        r"(?i)\b(cures?|cured|curing|treats?|treatment|heals?|healing|prevents?|prevention|diagnos\w*|disease|cancer|diabet\w*|covid|infection|virus|antiviral|antibacterial|anti-inflammatory|inflammation|arthritis|depression|insomnia|hypertension|remed(y|ies)|medical|medicinal|therapeutic|drug)\b"
    ).unwrap();

    pub static ref CERTIFICATION_PATTERN: Regex = Regex::new(
        r"(?i)\b(fda|usda|gmp|certified|certification|approved|registered|organic|clinically|dermatologist[- ]tested|lab[- ]tested|guaranteed?|patented)\b"
    ).unwrap();

    pub static ref EFFICACY_PATTERN: Regex = Regex::new(
        r"(?i)(\binstant(ly)?\b|\bproven\b|100\s?%|#\s?1\b|\bnumber one\b|\bbest in the world\b|\bmiracle\b|\bpermanent(ly)?\b|\bfast[- ]acting\b|\bworks in\b|\bimmediate(ly)?\b|\bguaranteed results\b)"
    ).unwrap();

    pub static ref FUNCTIONAL_PATTERN: Regex = Regex::new(
        r"(?i)\b(boosts?|boosting|improves?|improving|reduces?|reducing|repairs?|strengthens?|supports?|promotes?|enhances?|relie(f|ves?)|fights?|protects?|burns?|detox\w*|anti-aging|anti-wrinkle|whiten\w*|lightens?|regenerat\w*|stimulat\w*|increases?|lowers?|eliminates?|removes?|restores?)\b"
    ).unwrap();

    pub static ref COSMETIC_PATTERN: Regex = Regex::new(
        r"(?i)\b(appearance|looks?|feels?|smooth(er)?|soft(er)?|radiant|glow(ing|y)?|hydrat\w*|moistur\w*|refresh\w*|fragrance|scent(ed)?|silky|bright(er|ening)?|fresh)\b"
    ).unwrap();

    /// Functional verbs that only act on appearance read as cosmetic ("reduces the appearance of").
    static ref APPEARANCE_PHRASE: Regex = Regex::new(
        r"(?i)\b(improves?|reduces?|minimi[sz]es?|smooths?|brightens?|softens?)\s+the\s+(look|appearance)\s+of\b"
    ).unwrap();

    // =========================================================================
    // BENEFIT LANGUAGE
    // =========================================================================

    /// Benefit-oriented wording that has no place in a facts-only bullet.
    pub static ref BENEFIT_PATTERN: Regex = Regex::new(
        r"(?i)\b(helps?|helping|benefits?|beneficial|ideal for|perfect for|great for|better|healthier|healthy|wellness|so you can|enjoy|effective(ly)?|powerful|results?|transform\w*|revitali[sz]\w*|nourish\w*|energi[sz]\w*|vitality|best|top|premium|luxur\w*|loved?|favou?rite|amazing|incredible|awesome|ultimate|superior|happy|satisf\w*|delicious|tast(y|es?)|must-have|award-winning|world-class|trusted|popular|selling|number one)\b|#\s*1\b"
    ).unwrap();

    // =========================================================================
    // QUANTITIES
    // =========================================================================

    /// A number with a unit or a count noun: "500mg", "60 capsules", "2 fl oz", "100%".
    static ref QUANTITY_PATTERN: Regex = Regex::new(
        r"(?i)\b\d+(?:[.,]\d+)*\s*(?:%|(?:mg|mcg|µg|g|kg|ml|l|oz|fl\.?\s?oz|lbs?|cm|mm|m|in|inch(?:es)?|ft|iu|capsules?|caps|tablets?|tabs|softgels?|gummies|pieces?|pcs|count|ct|pack|packs|servings?|bottles?|sachets?|pouches?|x)\b)"
    ).unwrap();
}

/// Classify the strongest claim a phrase makes.
pub fn classify(text: &str) -> ClaimStrength {
    let mut strength = ClaimStrength::Descriptive;

    let remainder = if APPEARANCE_PHRASE.is_match(text) {
        strength = ClaimStrength::Cosmetic;
        APPEARANCE_PHRASE.replace_all(text, " ").into_owned()
    } else {
        text.to_string()
    };

    let ladder: [(&Regex, ClaimStrength); 5] = [
        (&MEDICAL_PATTERN, ClaimStrength::Medical),
        (&CERTIFICATION_PATTERN, ClaimStrength::Certification),
        (&EFFICACY_PATTERN, ClaimStrength::Efficacy),
        (&FUNCTIONAL_PATTERN, ClaimStrength::Functional),
        (&COSMETIC_PATTERN, ClaimStrength::Cosmetic),
    ];

    for (pattern, level) in ladder {
        if pattern.is_match(&remainder) {
            return strength.max(level);
        }
    }

    strength
}

/// True when the phrase uses one of [`APPROVED_HEDGES`].
pub fn uses_approved_hedge(text: &str) -> bool {
    let lower = text.to_lowercase();
    APPROVED_HEDGES.iter().any(|hedge| lower.contains(hedge))
}

/// True when the phrase promises a benefit rather than stating a fact.
pub fn has_benefit_language(text: &str) -> bool {
    BENEFIT_PATTERN.is_match(text)
}

/// True when the text states a measurable amount or count.
pub fn states_quantity(text: &str) -> bool {
    QUANTITY_PATTERN.is_match(text)
}

/// Why a suggested replacement is unsafe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplacementViolation {
    #[error("Replacement for '{original}' is empty")]
    Empty { original: String },

    #[error("Replacement '{replacement}' ({replacement_strength}) is a stronger claim than '{original}' ({original_strength})")]
    Escalates {
        original: String,
        replacement: String,
        original_strength: ClaimStrength,
        replacement_strength: ClaimStrength,
    },

    #[error("Replacement '{replacement}' makes a {strength} claim; only descriptive or hedged cosmetic wording is allowed")]
    NonDescriptive {
        replacement: String,
        strength: ClaimStrength,
    },

    #[error("Replacement '{replacement}' makes an appearance claim without an approved hedge")]
    UnhedgedAppearance { replacement: String },
}

/// Check that a prohibited expression's replacement stays inside the safe vocabulary.
pub fn check_replacement(expression: &ProhibitedExpression) -> Result<(), ReplacementViolation> {
    let replacement = expression.replacement.trim();
    if replacement.is_empty() {
        return Err(ReplacementViolation::Empty {
            original: expression.original.clone(),
        });
    }

    let original_strength = classify(&expression.original);
    let replacement_strength = classify(replacement);

    if replacement_strength > original_strength {
        return Err(ReplacementViolation::Escalates {
            original: expression.original.clone(),
            replacement: replacement.to_string(),
            original_strength,
            replacement_strength,
        });
    }

    if replacement_strength > ClaimStrength::Cosmetic {
        return Err(ReplacementViolation::NonDescriptive {
            replacement: replacement.to_string(),
            strength: replacement_strength,
        });
    }

    if replacement_strength == ClaimStrength::Cosmetic && !uses_approved_hedge(replacement) {
        return Err(ReplacementViolation::UnhedgedAppearance {
            replacement: replacement.to_string(),
        });
    }

    Ok(())
}
