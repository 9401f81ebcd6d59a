//! Generation gate.
//!
//! Decides which constraints the listing generator works under. Baseline
//! constraints always apply below the top risk tier. At RED (and ERROR) the
//! constraint set is replaced wholesale by the safe-mode correction template,
//! which is also enforced on whatever the generator returns.

use serde::{Deserialize, Serialize};

use crate::listing::ListingsCollection;
use crate::product::{ProductDescriptor, Qualification};
use crate::verdict::{ComplianceVerdict, RiskTier};
use crate::vocabulary::{classify, has_benefit_language, states_quantity, ClaimStrength};

/// Regulated claims as shown to the generator. Lower-cased, these are exactly
/// the auditor's high-risk keywords, so a claim the gate permits is one the
/// auditor accepts.
pub const REGULATED_CLAIMS: &[&str] = &[
    "FDA registered",
    "FDA approved",
    "GMP",
    "USDA Organic",
    "Clinically tested",
    "Clinically proven",
    "Certified",
    "Guaranteed",
];

pub const PERSUASIVE_INSTRUCTION: &str = "Use persuasive but compliant language.";

/// Constraints that hold whenever safe mode is off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineConstraints {
    /// Regulated claims with no specific qualification behind them.
    pub unverified_claims: Vec<String>,
    /// Regulated claims backed by a specific qualification, with that qualification.
    pub verified_claims: Vec<(String, String)>,
    /// Phrases the verdict prohibits, to be excluded verbatim.
    pub excluded_phrases: Vec<String>,
}

impl BaselineConstraints {
    fn derive(verdict: &ComplianceVerdict, qualifications: &[Qualification]) -> Self {
        let mut unverified_claims = Vec::new();
        let mut verified_claims = Vec::new();

        // The qualification must state the claim itself; "FDA Registration No. 1"
        // backs neither "FDA registered" nor "FDA approved".
        for claim in REGULATED_CLAIMS {
            let backing = qualifications
                .iter()
                .find(|q| q.is_specific() && q.mentions(claim));
            match backing {
                Some(q) => verified_claims.push((claim.to_string(), q.label().to_string())),
                None => unverified_claims.push(claim.to_string()),
            }
        }

        Self {
            unverified_claims,
            verified_claims,
            excluded_phrases: verdict.prohibited_phrases().map(str::to_string).collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "STRICT CONSTRAINTS:".to_string(),
            "1. NEVER replace a prohibited term with a stronger functional or medical claim. Use only descriptive hedges such as \"formulated to\", \"appearance of\" or \"contains\".".to_string(),
        ];

        if self.unverified_claims.is_empty() {
            lines.push("2. Regulated certification claims are permitted only as backed by the declared qualifications.".to_string());
        } else {
            lines.push(format!(
                "2. DO NOT claim any of the following; the seller has not provided a specific certificate number or link: {}.",
                self.unverified_claims.join(", ")
            ));
        }

        for (claim, qualification) in &self.verified_claims {
            lines.push(format!("   - '{}' may be stated, backed by: {}", claim, qualification));
        }

        if self.excluded_phrases.is_empty() {
            lines.push("3. No phrases were flagged as prohibited.".to_string());
        } else {
            lines.push(format!(
                "3. STRICTLY EXCLUDE these phrases in every field: {}.",
                self.excluded_phrases
                    .iter()
                    .map(|p| format!("\"{}\"", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        lines.join("\n")
    }
}

/// The fixed correction template used at the top risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeModeTemplate {
    pub triggered_by: RiskTier,
}

impl SafeModeTemplate {
    pub const TITLE_PREFIX: &'static str = "[DRAFT - PENDING COMPLIANCE]";

    pub const WITHHOLDING_NOTICE: &'static str = "This listing draft is withheld pending compliance resolution. Please address the Red Level risks identified in the report.";

    pub const DIFFERENCE_NOTE: &'static str = "Safe mode: both versions are withheld drafts limited to objective product facts pending compliance resolution.";

    pub fn title_for(product: &ProductDescriptor) -> String {
        format!("{} {}", Self::TITLE_PREFIX, product.name())
    }

    pub fn render(&self, product: &ProductDescriptor) -> String {
        [
            format!(
                "SAFE MODE ({} risk). Generate a correction template only, not marketing copy.",
                self.triggered_by
            ),
            format!("1. Title must be exactly: \"{}\"", Self::title_for(product)),
            "2. Bullets: objective physical facts only (ingredients, size, count). No benefits, no functions, no claims.".to_string(),
            format!("3. Description must be exactly: \"{}\"", Self::WITHHOLDING_NOTICE),
            "4. No FAQ and no video script.".to_string(),
        ]
        .join("\n")
    }

    /// Force generated listings into the template shape.
    ///
    /// Empty collections stay empty. A bullet survives only if it states a
    /// quantity or names a declared material, and carries no claim or benefit
    /// wording. If nothing survives, the declared materials are used.
    pub fn enforce(&self, mut listings: ListingsCollection, product: &ProductDescriptor) -> ListingsCollection {
        if listings.is_empty() {
            return listings;
        }

        for variant in listings.variants_mut() {
            variant.title = Self::title_for(product);
            variant.bullets.retain(|b| is_objective_fact(b, product));
            if variant.bullets.is_empty() {
                variant.bullets = fallback_bullets(product);
            }
            variant.description = Self::WITHHOLDING_NOTICE.to_string();
            variant.faq.clear();
            variant.video_script = None;
        }

        listings.differences = vec![Self::DIFFERENCE_NOTE.to_string()];
        listings
    }
}

/// Safe-mode bullet filter: a quantity or a declared material is required,
/// claim and benefit wording is refused.
pub fn is_objective_fact(bullet: &str, product: &ProductDescriptor) -> bool {
    if bullet.trim().is_empty()
        || has_benefit_language(bullet)
        || classify(bullet) != ClaimStrength::Descriptive
    {
        return false;
    }
    states_quantity(bullet) || names_declared_material(bullet, product)
}

fn names_declared_material(bullet: &str, product: &ProductDescriptor) -> bool {
    let lower = bullet.to_lowercase();
    product
        .materials()
        .split([',', ';'])
        .map(|m| m.trim().to_lowercase())
        .filter(|m| m.chars().count() >= 3)
        .any(|m| lower.contains(&m))
}

fn fallback_bullets(product: &ProductDescriptor) -> Vec<String> {
    let materials = format!("Materials: {}", product.materials());
    if product.materials().is_empty() || !is_objective_fact(&materials, product) {
        return Vec::new();
    }
    vec![materials]
}

/// Constraints handed to the listing generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConstraintSet {
    Standard {
        baseline: BaselineConstraints,
        persuasive_instruction: String,
    },
    SafeMode(SafeModeTemplate),
}

impl ConstraintSet {
    pub fn is_safe_mode(&self) -> bool {
        matches!(self, ConstraintSet::SafeMode(_))
    }

    /// Instructions as they go into the generator prompt.
    pub fn render_instructions(&self, product: &ProductDescriptor) -> String {
        match self {
            ConstraintSet::Standard {
                baseline,
                persuasive_instruction,
            } => format!("{}\n{}", baseline.render(), persuasive_instruction),
            ConstraintSet::SafeMode(template) => template.render(product),
        }
    }

    /// Apply any post-generation enforcement. Only safe mode rewrites output.
    pub fn enforce(&self, listings: ListingsCollection, product: &ProductDescriptor) -> ListingsCollection {
        match self {
            ConstraintSet::Standard { .. } => listings,
            ConstraintSet::SafeMode(template) => template.enforce(listings, product),
        }
    }
}

/// Maps a verdict to generation constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationGate;

impl GenerationGate {
    pub fn new() -> Self {
        Self
    }

    pub fn constrain(&self, verdict: &ComplianceVerdict, qualifications: &[Qualification]) -> ConstraintSet {
        if verdict.risk_level.requires_safe_mode() {
            tracing::debug!(risk = %verdict.risk_level, "Safe mode constraints selected");
            return ConstraintSet::SafeMode(SafeModeTemplate {
                triggered_by: verdict.risk_level,
            });
        }

        ConstraintSet::Standard {
            baseline: BaselineConstraints::derive(verdict, qualifications),
            persuasive_instruction: PERSUASIVE_INSTRUCTION.to_string(),
        }
    }
}
