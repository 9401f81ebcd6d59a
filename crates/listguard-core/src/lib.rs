//! # listguard-core
//!
//! Deterministic compliance engine for e-commerce product listings.
//!
//! This crate holds everything about a listing run that does not need a
//! network or a language model:
//! - product intake and the immutable [`ProductDescriptor`]
//! - the citable, deduplicated [`EvidenceSet`]
//! - [`ComplianceVerdict`] types and their validation against evidence
//! - the [`GenerationGate`] and its safe-mode template
//! - the rule-based [`OutputAuditor`]
//! - [`RunState`] and the [`LaunchReport`] composed from it
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the auditor is a pure function of its inputs
//! 2. **Citable**: an accepted verdict never points at evidence that does not exist
//! 3. **Gated**: RED and ERROR verdicts always produce the withheld-draft template
//!
//! ## Example
//!
//! ```rust,ignore
//! use listguard_core::{audit_listings, IntakeForm, ProductDescriptor};
//!
//! let product = ProductDescriptor::from_intake(IntakeForm::from_file("product.yaml")?);
//! let outcome = audit_listings(&listings, &verdict, &product);
//! if !outcome.metrics.risk_gating_passed {
//!     eprintln!("unverified claims: {:?}", outcome.hallucinations);
//! }
//! ```

pub mod audit;
pub mod evidence;
pub mod gate;
pub mod listing;
pub mod market;
pub mod product;
pub mod report;
pub mod run;
pub mod verdict;
pub mod vocabulary;

pub use audit::{
    AdvisoryReview, AuditMetrics, AuditOutcome, EvalReport, OutputAuditor, StructuredReview,
    HIGH_RISK_KEYWORDS,
};
pub use evidence::{
    policy_queries, CoverageReport, DataHealth, EvidenceId, EvidenceItem, EvidenceSet,
    RelevanceTier, SearchHit,
};
pub use gate::{BaselineConstraints, ConstraintSet, GenerationGate, SafeModeTemplate};
pub use listing::{FaqEntry, ListingVariant, ListingsCollection, VariantLabel};
pub use market::MarketContext;
pub use product::{
    IntakeError, IntakeForm, IntakeWarning, ProductDescriptor, Qualification, QualificationInput,
};
pub use report::{truncate_excerpt, ExportGate, LaunchReport, DEFAULT_EXCERPT_CHARS};
pub use run::{
    Diagnostic, DiagnosticKind, RunState, RunStateError, Stage, StageDelta, StageOutput,
    StageUsage,
};
pub use verdict::{
    Citation, ComplianceVerdict, Issue, ProhibitedExpression, RiskTier, Severity, VerdictError,
};
pub use vocabulary::{check_replacement, classify, ClaimStrength, ReplacementViolation};

/// Audit generated listings against a verdict and product.
///
/// Shorthand for [`OutputAuditor::audit`].
pub fn audit_listings(
    listings: &ListingsCollection,
    verdict: &ComplianceVerdict,
    product: &ProductDescriptor,
) -> AuditOutcome {
    OutputAuditor::new().audit(listings, verdict, product)
}
