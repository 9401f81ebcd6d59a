//! Prompts for the model-backed stages.
//!
//! Each prompt states its own output contract. The contract is also
//! enforced after the call (schema, citation and replacement checks), so
//! a prompt change can tighten behavior but never loosen it.

use serde::Serialize;

use listguard_core::{
    ComplianceVerdict, ConstraintSet, EvidenceSet, ListingsCollection, MarketContext,
    ProductDescriptor,
};

use crate::providers::ChatMessage;
use crate::schema::OutputSchema;

/// Risk assessor system prompt.
pub const ASSESSOR_PROMPT: &str = r#"
You are a strict compliance auditor for e-commerce product listings.
Analyze the product against the policy evidence and return a single JSON object.

## Tasks
1. risk_level: RED (prohibited or high risk), YELLOW (restricted), GREEN (safe).
2. confidence_score: 0.0 to 1.0, reflecting how well the evidence covers the product.
3. issues: every violation you find.
   - evidence_id MUST be the id of a passage below (e.g. "E1").
   - If no passage directly supports the finding, set evidence_id to "Rule Inference".
   - quote: copy the supporting snippet verbatim from the cited passage.
4. required_qualifications: certificates or registrations the seller must hold.
5. prohibited_expressions: risky phrases taken from the seller's input.
   - "suggested" MUST be safe, descriptive and non-functional wording.
   - NEVER introduce a new or stronger claim (do not replace "best" with "clinically tested").
   - Prefer hedges such as "formulated to", "appearance of", "contains".

## Rules
- Never cite an evidence id that is not listed.
- Never output risk_level ERROR.
- Output JSON only, no commentary.
"#;

/// Copywriter system prompt. `{constraints}` is replaced per run.
pub const COPYWRITER_PROMPT: &str = r#"
You are an expert e-commerce copywriter.
Generate two versions of a product listing and a difference summary:
- version_a: conversion-oriented
- version_b: compliance-oriented
- difference_summary: short statements of how the two versions differ

{constraints}

Output strictly one JSON object matching the schema below. No commentary.
"#;

/// Advisory reviewer prompt. Facts are checked by rules, not by this review.
pub const REVIEWER_PROMPT: &str = r#"
You are a QA auditor reviewing generated product listings.
Focus ONLY on tone, clarity and sales effectiveness.
DO NOT verify facts or compliance; that is done separately by rules.

Provide a JSON object with:
- overall_score (0-100)
- tone_feedback (string)
- clarity_feedback (string)
"#;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Messages for the risk assessment call.
pub fn assessor_messages(
    product: &ProductDescriptor,
    evidence: &EvidenceSet,
) -> Result<Vec<ChatMessage>, serde_json::Error> {
    let system = format!(
        "{}\n## Output Schema\n{}",
        ASSESSOR_PROMPT.trim(),
        OutputSchema::ComplianceVerdict.source()
    );
    let user = format!(
        "Product:\n{}\n\nEvidence:\n{}",
        to_json(product)?,
        to_json(evidence)?
    );
    Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

/// Messages for the listing generation call.
pub fn copywriter_messages(
    product: &ProductDescriptor,
    evidence: &EvidenceSet,
    verdict: &ComplianceVerdict,
    market: &MarketContext,
    constraints: &ConstraintSet,
) -> Result<Vec<ChatMessage>, serde_json::Error> {
    let system = format!(
        "{}\n## Output Schema\n{}",
        COPYWRITER_PROMPT
            .trim()
            .replace("{constraints}", &constraints.render_instructions(product)),
        OutputSchema::Listings.source()
    );

    let qualifications: Vec<&str> = product.qualifications().iter().map(|q| q.label()).collect();
    let user = format!(
        "Product:\n{}\n\nExisting Qualifications:\n{}\n\nCompliance Report:\n{}\n\nPolicy Evidence:\n{}\n\nMarket Data:\n{}",
        to_json(product)?,
        to_json(&qualifications)?,
        to_json(verdict)?,
        to_json(evidence)?,
        to_json(market)?,
    );
    Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

/// Messages for the advisory review call.
pub fn reviewer_messages(listings: &ListingsCollection) -> Result<Vec<ChatMessage>, serde_json::Error> {
    Ok(vec![
        ChatMessage::system(REVIEWER_PROMPT.trim()),
        ChatMessage::user(format!("Listings:\n{}", to_json(listings)?)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use listguard_core::{GenerationGate, IntakeForm, SearchHit};

    fn product() -> ProductDescriptor {
        ProductDescriptor::from_intake(
            IntakeForm::from_yaml(
                "category: Dietary Supplements\nproduct_name: Vitamin C Capsules\nqualifications: FDA",
            )
            .unwrap(),
        )
    }

    fn evidence() -> EvidenceSet {
        EvidenceSet::from_tagged_hits(
            vec![("q", SearchHit::new("Disease claims are prohibited."))],
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        )
    }

    #[test]
    fn test_assessor_prompt_carries_evidence_ids_and_schema() {
        let messages = assessor_messages(&product(), &evidence()).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Rule Inference"));
        assert!(messages[0].content.contains("\"prohibited_expressions\""));
        assert!(messages[1].content.contains("\"E1\""));
        assert!(messages[1].content.contains("Vitamin C Capsules"));
    }

    #[test]
    fn test_copywriter_prompt_embeds_constraints() {
        let constraints = GenerationGate::new().constrain(&ComplianceVerdict::unknown(), product().qualifications());
        let messages = copywriter_messages(
            &product(),
            &evidence(),
            &ComplianceVerdict::unknown(),
            &MarketContext::unavailable(),
            &constraints,
        )
        .unwrap();
        assert!(!messages[0].content.contains("{constraints}"));
        assert!(messages[0].content.contains("FDA registered"));
        assert!(messages[0].content.contains("Use persuasive but compliant language."));
        assert!(messages[1].content.contains("Existing Qualifications"));
    }

    #[test]
    fn test_safe_mode_prompt_has_no_persuasive_instruction() {
        let constraints = GenerationGate::new().constrain(&ComplianceVerdict::error("boom"), &[]);
        let messages = copywriter_messages(
            &product(),
            &evidence(),
            &ComplianceVerdict::error("boom"),
            &MarketContext::unavailable(),
            &constraints,
        )
        .unwrap();
        assert!(messages[0].content.contains("[DRAFT - PENDING COMPLIANCE] Vitamin C Capsules"));
        assert!(!messages[0].content.contains("persuasive"));
    }
}
