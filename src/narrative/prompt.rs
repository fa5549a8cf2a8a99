use super::payload::NarrativePayload;
use crate::error::Result;

pub const SYSTEM_PROMPT: &str = "You are a senior SME financial advisor.";

/// Instructions sent with every payload. The model must answer in plain prose so the
/// response passes sanitization without edits.
const INSTRUCTIONS: &str = r#"Write a concise, business-owner-friendly summary of the financial health assessment below.

Rules:
- Use only the facts in the JSON payload. Do not invent figures.
- Mention the overall score and risk level, the strongest and weakest areas, and any data quality issues.
- Add one or two concrete recommendations.
- Plain text paragraphs only: no markdown, no HTML, no code blocks, no links."#;

pub fn user_prompt(payload: &NarrativePayload) -> Result<String> {
    let json = serde_json::to_string_pretty(payload)?;
    let mut prompt = String::from(INSTRUCTIONS);

    if let Some(locale) = payload.style_hints.locale.as_deref() {
        prompt.push_str(&format!("\n- Write for readers in the '{}' locale.", locale));
    }
    prompt.push_str(&format!(
        "\n- Stay under {} characters.\n\nAssessment payload:\n{}",
        payload.style_hints.max_chars, json
    ));
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::payload::{EntitySummary, ScorePayload, StyleHints};
    use crate::scoring::{RiskLevel, ScoreStatus};

    #[test]
    fn test_prompt_embeds_payload_and_hints() {
        let payload = NarrativePayload {
            entity_summary: EntitySummary {
                entity_id: "acme-ltd".to_string(),
                industry: Some("retail".to_string()),
                locale: Some("en-GB".to_string()),
                period_count: 2,
                scored_period: Some("FY2023".to_string()),
            },
            score_payload: ScorePayload {
                composite: 70.0,
                confidence: 0.5,
                status: ScoreStatus::Normal,
                risk_level: RiskLevel::Medium,
                categories: vec![],
                strongest: vec![],
                weakest: vec![],
                flags: vec![],
                unmapped_items: 1,
                benchmarks: vec![],
            },
            style_hints: StyleHints {
                locale: Some("en-GB".to_string()),
                audience: "business owner".to_string(),
                max_chars: 1200,
            },
        };

        let prompt = user_prompt(&payload).unwrap();
        assert!(prompt.contains("\"entity_id\": \"acme-ltd\""));
        assert!(prompt.contains("'en-GB' locale"));
        assert!(prompt.contains("under 1200 characters"));
    }
}
