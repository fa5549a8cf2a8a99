use super::payload::NarrativePayload;
use crate::error::{FinancialHealthError, Result};
use crate::scoring::{RiskLevel, ScoreStatus};

fn rejected(reason: impl Into<String>) -> FinancialHealthError {
    FinancialHealthError::NarrativeRejected(reason.into())
}

/// `<tag ...>` or `</tag>`; a bare "<" followed by a space or digit is ordinary prose.
fn contains_markup(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.iter().enumerate().any(|(idx, b)| {
        *b == b'<'
            && bytes
                .get(idx + 1)
                .map(|next| next.is_ascii_alphabetic() || *next == b'/' || *next == b'!')
                .unwrap_or(false)
            && text[idx..].contains('>')
    })
}

/// Drops control characters, collapses runs of spaces and tabs, trims each line and
/// keeps at most one blank line between paragraphs.
fn tidy(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() && lines.last().map(String::is_empty).unwrap_or(true) {
            continue;
        }
        lines.push(collapsed);
    }
    while lines.last().map(String::is_empty).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

/// Validates and sanitizes text returned by the narrative service.
pub fn consume_narrative(raw: &str, max_chars: usize) -> Result<String> {
    let text = tidy(raw);

    if text.is_empty() {
        return Err(rejected("narrative is empty"));
    }
    let length = text.chars().count();
    if length > max_chars {
        return Err(rejected(format!(
            "narrative has {} characters, limit is {}",
            length, max_chars
        )));
    }
    if text.contains("```") {
        return Err(rejected("narrative contains a code block"));
    }
    if contains_markup(&text) {
        return Err(rejected("narrative contains markup"));
    }
    if text.to_lowercase().contains("javascript:") {
        return Err(rejected("narrative contains a script URL"));
    }
    if !text.chars().any(char::is_alphabetic) {
        return Err(rejected("narrative has no readable text"));
    }

    Ok(text)
}

fn risk_word(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "moderate",
        RiskLevel::High => "high",
    }
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deterministic summary built only from the payload. Used whenever the narrative
/// service is disabled, fails or returns something unusable.
pub fn fallback_narrative(payload: &NarrativePayload) -> String {
    let entity = &payload.entity_summary;
    let score = &payload.score_payload;

    let period = entity
        .scored_period
        .as_deref()
        .map(|p| format!(" for {}", p))
        .unwrap_or_default();
    let mut parts = vec![format!(
        "The overall financial health score{} is {:.1}/100, indicating {} risk.",
        period,
        score.composite,
        risk_word(score.risk_level)
    )];

    if score.status == ScoreStatus::LowConfidence {
        parts.push(format!(
            "Only {:.0}% of the standard ratios could be fully computed, so treat this score with caution.",
            score.confidence * 100.0
        ));
    }

    if let Some(best) = score.strongest.first() {
        parts.push(format!(
            "The strongest indicator is {} ({:.2}), which measures {}.",
            lower_first(&best.label),
            best.value,
            lower_first(&best.interpretation)
        ));
    }
    if let Some(worst) = score.weakest.first() {
        parts.push(format!(
            "The weakest indicator is {} ({:.2}), which measures {}.",
            lower_first(&worst.label),
            worst.value,
            lower_first(&worst.interpretation)
        ));
    }

    for comparison in &score.benchmarks {
        parts.push(comparison.note.clone());
    }

    match score.flags.len() {
        0 => {}
        1 => parts.push("One data quality issue was noted in the submitted statements.".to_string()),
        n => parts.push(format!(
            "{} data quality issues were noted in the submitted statements.",
            n
        )),
    }
    if score.unmapped_items > 0 {
        parts.push(format!(
            "{} line item(s) could not be matched to a standard account and were left out.",
            score.unmapped_items
        ));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::payload::{EntitySummary, RatioHighlight, ScorePayload, StyleHints};
    use crate::ratios::RatioCategory;

    fn payload(status: ScoreStatus) -> NarrativePayload {
        NarrativePayload {
            entity_summary: EntitySummary {
                entity_id: "acme".to_string(),
                industry: None,
                locale: None,
                period_count: 1,
                scored_period: Some("FY2023".to_string()),
            },
            score_payload: ScorePayload {
                composite: 82.5,
                confidence: 0.25,
                status,
                risk_level: RiskLevel::Low,
                categories: vec![],
                strongest: vec![RatioHighlight {
                    name: "current_ratio".to_string(),
                    label: "Current ratio".to_string(),
                    interpretation: "Ability to cover short-term obligations".to_string(),
                    category: RatioCategory::Liquidity,
                    value: 2.0,
                    score: 100.0,
                }],
                weakest: vec![],
                flags: vec!["FY2023: unbalanced".to_string()],
                unmapped_items: 0,
                benchmarks: vec![],
            },
            style_hints: StyleHints {
                locale: None,
                audience: "business owner".to_string(),
                max_chars: 4000,
            },
        }
    }

    #[test]
    fn test_accepts_and_tidies_plain_text() {
        let text = consume_narrative("  Cash\u{0007} position   is\tstrong.\n\n\n\nKeep it up.  \n", 4000)
            .unwrap();
        assert_eq!(text, "Cash position is strong.\n\nKeep it up.");

        let text = consume_narrative("Margins < 5% need attention.", 4000).unwrap();
        assert_eq!(text, "Margins < 5% need attention.");
    }

    #[test]
    fn test_rejections() {
        let cases = [
            "   \n\t ",
            "<script>alert(1)</script> Your business is fine",
            "Here you go:\n```json\n{}\n```",
            "Click JavaScript:void(0) for details",
            "12,000 / 4.5 = 2,666",
        ];
        for raw in cases {
            let err = consume_narrative(raw, 4000).unwrap_err();
            assert!(matches!(err, FinancialHealthError::NarrativeRejected(_)), "{}", raw);
        }

        let long = "a".repeat(41);
        assert!(consume_narrative(&long, 40).is_err());
        assert!(consume_narrative(&long, 41).is_ok());
    }

    #[test]
    fn test_fallback_is_deterministic_and_payload_only() {
        let text = fallback_narrative(&payload(ScoreStatus::Normal));
        assert_eq!(text, fallback_narrative(&payload(ScoreStatus::Normal)));
        assert!(text.starts_with("The overall financial health score for FY2023 is 82.5/100"));
        assert!(text.contains("indicating low risk"));
        assert!(text.contains("current ratio (2.00)"));
        assert!(text.contains("One data quality issue"));
        assert!(!text.contains("caution"));

        let cautious = fallback_narrative(&payload(ScoreStatus::LowConfidence));
        assert!(cautious.contains("Only 25%"));
        assert!(consume_narrative(&cautious, 4000).is_ok());
    }
}
