use crate::assembler::{FinancialStatement, StatementFlag};
use crate::benchmarks::BenchmarkComparison;
use crate::ratios::{self, RatioCategory};
use crate::scoring::{HealthScore, RiskLevel, ScoreStatus, ScoredRatio};
use crate::utils::round_to;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const HIGHLIGHT_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntitySummary {
    pub entity_id: String,
    pub industry: Option<String>,
    pub locale: Option<String>,
    pub period_count: usize,
    /// Period the score describes, e.g. "FY2023"
    pub scored_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CategorySummary {
    pub category: RatioCategory,
    pub score: Option<f64>,
    pub weight: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatioHighlight {
    pub name: String,
    pub label: String,
    pub interpretation: String,
    pub category: RatioCategory,
    pub value: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScorePayload {
    pub composite: f64,
    pub confidence: f64,
    pub status: ScoreStatus,
    pub risk_level: RiskLevel,
    pub categories: Vec<CategorySummary>,
    pub strongest: Vec<RatioHighlight>,
    pub weakest: Vec<RatioHighlight>,
    /// Human-readable data quality findings
    pub flags: Vec<String>,
    pub unmapped_items: usize,
    pub benchmarks: Vec<BenchmarkComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StyleHints {
    pub locale: Option<String>,
    pub audience: String,
    pub max_chars: usize,
}

/// Everything the narrative service may see. Carries scores, ratios and findings but
/// never raw statement figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NarrativePayload {
    pub entity_summary: EntitySummary,
    pub score_payload: ScorePayload,
    pub style_hints: StyleHints,
}

impl NarrativePayload {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(NarrativePayload)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayloadContext<'a> {
    pub industry: Option<&'a str>,
    pub locale: Option<&'a str>,
    pub unmapped_items: usize,
    pub benchmarks: &'a [BenchmarkComparison],
    pub max_chars: usize,
}

fn highlight(ratio: &ScoredRatio) -> Option<RatioHighlight> {
    let definition = ratios::definition(&ratio.name)?;
    Some(RatioHighlight {
        name: ratio.name.clone(),
        label: definition.label.to_string(),
        interpretation: definition.interpretation.to_string(),
        category: definition.category,
        value: round_to(ratio.value, 4),
        score: round_to(ratio.score, 1),
    })
}

/// Orders by score, breaking ties by catalog position.
fn by_score(descending: bool) -> impl Fn(&&ScoredRatio, &&ScoredRatio) -> Ordering {
    move |a, b| {
        let ordering = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
        let ordering = if descending { ordering.reverse() } else { ordering };
        ordering.then_with(|| ratios::catalog_index(&a.name).cmp(&ratios::catalog_index(&b.name)))
    }
}

pub fn build_payload(
    statement: &FinancialStatement,
    score: &HealthScore,
    flags: &[StatementFlag],
    context: &PayloadContext<'_>,
) -> NarrativePayload {
    let mut scored = score.scored_ratios();

    scored.sort_by(by_score(true));
    let strongest: Vec<RatioHighlight> = scored
        .iter()
        .take(HIGHLIGHT_COUNT)
        .filter_map(|r| highlight(r))
        .collect();

    scored.sort_by(by_score(false));
    let weakest: Vec<RatioHighlight> = scored
        .iter()
        .filter(|r| !strongest.iter().any(|s| s.name == r.name))
        .take(HIGHLIGHT_COUNT)
        .filter_map(|r| highlight(r))
        .collect();

    let categories = score
        .category_scores
        .iter()
        .map(|c| CategorySummary {
            category: c.category,
            score: c.score.map(|s| round_to(s, 1)),
            weight: round_to(c.weight, 4),
            confidence: round_to(c.confidence, 4),
        })
        .collect();

    NarrativePayload {
        entity_summary: EntitySummary {
            entity_id: statement.entity_id.clone(),
            industry: context.industry.map(str::to_string),
            locale: context.locale.map(str::to_string),
            period_count: statement.periods.len(),
            scored_period: score.period.map(|p| p.to_string()),
        },
        score_payload: ScorePayload {
            composite: round_to(score.composite, 1),
            confidence: round_to(score.confidence, 4),
            status: score.status,
            risk_level: score.risk_level,
            categories,
            strongest,
            weakest,
            flags: flags.iter().map(StatementFlag::describe).collect(),
            unmapped_items: context.unmapped_items,
            benchmarks: context.benchmarks.to_vec(),
        },
        style_hints: StyleHints {
            locale: context.locale.map(str::to_string),
            audience: "business owner".to_string(),
            max_chars: context.max_chars,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_of_accounts::CanonicalAccount;
    use crate::config::EngineConfig;
    use crate::ratios::compute_ratios;
    use crate::schema::PeriodId;
    use crate::scoring::HealthScoreAggregator;
    use chrono::{TimeZone, Utc};

    fn scored_statement() -> (FinancialStatement, HealthScore) {
        use CanonicalAccount::*;
        let p = PeriodId::annual(2023);
        let statement = FinancialStatement::new("acme")
            .with_value(p, CurrentAssets, 250_000.0)
            .with_value(p, CurrentLiabilities, 100_000.0)
            .with_value(p, Cash, 5_000.0)
            .with_value(p, Revenue, 1_000_000.0)
            .with_value(p, NetIncome, 20_000.0)
            .with_value(p, TotalAssets, 400_000.0)
            .with_value(p, TotalLiabilities, 320_000.0)
            .with_value(p, TotalEquity, 80_000.0);
        let config = EngineConfig::default();
        let results = compute_ratios(&statement);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let score = HealthScoreAggregator::new(&config).aggregate(&results, at);
        (statement, score)
    }

    #[test]
    fn test_strongest_and_weakest() {
        let (statement, score) = scored_statement();
        let payload = build_payload(&statement, &score, &[], &PayloadContext::default());

        let strongest: Vec<&str> = payload
            .score_payload
            .strongest
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        assert_eq!(strongest, vec!["current_ratio", "quick_ratio", "asset_turnover"]);
        assert_eq!(payload.score_payload.weakest[0].name, "cash_ratio");
        assert_eq!(payload.score_payload.weakest[1].name, "debt_to_equity");
        assert!(payload
            .score_payload
            .weakest
            .iter()
            .all(|w| !strongest.contains(&w.name.as_str())));
        assert_eq!(payload.entity_summary.scored_period.as_deref(), Some("FY2023"));
    }

    #[test]
    fn test_payload_carries_no_statement_values() {
        let (statement, score) = scored_statement();
        let flags = vec![
            StatementFlag::MissingPeriod {
                period: PeriodId::annual(2022),
            },
            StatementFlag::Unbalanced {
                period: PeriodId::annual(2023),
                total_assets: 412_345.0,
                liabilities_and_equity: 430_123.0,
                difference: 17_778.0,
            },
            StatementFlag::RetainedEarningsMismatch {
                period: PeriodId::annual(2023),
                net_income: 21_987.0,
                retained_earnings_change: 34_567.0,
            },
        ];
        let context = PayloadContext {
            industry: Some("retail"),
            unmapped_items: 2,
            max_chars: 4000,
            ..Default::default()
        };
        let payload = build_payload(&statement, &score, &flags, &context);
        let json = serde_json::to_string(&payload).unwrap();

        for figure in ["250000", "1000000", "412345", "430123", "17778", "21987", "34567"] {
            assert!(!json.contains(figure), "payload leaks {}", figure);
        }
        assert_eq!(payload.score_payload.flags.len(), 3);
        assert_eq!(payload.score_payload.unmapped_items, 2);
        assert_eq!(payload.entity_summary.industry.as_deref(), Some("retail"));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = NarrativePayload::schema_as_json().unwrap();
        assert!(schema_json.contains("entity_summary"));
        assert!(schema_json.contains("score_payload"));
        assert!(schema_json.contains("style_hints"));
    }
}
