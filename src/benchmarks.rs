//! Industry peer comparison.
//!
//! A small reference table of typical gross margins and debt-to-equity ranges for common
//! SME industries. Comparisons are informational and never feed into the composite score.

use crate::ratios::RatioResult;
use crate::schema::PeriodId;
use crate::utils::round_to;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Margin distance from the industry average, in percentage points, before a
/// comparison is called out as good or risky.
const MARGIN_BAND_PCT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndustryProfile {
    pub industry: String,
    pub gross_margin_pct: f64,
    pub leverage_min: f64,
    pub leverage_max: f64,
}

const PROFILES: [(&str, f64, f64, f64); 6] = [
    ("retail", 30.0, 0.5, 1.5),
    ("manufacturing", 25.0, 0.6, 1.8),
    ("services", 40.0, 0.2, 1.0),
    ("logistics", 20.0, 0.7, 2.0),
    ("agriculture", 18.0, 0.5, 1.5),
    ("e-commerce", 35.0, 0.4, 1.6),
];

const GENERAL_SME: (&str, f64, f64, f64) = ("general", 30.0, 0.4, 1.6);

impl IndustryProfile {
    /// Looks up the profile whose key occurs in the declared industry, falling back to a
    /// general SME profile. No declared industry means no comparison.
    pub fn lookup(industry: Option<&str>) -> Option<Self> {
        let declared = industry?.trim().to_lowercase();
        if declared.is_empty() {
            return None;
        }
        let (name, margin, min, max) = PROFILES
            .iter()
            .find(|(key, ..)| declared.contains(*key))
            .copied()
            .unwrap_or(GENERAL_SME);
        Some(Self {
            industry: name.to_string(),
            gross_margin_pct: margin,
            leverage_min: min,
            leverage_max: max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStatus {
    Good,
    Ok,
    Risk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BenchmarkComparison {
    pub key: String,
    pub label: String,
    pub business_value: Option<f64>,
    pub benchmark_value: Option<f64>,
    pub status: BenchmarkStatus,
    pub note: String,
}

fn latest_value(results: &[RatioResult], name: &str, period: PeriodId) -> Option<f64> {
    results
        .iter()
        .find(|r| r.name == name && r.period == period && r.is_present())
        .and_then(|r| r.value)
}

pub fn compare_to_industry(
    profile: &IndustryProfile,
    results: &[RatioResult],
    period: PeriodId,
) -> Vec<BenchmarkComparison> {
    let margin_pct = latest_value(results, "gross_margin", period).map(|m| round_to(m * 100.0, 2));
    let (margin_status, margin_note) = match margin_pct {
        Some(pct) if pct >= profile.gross_margin_pct + MARGIN_BAND_PCT => (
            BenchmarkStatus::Good,
            "Stronger margin than typical peers.",
        ),
        Some(pct) if pct <= profile.gross_margin_pct - MARGIN_BAND_PCT => (
            BenchmarkStatus::Risk,
            "Margin is below typical peers; watch pricing and costs.",
        ),
        _ => (BenchmarkStatus::Ok, "In line with similar businesses."),
    };

    let leverage = latest_value(results, "debt_to_equity", period);
    let (leverage_status, leverage_note) = match leverage {
        Some(value) if value < profile.leverage_min => (
            BenchmarkStatus::Good,
            "Debt is lower than usual, giving more flexibility.",
        ),
        Some(value) if value > profile.leverage_max => (
            BenchmarkStatus::Risk,
            "Debt is higher than usual; monitor repayments closely.",
        ),
        _ => (
            BenchmarkStatus::Ok,
            "Debt level is in a typical range for this industry.",
        ),
    };

    vec![
        BenchmarkComparison {
            key: "margin_vs_industry".to_string(),
            label: "Gross margin vs industry average".to_string(),
            business_value: margin_pct,
            benchmark_value: Some(profile.gross_margin_pct),
            status: margin_status,
            note: margin_note.to_string(),
        },
        BenchmarkComparison {
            key: "debt_vs_range".to_string(),
            label: format!(
                "Debt to equity vs typical range ({:.1}-{:.1})",
                profile.leverage_min, profile.leverage_max
            ),
            business_value: leverage,
            benchmark_value: None,
            status: leverage_status,
            note: leverage_note.to_string(),
        },
    ]
}
