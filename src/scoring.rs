use crate::config::{CategoryWeights, EngineConfig};
use crate::ratios::{self, Completeness, RatioCategory, RatioResult};
use crate::schema::PeriodId;
use chrono::{DateTime, Utc};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Score assigned when nothing at all could be scored.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// One knot of a piecewise-linear benchmark curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BenchmarkPoint {
    pub value: f64,
    pub score: f64,
}

/// Maps a ratio value onto 0-100 by linear interpolation between the points, clamped at
/// both ends. Points are ordered by `value`; scores may rise or fall.
pub fn normalize(value: f64, points: &[BenchmarkPoint]) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return NEUTRAL_SCORE;
    };
    if value <= first.value {
        return first.score.clamp(0.0, 100.0);
    }
    if value >= last.value {
        return last.score.clamp(0.0, 100.0);
    }

    for window in points.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        if value <= hi.value {
            let span = hi.value - lo.value;
            if span <= 0.0 {
                return hi.score.clamp(0.0, 100.0);
            }
            let t = (value - lo.value) / span;
            return (lo.score + t * (hi.score - lo.score)).clamp(0.0, 100.0);
        }
    }
    last.score.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Normal,
    /// Too few ratios were computable to trust the composite
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_composite(composite: f64) -> Self {
        if composite >= 75.0 {
            RiskLevel::Low
        } else if composite >= 50.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRatio {
    pub name: String,
    pub value: f64,
    pub score: f64,
    pub completeness: Completeness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: RatioCategory,
    /// `None` when no ratio of the category was computable
    pub score: Option<f64>,
    /// Effective weight in the composite after redistribution
    pub weight: f64,
    pub confidence: f64,
    pub contributing_ratios: Vec<ScoredRatio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub composite: f64,
    pub confidence: f64,
    pub status: ScoreStatus,
    pub risk_level: RiskLevel,
    /// Always in `RatioCategory::ALL` order
    pub category_scores: Vec<CategoryScore>,
    pub computed_at: DateTime<Utc>,
    pub period: Option<PeriodId>,
}

impl HealthScore {
    pub fn category(&self, category: RatioCategory) -> Option<&CategoryScore> {
        self.category_scores.iter().find(|c| c.category == category)
    }

    /// Every scored ratio across categories, in catalog order.
    pub fn scored_ratios(&self) -> Vec<&ScoredRatio> {
        let mut all: Vec<&ScoredRatio> = self
            .category_scores
            .iter()
            .flat_map(|c| c.contributing_ratios.iter())
            .collect();
        all.sort_by_key(|r| ratios::catalog_index(&r.name));
        all
    }
}

/// Spreads the configured category weights over the categories that have a score.
///
/// The returned weights sum to 1.0 whenever at least one present category has a
/// positive configured weight; otherwise the map is empty.
pub fn redistribute(
    weights: &CategoryWeights,
    present: &[RatioCategory],
) -> BTreeMap<RatioCategory, f64> {
    let total: f64 = present.iter().map(|c| weights.weight(*c)).sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    present
        .iter()
        .map(|c| (*c, weights.weight(*c) / total))
        .collect()
}

pub struct HealthScoreAggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> HealthScoreAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn benchmarks_for(&self, ratio_name: &str) -> Vec<BenchmarkPoint> {
        if let Some(points) = self.config.benchmarks.get(ratio_name) {
            return points.clone();
        }
        ratios::definition(ratio_name)
            .map(|d| d.default_benchmarks())
            .unwrap_or_default()
    }

    pub fn sub_score(&self, result: &RatioResult) -> Option<f64> {
        if !result.is_present() {
            return None;
        }
        let value = result.value?;
        Some(normalize(value, &self.benchmarks_for(&result.name)))
    }

    /// Scores the most recent period present in `results`.
    ///
    /// Confidence counts only the ratios that can apply to that period: trend ratios are
    /// left out when the results hold no immediately preceding period.
    pub fn aggregate(&self, results: &[RatioResult], computed_at: DateTime<Utc>) -> HealthScore {
        let period = results.iter().map(|r| r.period).max();
        let has_prior = period
            .map(|p| results.iter().any(|r| r.period == p.predecessor()))
            .unwrap_or(false);
        let applicable = |name: &str| {
            has_prior || !ratios::definition(name).map(|d| d.requires_trend()).unwrap_or(false)
        };
        let latest: Vec<&RatioResult> = results
            .iter()
            .filter(|r| Some(r.period) == period)
            .collect();

        let catalog = ratios::catalog();
        let mut category_scores = Vec::with_capacity(RatioCategory::ALL.len());

        for category in RatioCategory::ALL {
            let in_category = catalog
                .iter()
                .filter(|d| d.category == category && applicable(d.name))
                .count();
            let mut weighted = 0.0;
            let mut weight_total = 0.0;
            let mut complete = 0usize;
            let mut contributing = Vec::new();

            for result in latest.iter().filter(|r| r.category == category) {
                if result.completeness == Completeness::Complete
                    && applicable(result.name.as_str())
                {
                    complete += 1;
                }
                let (Some(value), Some(score)) = (result.value, self.sub_score(result)) else {
                    continue;
                };
                let weight = ratios::definition(&result.name)
                    .map(|d| d.weight)
                    .unwrap_or(0.0);
                weighted += weight * score;
                weight_total += weight;
                contributing.push(ScoredRatio {
                    name: result.name.clone(),
                    value,
                    score,
                    completeness: result.completeness,
                });
            }

            let score = (weight_total > 0.0).then(|| weighted / weight_total);
            let confidence = if in_category == 0 {
                0.0
            } else {
                complete as f64 / in_category as f64
            };
            debug!(
                "{} score {:?} from {} ratio(s), confidence {:.2}",
                category,
                score,
                contributing.len(),
                confidence
            );

            category_scores.push(CategoryScore {
                category,
                score,
                weight: 0.0,
                confidence,
                contributing_ratios: contributing,
            });
        }

        let present: Vec<RatioCategory> = category_scores
            .iter()
            .filter(|c| c.score.is_some())
            .map(|c| c.category)
            .collect();
        let effective = redistribute(&self.config.category_weights, &present);

        let mut composite = 0.0;
        for category_score in &mut category_scores {
            if let (Some(weight), Some(score)) =
                (effective.get(&category_score.category), category_score.score)
            {
                category_score.weight = *weight;
                composite += weight * score;
            }
        }
        if effective.is_empty() {
            composite = NEUTRAL_SCORE;
        }

        let complete_total = latest
            .iter()
            .filter(|r| r.completeness == Completeness::Complete && applicable(r.name.as_str()))
            .count();
        let applicable_total = catalog.iter().filter(|d| applicable(d.name)).count();
        let confidence = if applicable_total == 0 {
            0.0
        } else {
            complete_total as f64 / applicable_total as f64
        };
        let status = if confidence < self.config.confidence_floor {
            ScoreStatus::LowConfidence
        } else {
            ScoreStatus::Normal
        };

        info!(
            "Composite health score {:.1} (confidence {:.2}, {:?}) for period {}",
            composite,
            confidence,
            status,
            period.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
        );

        HealthScore {
            composite,
            confidence,
            status,
            risk_level: RiskLevel::from_composite(composite),
            category_scores,
            computed_at,
            period,
        }
    }
}
