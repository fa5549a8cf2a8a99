use crate::chart_of_accounts::CanonicalAccount;
use crate::error::{FinancialHealthError, Result};
use crate::ratios::RatioCategory;
use crate::schema::CurrencyUnit;
use crate::scoring::BenchmarkPoint;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Upper bound for narrative retries; the service is optional and must never hold up a run.
pub const MAX_NARRATIVE_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// Generation backend identifier passed through to the service
    pub model: String,
    pub max_retries: u32,
    pub timeout_ms: u64,
    /// Initial backoff between retries; doubles on each attempt
    pub backoff_ms: u64,
    pub max_narrative_chars: usize,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            max_retries: 2,
            timeout_ms: 10_000,
            backoff_ms: 250,
            max_narrative_chars: 4_000,
        }
    }
}

impl NarrativeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub liquidity: f64,
    pub profitability: f64,
    pub leverage: f64,
    pub efficiency: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            liquidity: 0.30,
            profitability: 0.30,
            leverage: 0.25,
            efficiency: 0.15,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: RatioCategory) -> f64 {
        match category {
            RatioCategory::Liquidity => self.liquidity,
            RatioCategory::Profitability => self.profitability,
            RatioCategory::Leverage => self.leverage,
            RatioCategory::Efficiency => self.efficiency,
        }
    }
}

/// Immutable per-run configuration. Every threshold, weight and tolerance the engine uses
/// comes from here, never from process-global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub narrative: NarrativeConfig,
    /// Below this confidence a score is reported as `LowConfidence`
    pub confidence_floor: f64,
    /// Relative slack allowed between total assets and liabilities plus equity
    pub tolerance_ratio: f64,
    /// Minimum similarity for a fuzzy label match
    pub fuzzy_threshold: f64,
    pub category_weights: CategoryWeights,
    /// Benchmark curves keyed by ratio name, replacing the catalog defaults
    pub benchmarks: BTreeMap<String, Vec<BenchmarkPoint>>,
    /// Additional label aliases, consulted before the built-in table
    pub extra_aliases: BTreeMap<String, CanonicalAccount>,
    pub default_unit: CurrencyUnit,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            narrative: NarrativeConfig::default(),
            confidence_floor: 0.4,
            tolerance_ratio: 0.01,
            fuzzy_threshold: 0.6,
            category_weights: CategoryWeights::default(),
            benchmarks: BTreeMap::new(),
            extra_aliases: BTreeMap::new(),
            default_unit: CurrencyUnit::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies `HEALTH_ENGINE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim().parse().map_err(|_| {
                FinancialHealthError::InvalidConfig(format!("{} has invalid value '{}'", key, raw))
            })
        }

        if let Some(model) = lookup("HEALTH_ENGINE_MODEL") {
            self.narrative.model = model;
        }
        if let Some(raw) = lookup("HEALTH_ENGINE_MAX_RETRIES") {
            self.narrative.max_retries = parse("HEALTH_ENGINE_MAX_RETRIES", raw)?;
        }
        if let Some(raw) = lookup("HEALTH_ENGINE_TIMEOUT_MS") {
            self.narrative.timeout_ms = parse("HEALTH_ENGINE_TIMEOUT_MS", raw)?;
        }
        if let Some(raw) = lookup("HEALTH_ENGINE_CONFIDENCE_FLOOR") {
            self.confidence_floor = parse("HEALTH_ENGINE_CONFIDENCE_FLOOR", raw)?;
        }
        if let Some(raw) = lookup("HEALTH_ENGINE_TOLERANCE_RATIO") {
            self.tolerance_ratio = parse("HEALTH_ENGINE_TOLERANCE_RATIO", raw)?;
        }

        debug!(
            "Effective configuration: model={}, retries={}, timeout={}ms",
            self.narrative.model, self.narrative.max_retries, self.narrative.timeout_ms
        );

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FinancialHealthError::InvalidConfig(msg));

        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return invalid(format!(
                "confidence_floor {} must be between 0.0 and 1.0",
                self.confidence_floor
            ));
        }
        if !(0.0..1.0).contains(&self.tolerance_ratio) {
            return invalid(format!(
                "tolerance_ratio {} must be in [0.0, 1.0)",
                self.tolerance_ratio
            ));
        }
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return invalid(format!(
                "fuzzy_threshold {} must be in (0.0, 1.0]",
                self.fuzzy_threshold
            ));
        }
        if self.narrative.max_retries > MAX_NARRATIVE_RETRIES {
            return invalid(format!(
                "max_retries {} exceeds the limit of {}",
                self.narrative.max_retries, MAX_NARRATIVE_RETRIES
            ));
        }
        if self.narrative.timeout_ms == 0 {
            return invalid("timeout_ms must be positive".to_string());
        }
        if self.narrative.max_narrative_chars == 0 {
            return invalid("max_narrative_chars must be positive".to_string());
        }

        let weights = [
            self.category_weights.liquidity,
            self.category_weights.profitability,
            self.category_weights.leverage,
            self.category_weights.efficiency,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0
        {
            return invalid(format!(
                "category weights {:?} must be non-negative with a positive sum",
                weights
            ));
        }

        for (ratio, points) in &self.benchmarks {
            if points.len() < 2 {
                return invalid(format!("benchmark for '{}' needs at least two points", ratio));
            }
            if points.windows(2).any(|w| w[1].value <= w[0].value) {
                return invalid(format!(
                    "benchmark for '{}' must have strictly increasing values",
                    ratio
                ));
            }
            if points.iter().any(|p| !(0.0..=100.0).contains(&p.score)) {
                return invalid(format!("benchmark for '{}' has a score outside 0-100", ratio));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.confidence_floor, 0.4);
        assert_eq!(config.narrative.max_retries, 2);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "tolerance_ratio": 0.02, "narrative": { "timeout_ms": 500 } }"#,
        )
        .unwrap();
        assert_eq!(config.tolerance_ratio, 0.02);
        assert_eq!(config.narrative.timeout_ms, 500);
        assert_eq!(config.narrative.max_retries, 2);
        assert_eq!(config.category_weights, CategoryWeights::default());
    }

    #[test]
    fn test_extra_aliases_deserialize() {
        let config = EngineConfig::from_json_str(
            r#"{ "extra_aliases": { "Sundry Debtors": "AccountsReceivable" } }"#,
        )
        .unwrap();
        assert_eq!(
            config.extra_aliases.get("Sundry Debtors"),
            Some(&CanonicalAccount::AccountsReceivable)
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_json_str(r#"{ "confidence_floor": 1.5 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "narrative": { "max_retries": 50 } }"#).is_err());
        assert!(EngineConfig::from_json_str(
            r#"{ "benchmarks": { "current_ratio": [ { "value": 2.0, "score": 100 }, { "value": 1.0, "score": 50 } ] } }"#
        )
        .is_err());
        assert!(EngineConfig::from_json_str(
            r#"{ "category_weights": { "liquidity": 0, "profitability": 0, "leverage": 0, "efficiency": 0 } }"#
        )
        .is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .with_overrides_from(|key| match key {
                "HEALTH_ENGINE_MAX_RETRIES" => Some("1".to_string()),
                "HEALTH_ENGINE_CONFIDENCE_FLOOR" => Some("0.5".to_string()),
                "HEALTH_ENGINE_MODEL" => Some("local-model".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.narrative.max_retries, 1);
        assert_eq!(config.confidence_floor, 0.5);
        assert_eq!(config.narrative.model, "local-model");

        let bad = EngineConfig::default().with_overrides_from(|key| {
            (key == "HEALTH_ENGINE_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(bad.is_err());
    }
}
