use crate::chart_of_accounts::{label_tokens, CanonicalAccount, ChartOfAccounts};
use crate::config::EngineConfig;
use crate::schema::{CurrencyUnit, PeriodId, RawLineItem, SourceLocation};
use crate::utils::normalize_label;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Bonus for an alias that appears as a contiguous phrase inside the label.
const PHRASE_BONUS: f64 = 0.1;

/// Tokens that turn a line into a different account than the alias they surround,
/// e.g. "non current assets" or "net cash from investing activities".
const QUALIFIERS: [&str; 12] = [
    "non",
    "noncurrent",
    "investing",
    "financing",
    "other",
    "long",
    "deferred",
    "accrued",
    "fixed",
    "intangible",
    "minority",
    "prepaid",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Fuzzy { score: f64, alias: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedItem {
    pub account: CanonicalAccount,
    pub value: f64,
    pub period: PeriodId,
    pub unit: CurrencyUnit,
    pub label: String,
    pub source: SourceLocation,
    pub match_kind: MatchKind,
    /// Another item with equal source confidence disagreed on this value
    pub ambiguous: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingOutcome {
    pub mapped: Vec<MappedItem>,
    pub unmapped: Vec<RawLineItem>,
    /// Items that lost a conflict; surfaced on the assessment for review
    pub superseded: Vec<MappedItem>,
}

impl MappingOutcome {
    pub fn ambiguous_periods(&self) -> BTreeSet<PeriodId> {
        self.mapped
            .iter()
            .filter(|m| m.ambiguous)
            .map(|m| m.period)
            .collect()
    }
}

pub struct AccountMapper {
    chart: ChartOfAccounts,
    fuzzy_threshold: f64,
}

fn same_value(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

impl AccountMapper {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            chart: ChartOfAccounts::with_extra_aliases(&config.extra_aliases),
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }

    pub fn chart(&self) -> &ChartOfAccounts {
        &self.chart
    }

    /// Exact alias match first, then the best token-overlap match above the threshold.
    ///
    /// A fuzzy candidate must have all of its alias tokens in the label, and the label may
    /// not add a qualifier such as "non" or "investing" that changes what the line means.
    pub fn match_label(&self, label: &str) -> Option<(CanonicalAccount, MatchKind)> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }
        if let Some(account) = self.chart.lookup_exact(&normalized) {
            return Some((account, MatchKind::Exact));
        }

        let tokens = label_tokens(&normalized);
        let label_set: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
        let padded = format!(" {} ", normalized);

        let mut best: Option<(f64, usize, CanonicalAccount, &str)> = None;
        for entry in self.chart.entries() {
            let alias_set: BTreeSet<&str> = entry.tokens.iter().map(String::as_str).collect();
            if alias_set.is_empty() || !alias_set.is_subset(&label_set) {
                continue;
            }
            if label_set
                .difference(&alias_set)
                .any(|token| QUALIFIERS.contains(token))
            {
                continue;
            }
            let mut score = jaccard(&label_set, &alias_set);
            if score > 0.0 && padded.contains(&format!(" {} ", entry.alias)) {
                score = (score + PHRASE_BONUS).min(1.0);
            }
            if score < self.fuzzy_threshold {
                continue;
            }

            let better = match best {
                None => true,
                Some((best_score, best_len, _, _)) => {
                    score > best_score || (score == best_score && entry.alias.len() > best_len)
                }
            };
            if better {
                best = Some((score, entry.alias.len(), entry.account, entry.alias.as_str()));
            }
        }

        best.map(|(score, _, account, alias)| {
            (
                account,
                MatchKind::Fuzzy {
                    score,
                    alias: alias.to_string(),
                },
            )
        })
    }

    pub fn map(&self, mut raw_items: Vec<RawLineItem>) -> MappingOutcome {
        raw_items.sort_by_key(|item| item.source.ordinal);

        let mut kept: BTreeMap<(CanonicalAccount, PeriodId), MappedItem> = BTreeMap::new();
        let mut outcome = MappingOutcome::default();

        for raw in raw_items {
            let Some((account, match_kind)) = self.match_label(&raw.label) else {
                debug!("No canonical account for label '{}'", raw.label);
                outcome.unmapped.push(raw);
                continue;
            };

            let candidate = MappedItem {
                account,
                value: raw.value,
                period: raw.period,
                unit: raw.unit,
                label: raw.label,
                source: raw.source,
                match_kind,
                ambiguous: false,
            };

            let key = (account, candidate.period);
            let Some(existing) = kept.get_mut(&key) else {
                kept.insert(key, candidate);
                continue;
            };

            if same_value(existing.value, candidate.value) {
                continue;
            }

            let incoming = candidate.source.confidence;
            let current = existing.source.confidence;
            if incoming > current {
                let replaced = std::mem::replace(existing, candidate);
                outcome.superseded.push(replaced);
            } else if incoming < current {
                outcome.superseded.push(candidate);
            } else {
                debug!(
                    "Conflicting {} values for {}: {} vs {}; keeping the later extraction",
                    account, key.1, existing.value, candidate.value
                );
                let mut later = candidate;
                later.ambiguous = true;
                let replaced = std::mem::replace(existing, later);
                outcome.superseded.push(replaced);
            }
        }

        outcome.mapped = kept.into_values().collect();

        info!(
            "Mapped {} line items ({} unmapped, {} superseded)",
            outcome.mapped.len(),
            outcome.unmapped.len(),
            outcome.superseded.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExtractionConfidence, Locator};

    fn raw(label: &str, value: f64, confidence: ExtractionConfidence, ordinal: u64) -> RawLineItem {
        RawLineItem {
            label: label.to_string(),
            value,
            period: PeriodId::annual(2023),
            unit: CurrencyUnit::default(),
            source: SourceLocation {
                document: "doc".to_string(),
                locator: Locator::Line {
                    line: ordinal as usize + 1,
                    column: 0,
                },
                confidence,
                ordinal,
            },
        }
    }

    fn mapper() -> AccountMapper {
        AccountMapper::new(&EngineConfig::default())
    }

    #[test]
    fn test_exact_match_is_case_and_whitespace_insensitive() {
        let (account, kind) = mapper().match_label("  TOTAL   Current-Assets ").unwrap();
        assert_eq!(account, CanonicalAccount::CurrentAssets);
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn test_fuzzy_match() {
        let m = mapper();
        let (account, kind) = m.match_label("Trade debtors (net)").unwrap();
        assert_eq!(account, CanonicalAccount::AccountsReceivable);
        assert!(matches!(kind, MatchKind::Fuzzy { .. }));

        let (account, _) = m.match_label("Cash at bank and in hand").unwrap();
        assert_eq!(account, CanonicalAccount::Cash);

        let (account, _) = m.match_label("Total current assets (net)").unwrap();
        assert_eq!(account, CanonicalAccount::CurrentAssets);

        let (account, _) = m.match_label("Total liabilities & shareholders' equity").unwrap();
        assert_eq!(account, CanonicalAccount::TotalLiabilitiesAndEquity);
    }

    #[test]
    fn test_qualified_lines_do_not_borrow_an_account() {
        let m = mapper();
        for label in [
            "Non-current assets",
            "Total non-current assets",
            "Non-current liabilities",
            "Net cash from investing activities",
            "Net cash from financing activities",
            "Other operating income",
        ] {
            assert_eq!(m.match_label(label), None, "{}", label);
        }

        let (account, kind) = m.match_label("Trade and other receivables").unwrap();
        assert_eq!(account, CanonicalAccount::AccountsReceivable);
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn test_non_current_line_keeps_current_assets_intact() {
        let outcome = mapper().map(vec![
            raw("Total current assets", 200_000.0, ExtractionConfidence::High, 0),
            raw("Total non-current assets", 900_000.0, ExtractionConfidence::High, 1),
            raw("Total current liabilities", 100_000.0, ExtractionConfidence::High, 2),
        ]);
        let current = outcome
            .mapped
            .iter()
            .find(|m| m.account == CanonicalAccount::CurrentAssets)
            .unwrap();
        assert_eq!(current.value, 200_000.0);
        assert!(outcome.ambiguous_periods().is_empty());
        assert_eq!(outcome.unmapped.len(), 1);
    }

    #[test]
    fn test_unmatched_labels_are_surfaced() {
        let outcome = mapper().map(vec![
            raw("Revenue", 100.0, ExtractionConfidence::High, 0),
            raw("Directors' loan waiver", 5.0, ExtractionConfidence::High, 1),
        ]);
        assert_eq!(outcome.mapped.len(), 1);
        assert_eq!(outcome.unmapped.len(), 1);
        assert_eq!(outcome.unmapped[0].label, "Directors' loan waiver");
    }

    #[test]
    fn test_higher_confidence_wins_conflict() {
        let outcome = mapper().map(vec![
            raw("Revenue", 100.0, ExtractionConfidence::High, 0),
            raw("Sales", 90.0, ExtractionConfidence::Low, 1),
        ]);
        assert_eq!(outcome.mapped.len(), 1);
        assert_eq!(outcome.mapped[0].value, 100.0);
        assert!(!outcome.mapped[0].ambiguous);
        assert_eq!(outcome.superseded.len(), 1);
    }

    #[test]
    fn test_equal_confidence_keeps_latest_and_flags() {
        let outcome = mapper().map(vec![
            raw("Sales", 90.0, ExtractionConfidence::Medium, 3),
            raw("Revenue", 100.0, ExtractionConfidence::Medium, 1),
        ]);
        assert_eq!(outcome.mapped.len(), 1);
        assert_eq!(outcome.mapped[0].value, 90.0);
        assert!(outcome.mapped[0].ambiguous);
        assert!(outcome.ambiguous_periods().contains(&PeriodId::annual(2023)));
    }

    #[test]
    fn test_identical_values_are_not_conflicts() {
        let outcome = mapper().map(vec![
            raw("Revenue", 100.0, ExtractionConfidence::Medium, 0),
            raw("Turnover", 100.0, ExtractionConfidence::Medium, 1),
        ]);
        assert_eq!(outcome.mapped.len(), 1);
        assert!(!outcome.mapped[0].ambiguous);
        assert!(outcome.superseded.is_empty());
    }

    #[test]
    fn test_configured_alias() {
        let mut config = EngineConfig::default();
        config
            .extra_aliases
            .insert("Sundry debtors".to_string(), CanonicalAccount::AccountsReceivable);
        let (account, kind) = AccountMapper::new(&config).match_label("SUNDRY DEBTORS").unwrap();
        assert_eq!(account, CanonicalAccount::AccountsReceivable);
        assert_eq!(kind, MatchKind::Exact);
    }
}
