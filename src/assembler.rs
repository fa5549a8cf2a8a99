use crate::chart_of_accounts::{CanonicalAccount, StatementSection};
use crate::config::EngineConfig;
use crate::error::{FinancialHealthError, Result};
use crate::mapper::MappedItem;
use crate::schema::{CurrencyUnit, PeriodId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The canonical statement for one entity across its reported periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub entity_id: String,
    /// Ascending
    pub periods: Vec<PeriodId>,
    pub values: BTreeMap<PeriodId, BTreeMap<CanonicalAccount, f64>>,
    pub units: BTreeMap<PeriodId, CurrencyUnit>,
}

impl FinancialStatement {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            periods: Vec::new(),
            values: BTreeMap::new(),
            units: BTreeMap::new(),
        }
    }

    /// Builder-style insertion used while assembling.
    pub fn with_value(mut self, period: PeriodId, account: CanonicalAccount, value: f64) -> Self {
        self.insert(period, account, value);
        self
    }

    fn insert(&mut self, period: PeriodId, account: CanonicalAccount, value: f64) {
        self.values.entry(period).or_default().insert(account, value);
        if let Err(pos) = self.periods.binary_search(&period) {
            self.periods.insert(pos, period);
        }
    }

    pub fn value(&self, account: CanonicalAccount, period: PeriodId) -> Option<f64> {
        self.values.get(&period)?.get(&account).copied()
    }

    pub fn unit(&self, period: PeriodId) -> Option<&CurrencyUnit> {
        self.units.get(&period)
    }

    pub fn latest_period(&self) -> Option<PeriodId> {
        self.periods.last().copied()
    }

    pub fn contains_period(&self, period: PeriodId) -> bool {
        self.periods.binary_search(&period).is_ok()
    }

    /// The immediately preceding period when the statement reports it.
    pub fn prior_period(&self, period: PeriodId) -> Option<PeriodId> {
        let prior = period.predecessor();
        self.contains_period(prior).then_some(prior)
    }

    pub fn has_section(&self, period: PeriodId, section: StatementSection) -> bool {
        self.values
            .get(&period)
            .map(|accounts| accounts.keys().any(|a| a.section() == section))
            .unwrap_or(false)
    }

    /// Total liabilities plus equity, from the combined line or its two parts.
    pub fn liabilities_and_equity(&self, period: PeriodId) -> Option<f64> {
        self.value(CanonicalAccount::TotalLiabilitiesAndEquity, period)
            .or_else(|| {
                Some(
                    self.value(CanonicalAccount::TotalLiabilities, period)?
                        + self.value(CanonicalAccount::TotalEquity, period)?,
                )
            })
    }
}

/// Structural findings attached to an assessment. They never stop the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum StatementFlag {
    Unbalanced {
        period: PeriodId,
        total_assets: f64,
        liabilities_and_equity: f64,
        difference: f64,
    },
    MissingPeriod {
        period: PeriodId,
    },
    AmbiguousMapping {
        period: PeriodId,
        account: CanonicalAccount,
    },
    RetainedEarningsMismatch {
        period: PeriodId,
        net_income: f64,
        retained_earnings_change: f64,
    },
    SubtotalExceedsTotal {
        period: PeriodId,
        subtotal: CanonicalAccount,
        total: CanonicalAccount,
    },
    PartialStatement {
        period: PeriodId,
        missing: StatementSection,
    },
    MixedUnits {
        period: PeriodId,
        units: Vec<CurrencyUnit>,
    },
}

impl StatementFlag {
    pub fn period(&self) -> PeriodId {
        match self {
            StatementFlag::Unbalanced { period, .. }
            | StatementFlag::MissingPeriod { period }
            | StatementFlag::AmbiguousMapping { period, .. }
            | StatementFlag::RetainedEarningsMismatch { period, .. }
            | StatementFlag::SubtotalExceedsTotal { period, .. }
            | StatementFlag::PartialStatement { period, .. }
            | StatementFlag::MixedUnits { period, .. } => *period,
        }
    }

    pub fn is_unbalanced(&self) -> bool {
        matches!(self, StatementFlag::Unbalanced { .. })
    }

    /// A plain-language description that carries no statement figures, only relative
    /// gaps, so it can leave the process with the narrative payload.
    pub fn describe(&self) -> String {
        match self {
            StatementFlag::Unbalanced {
                period,
                total_assets,
                difference,
                ..
            } => format!(
                "{}: total assets differ from liabilities plus equity by {:.1}%",
                period,
                relative_gap_pct(*difference, *total_assets)
            ),
            StatementFlag::MissingPeriod { period } => {
                format!("{}: no figures were supplied for this period", period)
            }
            StatementFlag::AmbiguousMapping { period, account } => format!(
                "{}: conflicting values were found for {}; the latest extracted value was used",
                period, account
            ),
            StatementFlag::RetainedEarningsMismatch {
                period,
                net_income,
                retained_earnings_change,
            } => format!(
                "{}: net income differs from the change in retained earnings by {:.1}%",
                period,
                relative_gap_pct(
                    (net_income - retained_earnings_change).abs(),
                    net_income.abs().max(retained_earnings_change.abs())
                )
            ),
            StatementFlag::SubtotalExceedsTotal {
                period,
                subtotal,
                total,
            } => format!("{}: {} exceed {}", period, subtotal, total),
            StatementFlag::PartialStatement { period, missing } => {
                format!("{}: no {:?} figures were found", period, missing)
            }
            StatementFlag::MixedUnits { period, units } => format!(
                "{}: figures are reported in several currencies ({})",
                period,
                units
                    .iter()
                    .map(CurrencyUnit::code)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

fn relative_gap_pct(difference: f64, scale: f64) -> f64 {
    if scale == 0.0 {
        return 100.0;
    }
    (difference.abs() / scale.abs() * 100.0).min(999.9)
}

pub struct StatementAssembler<'a> {
    config: &'a EngineConfig,
}

impl<'a> StatementAssembler<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn assemble(
        &self,
        entity_id: &str,
        mapped_items: &[MappedItem],
    ) -> Result<(FinancialStatement, Vec<StatementFlag>)> {
        if mapped_items.is_empty() {
            return Err(FinancialHealthError::NoPeriodsFound);
        }

        let mut statement = FinancialStatement::new(entity_id);
        let mut flags = Vec::new();
        let mut unit_votes: BTreeMap<PeriodId, BTreeMap<CurrencyUnit, (usize, u64)>> =
            BTreeMap::new();

        for item in mapped_items {
            let vote = unit_votes
                .entry(item.period)
                .or_default()
                .entry(item.unit.clone())
                .or_insert((0, u64::MAX));
            vote.0 += 1;
            vote.1 = vote.1.min(item.source.ordinal);
        }

        for (period, votes) in &unit_votes {
            let chosen = votes
                .iter()
                .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                    count_a.cmp(count_b).then(first_b.cmp(first_a))
                })
                .map(|(unit, _)| unit.clone())
                .unwrap_or_else(|| self.config.default_unit.clone());
            if votes.len() > 1 {
                warn!(
                    "Period {} mixes {} currency units; keeping {} figures only",
                    period,
                    votes.len(),
                    chosen
                );
                flags.push(StatementFlag::MixedUnits {
                    period: *period,
                    units: votes.keys().cloned().collect(),
                });
            }
            statement.units.insert(*period, chosen);
        }

        for item in mapped_items {
            if statement.unit(item.period) != Some(&item.unit) {
                debug!(
                    "Dropping {} {} for {}: reported in {}",
                    item.account, item.value, item.period, item.unit
                );
                continue;
            }
            statement.insert(item.period, item.account, item.value);

            if item.ambiguous {
                flags.push(StatementFlag::AmbiguousMapping {
                    period: item.period,
                    account: item.account,
                });
            }
        }

        for period in statement.periods.clone() {
            flags.extend(self.check_balance(&statement, period));
            flags.extend(self.check_retained_earnings(&statement, period));
            flags.extend(self.check_subtotals(&statement, period));
            for section in [StatementSection::BalanceSheet, StatementSection::IncomeStatement] {
                if !statement.has_section(period, section) {
                    flags.push(StatementFlag::PartialStatement {
                        period,
                        missing: section,
                    });
                }
            }
        }
        flags.extend(self.missing_periods(&statement));

        info!(
            "Assembled statement for '{}' with {} period(s) and {} flag(s)",
            entity_id,
            statement.periods.len(),
            flags.len()
        );
        Ok((statement, flags))
    }

    fn exceeds_tolerance(&self, difference: f64, scale: f64) -> bool {
        if scale == 0.0 {
            return difference > 0.0;
        }
        difference / scale > self.config.tolerance_ratio
    }

    fn check_balance(&self, statement: &FinancialStatement, period: PeriodId) -> Option<StatementFlag> {
        let total_assets = statement.value(CanonicalAccount::TotalAssets, period)?;
        let liabilities_and_equity = statement.liabilities_and_equity(period)?;
        let difference = (total_assets - liabilities_and_equity).abs();

        if self.exceeds_tolerance(difference, total_assets.abs()) {
            debug!(
                "Period {} unbalanced: assets {} vs liabilities+equity {}",
                period, total_assets, liabilities_and_equity
            );
            return Some(StatementFlag::Unbalanced {
                period,
                total_assets,
                liabilities_and_equity,
                difference,
            });
        }
        None
    }

    fn check_retained_earnings(
        &self,
        statement: &FinancialStatement,
        period: PeriodId,
    ) -> Option<StatementFlag> {
        let prior = statement.prior_period(period)?;
        let net_income = statement.value(CanonicalAccount::NetIncome, period)?;
        let closing = statement.value(CanonicalAccount::RetainedEarnings, period)?;
        let opening = statement.value(CanonicalAccount::RetainedEarnings, prior)?;
        let change = closing - opening;

        let scale = net_income.abs().max(change.abs());
        if self.exceeds_tolerance((net_income - change).abs(), scale) {
            return Some(StatementFlag::RetainedEarningsMismatch {
                period,
                net_income,
                retained_earnings_change: change,
            });
        }
        None
    }

    fn check_subtotals(&self, statement: &FinancialStatement, period: PeriodId) -> Vec<StatementFlag> {
        let pairs = [
            (CanonicalAccount::CurrentAssets, CanonicalAccount::TotalAssets),
            (
                CanonicalAccount::CurrentLiabilities,
                CanonicalAccount::TotalLiabilities,
            ),
        ];

        pairs
            .into_iter()
            .filter_map(|(subtotal, total)| {
                let sub_value = statement.value(subtotal, period)?;
                let total_value = statement.value(total, period)?;
                let excess = sub_value - total_value;
                (excess > 0.0 && self.exceeds_tolerance(excess, total_value.abs())).then_some(
                    StatementFlag::SubtotalExceedsTotal {
                        period,
                        subtotal,
                        total,
                    },
                )
            })
            .collect()
    }

    /// Gaps between the first and last reported period, per granularity.
    fn missing_periods(&self, statement: &FinancialStatement) -> Vec<StatementFlag> {
        let mut missing = BTreeSet::new();

        for annual in [true, false] {
            let periods: Vec<PeriodId> = statement
                .periods
                .iter()
                .copied()
                .filter(|p| p.is_annual() == annual)
                .collect();
            let (Some(first), Some(last)) = (periods.first(), periods.last()) else {
                continue;
            };

            let mut cursor = last.predecessor();
            while cursor > *first {
                if !statement.contains_period(cursor) {
                    missing.insert(cursor);
                }
                cursor = cursor.predecessor();
            }
        }

        missing
            .into_iter()
            .map(|period| StatementFlag::MissingPeriod { period })
            .collect()
    }
}
