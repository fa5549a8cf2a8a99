use crate::assembler::FinancialStatement;
use crate::chart_of_accounts::CanonicalAccount;
use crate::schema::PeriodId;
use crate::scoring::BenchmarkPoint;
use crate::utils::safe_ratio;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RatioCategory {
    Liquidity,
    Profitability,
    Leverage,
    Efficiency,
}

impl RatioCategory {
    pub const ALL: [RatioCategory; 4] = [
        RatioCategory::Liquidity,
        RatioCategory::Profitability,
        RatioCategory::Leverage,
        RatioCategory::Efficiency,
    ];
}

impl fmt::Display for RatioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RatioCategory::Liquidity => "Liquidity",
            RatioCategory::Profitability => "Profitability",
            RatioCategory::Leverage => "Leverage",
            RatioCategory::Efficiency => "Efficiency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Every input came from its primary account
    Complete,
    /// At least one input used a documented substitute
    Partial,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioResult {
    pub name: String,
    pub category: RatioCategory,
    pub period: PeriodId,
    pub value: Option<f64>,
    pub completeness: Completeness,
    pub inputs_used: BTreeSet<CanonicalAccount>,
}

impl RatioResult {
    fn unavailable(definition: &RatioDefinition, period: PeriodId) -> Self {
        Self {
            name: definition.name.to_string(),
            category: definition.category,
            period,
            value: None,
            completeness: Completeness::Unavailable,
            inputs_used: BTreeSet::new(),
        }
    }

    /// Complete or Partial results carry a value and count towards scoring.
    pub fn is_present(&self) -> bool {
        self.completeness != Completeness::Unavailable && self.value.is_some()
    }
}

/// Where an input figure can come from.
#[derive(Debug)]
enum Source {
    Account(CanonicalAccount),
    Sum(&'static [CanonicalAccount]),
    /// First account minus every following one
    Difference(&'static [CanonicalAccount]),
}

impl Source {
    fn resolve(&self, statement: &FinancialStatement, period: PeriodId) -> Option<(f64, Vec<CanonicalAccount>)> {
        match self {
            Source::Account(account) => Some((statement.value(*account, period)?, vec![*account])),
            Source::Sum(accounts) => {
                let mut total = 0.0;
                for account in accounts.iter() {
                    total += statement.value(*account, period)?;
                }
                Some((total, accounts.to_vec()))
            }
            Source::Difference(accounts) => {
                let (first, rest) = accounts.split_first()?;
                let mut value = statement.value(*first, period)?;
                for account in rest {
                    value -= statement.value(*account, period)?;
                }
                Some((value, accounts.to_vec()))
            }
        }
    }
}

/// A primary source followed by ordered substitutes.
#[derive(Debug)]
struct Input(&'static [Source]);

struct Resolved {
    value: f64,
    accounts: Vec<CanonicalAccount>,
    substituted: bool,
}

impl Input {
    fn resolve(&self, statement: &FinancialStatement, period: PeriodId) -> Option<Resolved> {
        self.0.iter().enumerate().find_map(|(idx, source)| {
            source
                .resolve(statement, period)
                .map(|(value, accounts)| Resolved {
                    value,
                    accounts,
                    substituted: idx > 0,
                })
        })
    }
}

#[derive(Debug)]
enum Formula {
    /// numerator / denominator * scale; denominators must be strictly positive
    Quotient {
        numerator: Input,
        denominator: Input,
        scale: f64,
    },
    /// Period-over-period change against the immediately preceding period
    Growth(CanonicalAccount),
}

#[derive(Debug)]
pub struct RatioDefinition {
    pub name: &'static str,
    pub label: &'static str,
    pub interpretation: &'static str,
    pub category: RatioCategory,
    /// Weight within the category before renormalization
    pub weight: f64,
    formula: Formula,
    benchmarks: &'static [(f64, f64)],
}

impl RatioDefinition {
    pub fn requires_trend(&self) -> bool {
        matches!(self.formula, Formula::Growth(_))
    }

    pub fn default_benchmarks(&self) -> Vec<BenchmarkPoint> {
        self.benchmarks
            .iter()
            .map(|&(value, score)| BenchmarkPoint { value, score })
            .collect()
    }

    /// True when the default curve rewards larger values.
    pub fn higher_is_better(&self) -> bool {
        match (self.benchmarks.first(), self.benchmarks.last()) {
            (Some(first), Some(last)) => last.1 >= first.1,
            _ => true,
        }
    }

    pub fn evaluate(&self, statement: &FinancialStatement, period: PeriodId) -> RatioResult {
        let computed = match &self.formula {
            Formula::Quotient {
                numerator,
                denominator,
                scale,
            } => Self::quotient(statement, period, numerator, denominator, *scale),
            Formula::Growth(account) => Self::growth(statement, period, *account),
        };

        match computed {
            Some((value, inputs_used, substituted)) => RatioResult {
                name: self.name.to_string(),
                category: self.category,
                period,
                value: Some(value),
                completeness: if substituted {
                    Completeness::Partial
                } else {
                    Completeness::Complete
                },
                inputs_used,
            },
            None => RatioResult::unavailable(self, period),
        }
    }

    fn quotient(
        statement: &FinancialStatement,
        period: PeriodId,
        numerator: &Input,
        denominator: &Input,
        scale: f64,
    ) -> Option<(f64, BTreeSet<CanonicalAccount>, bool)> {
        let top = numerator.resolve(statement, period)?;
        let bottom = denominator.resolve(statement, period)?;
        if bottom.value <= 0.0 {
            return None;
        }
        let value = safe_ratio(top.value, bottom.value)? * scale;

        let inputs: BTreeSet<CanonicalAccount> =
            top.accounts.into_iter().chain(bottom.accounts).collect();
        Some((value, inputs, top.substituted || bottom.substituted))
    }

    fn growth(
        statement: &FinancialStatement,
        period: PeriodId,
        account: CanonicalAccount,
    ) -> Option<(f64, BTreeSet<CanonicalAccount>, bool)> {
        let prior = statement.prior_period(period)?;
        if statement.unit(period) != statement.unit(prior) {
            return None;
        }
        let current = statement.value(account, period)?;
        let previous = statement.value(account, prior)?;
        if previous <= 0.0 {
            return None;
        }
        let value = safe_ratio(current, previous)? - 1.0;
        Some((value, BTreeSet::from([account]), false))
    }
}

const TOTAL_ASSETS: Input = Input(&[
    Source::Account(CanonicalAccount::TotalAssets),
    Source::Account(CanonicalAccount::TotalLiabilitiesAndEquity),
    Source::Sum(&[CanonicalAccount::TotalLiabilities, CanonicalAccount::TotalEquity]),
]);
const TOTAL_LIABILITIES: Input = Input(&[
    Source::Account(CanonicalAccount::TotalLiabilities),
    Source::Account(CanonicalAccount::TotalDebt),
]);
const CURRENT_LIABILITIES: Input = Input(&[Source::Account(CanonicalAccount::CurrentLiabilities)]);
const REVENUE: Input = Input(&[Source::Account(CanonicalAccount::Revenue)]);

static CATALOG: [RatioDefinition; 14] = [
    RatioDefinition {
        name: "current_ratio",
        label: "Current ratio",
        interpretation: "Ability to cover short-term obligations with short-term assets",
        category: RatioCategory::Liquidity,
        weight: 0.35,
        formula: Formula::Quotient {
            numerator: Input(&[Source::Account(CanonicalAccount::CurrentAssets)]),
            denominator: CURRENT_LIABILITIES,
            scale: 1.0,
        },
        benchmarks: &[(0.5, 0.0), (1.0, 50.0), (2.0, 100.0)],
    },
    RatioDefinition {
        name: "quick_ratio",
        label: "Quick ratio",
        interpretation: "Short-term coverage without relying on selling inventory",
        category: RatioCategory::Liquidity,
        weight: 0.25,
        formula: Formula::Quotient {
            numerator: Input(&[
                Source::Difference(&[CanonicalAccount::CurrentAssets, CanonicalAccount::Inventory]),
                Source::Account(CanonicalAccount::CurrentAssets),
            ]),
            denominator: CURRENT_LIABILITIES,
            scale: 1.0,
        },
        benchmarks: &[(0.3, 0.0), (0.7, 50.0), (1.0, 100.0)],
    },
    RatioDefinition {
        name: "cash_ratio",
        label: "Cash ratio",
        interpretation: "Share of current liabilities that cash on hand could settle today",
        category: RatioCategory::Liquidity,
        weight: 0.20,
        formula: Formula::Quotient {
            numerator: Input(&[Source::Account(CanonicalAccount::Cash)]),
            denominator: CURRENT_LIABILITIES,
            scale: 1.0,
        },
        benchmarks: &[(0.05, 0.0), (0.2, 50.0), (0.5, 100.0)],
    },
    RatioDefinition {
        name: "operating_cash_flow_ratio",
        label: "Operating cash flow ratio",
        interpretation: "How far cash generated by operations covers current liabilities",
        category: RatioCategory::Liquidity,
        weight: 0.20,
        formula: Formula::Quotient {
            numerator: Input(&[Source::Account(CanonicalAccount::OperatingCashFlow)]),
            denominator: CURRENT_LIABILITIES,
            scale: 1.0,
        },
        benchmarks: &[(0.0, 0.0), (0.4, 50.0), (1.0, 100.0)],
    },
    RatioDefinition {
        name: "gross_margin",
        label: "Gross margin",
        interpretation: "Share of revenue left after direct costs",
        category: RatioCategory::Profitability,
        weight: 0.25,
        formula: Formula::Quotient {
            numerator: Input(&[
                Source::Account(CanonicalAccount::GrossProfit),
                Source::Difference(&[CanonicalAccount::Revenue, CanonicalAccount::CostOfGoodsSold]),
            ]),
            denominator: REVENUE,
            scale: 1.0,
        },
        benchmarks: &[(0.0, 0.0), (0.15, 50.0), (0.40, 100.0)],
    },
    RatioDefinition {
        name: "net_margin",
        label: "Net profit margin",
        interpretation: "Share of revenue kept as profit after all expenses",
        category: RatioCategory::Profitability,
        weight: 0.30,
        formula: Formula::Quotient {
            numerator: Input(&[Source::Account(CanonicalAccount::NetIncome)]),
            denominator: REVENUE,
            scale: 1.0,
        },
        benchmarks: &[(-0.05, 0.0), (0.05, 50.0), (0.15, 100.0)],
    },
    RatioDefinition {
        name: "return_on_assets",
        label: "Return on assets",
        interpretation: "Profit generated for every unit of assets employed",
        category: RatioCategory::Profitability,
        weight: 0.25,
        formula: Formula::Quotient {
            numerator: Input(&[Source::Account(CanonicalAccount::NetIncome)]),
            denominator: TOTAL_ASSETS,
            scale: 1.0,
        },
        benchmarks: &[(-0.02, 0.0), (0.04, 50.0), (0.10, 100.0)],
    },
    RatioDefinition {
        name: "revenue_growth",
        label: "Revenue growth",
        interpretation: "Change in revenue against the preceding period",
        category: RatioCategory::Profitability,
        weight: 0.20,
        formula: Formula::Growth(CanonicalAccount::Revenue),
        benchmarks: &[(-0.10, 0.0), (0.0, 50.0), (0.15, 100.0)],
    },
    RatioDefinition {
        name: "debt_to_equity",
        label: "Debt to equity",
        interpretation: "Reliance on borrowed funds relative to owners' capital",
        category: RatioCategory::Leverage,
        weight: 0.40,
        formula: Formula::Quotient {
            numerator: TOTAL_LIABILITIES,
            denominator: Input(&[Source::Account(CanonicalAccount::TotalEquity)]),
            scale: 1.0,
        },
        benchmarks: &[(0.5, 100.0), (1.5, 50.0), (3.0, 0.0)],
    },
    RatioDefinition {
        name: "debt_ratio",
        label: "Debt ratio",
        interpretation: "Share of assets financed by liabilities",
        category: RatioCategory::Leverage,
        weight: 0.30,
        formula: Formula::Quotient {
            numerator: TOTAL_LIABILITIES,
            denominator: TOTAL_ASSETS,
            scale: 1.0,
        },
        benchmarks: &[(0.3, 100.0), (0.6, 50.0), (0.9, 0.0)],
    },
    RatioDefinition {
        name: "interest_coverage",
        label: "Interest coverage",
        interpretation: "How many times operating earnings cover interest charges",
        category: RatioCategory::Leverage,
        weight: 0.30,
        formula: Formula::Quotient {
            numerator: Input(&[
                Source::Account(CanonicalAccount::Ebitda),
                Source::Account(CanonicalAccount::OperatingIncome),
                Source::Difference(&[
                    CanonicalAccount::Revenue,
                    CanonicalAccount::CostOfGoodsSold,
                    CanonicalAccount::OperatingExpenses,
                ]),
            ]),
            denominator: Input(&[Source::Account(CanonicalAccount::InterestExpense)]),
            scale: 1.0,
        },
        benchmarks: &[(1.0, 0.0), (3.0, 50.0), (8.0, 100.0)],
    },
    RatioDefinition {
        name: "asset_turnover",
        label: "Asset turnover",
        interpretation: "Revenue generated for every unit of assets",
        category: RatioCategory::Efficiency,
        weight: 0.35,
        formula: Formula::Quotient {
            numerator: REVENUE,
            denominator: TOTAL_ASSETS,
            scale: 1.0,
        },
        benchmarks: &[(0.3, 0.0), (1.0, 50.0), (2.0, 100.0)],
    },
    RatioDefinition {
        name: "inventory_turnover",
        label: "Inventory turnover",
        interpretation: "How often inventory is sold and replaced during the period",
        category: RatioCategory::Efficiency,
        weight: 0.30,
        formula: Formula::Quotient {
            numerator: Input(&[
                Source::Account(CanonicalAccount::CostOfGoodsSold),
                Source::Account(CanonicalAccount::OperatingExpenses),
            ]),
            denominator: Input(&[Source::Account(CanonicalAccount::Inventory)]),
            scale: 1.0,
        },
        benchmarks: &[(1.0, 0.0), (4.0, 50.0), (10.0, 100.0)],
    },
    RatioDefinition {
        name: "days_sales_outstanding",
        label: "Days sales outstanding",
        interpretation: "Average number of days customers take to pay",
        category: RatioCategory::Efficiency,
        weight: 0.35,
        formula: Formula::Quotient {
            numerator: Input(&[Source::Account(CanonicalAccount::AccountsReceivable)]),
            denominator: REVENUE,
            scale: 365.0,
        },
        benchmarks: &[(30.0, 100.0), (60.0, 50.0), (120.0, 0.0)],
    },
];

pub fn catalog() -> &'static [RatioDefinition] {
    &CATALOG
}

pub fn definition(name: &str) -> Option<&'static RatioDefinition> {
    CATALOG.iter().find(|d| d.name == name)
}

/// Catalog position, used to break ties deterministically.
pub fn catalog_index(name: &str) -> usize {
    CATALOG
        .iter()
        .position(|d| d.name == name)
        .unwrap_or(CATALOG.len())
}

/// Evaluates every catalog ratio for every period of the statement.
///
/// Each ratio runs on its own scoped thread over the shared, immutable statement. Results
/// are ordered by period, then by catalog position.
pub fn compute_ratios(statement: &FinancialStatement) -> Vec<RatioResult> {
    let per_ratio: Vec<Vec<RatioResult>> = std::thread::scope(|scope| {
        let handles: Vec<_> = CATALOG
            .iter()
            .map(|definition| {
                scope.spawn(move || {
                    statement
                        .periods
                        .iter()
                        .map(|period| definition.evaluate(statement, *period))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    });

    let mut results = Vec::with_capacity(CATALOG.len() * statement.periods.len());
    for (period_idx, period) in statement.periods.iter().enumerate() {
        for results_for_ratio in &per_ratio {
            if let Some(result) = results_for_ratio.get(period_idx) {
                debug!(
                    "{} {} = {:?} ({:?})",
                    period, result.name, result.value, result.completeness
                );
                results.push(result.clone());
            }
        }
    }

    info!(
        "Computed {} ratio results across {} period(s) for '{}'",
        results.len(),
        statement.periods.len(),
        statement.entity_id
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CurrencyUnit;

    fn fy(year: i32) -> PeriodId {
        PeriodId::annual(year)
    }

    fn full_statement() -> FinancialStatement {
        use CanonicalAccount::*;
        let p = fy(2023);
        let mut statement = FinancialStatement::new("acme");
        for (account, value) in [
            (Cash, 50_000.0),
            (AccountsReceivable, 100_000.0),
            (Inventory, 40_000.0),
            (CurrentAssets, 200_000.0),
            (TotalAssets, 500_000.0),
            (CurrentLiabilities, 100_000.0),
            (TotalLiabilities, 250_000.0),
            (TotalEquity, 250_000.0),
            (Revenue, 1_000_000.0),
            (CostOfGoodsSold, 600_000.0),
            (GrossProfit, 400_000.0),
            (Ebitda, 150_000.0),
            (InterestExpense, 25_000.0),
            (NetIncome, 80_000.0),
            (OperatingCashFlow, 60_000.0),
        ] {
            statement = statement.with_value(p, account, value);
        }
        statement.with_value(fy(2022), Revenue, 800_000.0)
    }

    fn find<'a>(results: &'a [RatioResult], name: &str, period: PeriodId) -> &'a RatioResult {
        results
            .iter()
            .find(|r| r.name == name && r.period == period)
            .unwrap()
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_catalog_shape() {
        assert_eq!(catalog().len(), 14);
        for category in RatioCategory::ALL {
            let weight: f64 = catalog()
                .iter()
                .filter(|d| d.category == category)
                .map(|d| d.weight)
                .sum();
            assert!((weight - 1.0).abs() < 1e-9, "{} weights sum to {}", category, weight);
        }
        assert!(definition("revenue_growth").unwrap().requires_trend());
        assert!(!definition("debt_ratio").unwrap().higher_is_better());
        assert_eq!(catalog_index("current_ratio"), 0);
    }

    #[test]
    fn test_complete_inputs_match_closed_forms() {
        let results = compute_ratios(&full_statement());
        assert_eq!(results.len(), 28);
        let p = fy(2023);

        let expected = [
            ("current_ratio", 2.0),
            ("quick_ratio", 1.6),
            ("cash_ratio", 0.5),
            ("operating_cash_flow_ratio", 0.6),
            ("gross_margin", 0.4),
            ("net_margin", 0.08),
            ("return_on_assets", 0.16),
            ("revenue_growth", 0.25),
            ("debt_to_equity", 1.0),
            ("debt_ratio", 0.5),
            ("interest_coverage", 6.0),
            ("asset_turnover", 2.0),
            ("inventory_turnover", 15.0),
            ("days_sales_outstanding", 36.5),
        ];
        for (name, value) in expected {
            let result = find(&results, name, p);
            assert_eq!(result.completeness, Completeness::Complete, "{}", name);
            assert_close(result.value, value);
        }

        let current = find(&results, "current_ratio", p);
        assert_eq!(
            current.inputs_used,
            BTreeSet::from([CanonicalAccount::CurrentAssets, CanonicalAccount::CurrentLiabilities])
        );
    }

    #[test]
    fn test_fallbacks_are_partial() {
        use CanonicalAccount::*;
        let p = fy(2023);
        let statement = FinancialStatement::new("acme")
            .with_value(p, CurrentAssets, 300.0)
            .with_value(p, CurrentLiabilities, 200.0)
            .with_value(p, Revenue, 1_000.0)
            .with_value(p, CostOfGoodsSold, 700.0)
            .with_value(p, OperatingExpenses, 100.0)
            .with_value(p, InterestExpense, 50.0)
            .with_value(p, TotalLiabilities, 400.0)
            .with_value(p, TotalEquity, 600.0);
        let results = compute_ratios(&statement);

        let quick = find(&results, "quick_ratio", p);
        assert_eq!(quick.completeness, Completeness::Partial);
        assert_close(quick.value, 1.5);

        let gross = find(&results, "gross_margin", p);
        assert_eq!(gross.completeness, Completeness::Partial);
        assert_close(gross.value, 0.3);

        let coverage = find(&results, "interest_coverage", p);
        assert_eq!(coverage.completeness, Completeness::Partial);
        assert_close(coverage.value, 4.0);

        let roa_denominator = find(&results, "asset_turnover", p);
        assert_eq!(roa_denominator.completeness, Completeness::Partial);
        assert_close(roa_denominator.value, 1.0);
        assert!(roa_denominator.inputs_used.contains(&TotalEquity));
    }

    #[test]
    fn test_missing_and_degenerate_inputs_are_unavailable() {
        use CanonicalAccount::*;
        let p = fy(2023);
        let statement = FinancialStatement::new("acme")
            .with_value(p, CurrentAssets, 100.0)
            .with_value(p, CurrentLiabilities, 0.0)
            .with_value(p, TotalLiabilities, 100.0)
            .with_value(p, TotalEquity, -20.0);
        let results = compute_ratios(&statement);

        for name in ["current_ratio", "debt_to_equity", "net_margin", "revenue_growth"] {
            let result = find(&results, name, p);
            assert_eq!(result.completeness, Completeness::Unavailable, "{}", name);
            assert_eq!(result.value, None);
            assert!(!result.is_present());
        }
    }

    #[test]
    fn test_growth_needs_matching_unit_and_adjacent_period() {
        use CanonicalAccount::*;
        let mut statement = FinancialStatement::new("acme")
            .with_value(fy(2021), Revenue, 100.0)
            .with_value(fy(2023), Revenue, 150.0);
        let results = compute_ratios(&statement);
        assert_eq!(
            find(&results, "revenue_growth", fy(2023)).completeness,
            Completeness::Unavailable
        );

        statement = statement.with_value(fy(2022), Revenue, 120.0);
        statement.units.insert(fy(2022), CurrencyUnit::new("EUR"));
        statement.units.insert(fy(2023), CurrencyUnit::new("USD"));
        let results = compute_ratios(&statement);
        assert_eq!(
            find(&results, "revenue_growth", fy(2023)).completeness,
            Completeness::Unavailable
        );

        statement.units.insert(fy(2022), CurrencyUnit::new("USD"));
        let results = compute_ratios(&statement);
        assert_close(find(&results, "revenue_growth", fy(2023)).value, 0.25);
    }

    #[test]
    fn test_results_ordered_by_period_then_catalog() {
        let results = compute_ratios(&full_statement());
        assert_eq!(results[0].period, fy(2022));
        assert_eq!(results[0].name, "current_ratio");
        assert_eq!(results[14].period, fy(2023));
        assert_eq!(results[13].name, "days_sales_outstanding");
    }
}
