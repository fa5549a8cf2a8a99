use crate::utils::normalize_label;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum StatementSection {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

/// The fixed taxonomy every ratio formula is written against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum CanonicalAccount {
    Cash,
    AccountsReceivable,
    Inventory,
    CurrentAssets,
    TotalAssets,
    AccountsPayable,
    CurrentLiabilities,
    TotalDebt,
    TotalLiabilities,
    RetainedEarnings,
    TotalEquity,
    TotalLiabilitiesAndEquity,
    Revenue,
    CostOfGoodsSold,
    GrossProfit,
    OperatingExpenses,
    Ebitda,
    OperatingIncome,
    InterestExpense,
    NetIncome,
    OperatingCashFlow,
}

impl CanonicalAccount {
    pub const ALL: [CanonicalAccount; 21] = [
        CanonicalAccount::Cash,
        CanonicalAccount::AccountsReceivable,
        CanonicalAccount::Inventory,
        CanonicalAccount::CurrentAssets,
        CanonicalAccount::TotalAssets,
        CanonicalAccount::AccountsPayable,
        CanonicalAccount::CurrentLiabilities,
        CanonicalAccount::TotalDebt,
        CanonicalAccount::TotalLiabilities,
        CanonicalAccount::RetainedEarnings,
        CanonicalAccount::TotalEquity,
        CanonicalAccount::TotalLiabilitiesAndEquity,
        CanonicalAccount::Revenue,
        CanonicalAccount::CostOfGoodsSold,
        CanonicalAccount::GrossProfit,
        CanonicalAccount::OperatingExpenses,
        CanonicalAccount::Ebitda,
        CanonicalAccount::OperatingIncome,
        CanonicalAccount::InterestExpense,
        CanonicalAccount::NetIncome,
        CanonicalAccount::OperatingCashFlow,
    ];

    pub fn section(&self) -> StatementSection {
        use CanonicalAccount::*;
        match self {
            Cash
            | AccountsReceivable
            | Inventory
            | CurrentAssets
            | TotalAssets
            | AccountsPayable
            | CurrentLiabilities
            | TotalDebt
            | TotalLiabilities
            | RetainedEarnings
            | TotalEquity
            | TotalLiabilitiesAndEquity => StatementSection::BalanceSheet,
            Revenue | CostOfGoodsSold | GrossProfit | OperatingExpenses | Ebitda
            | OperatingIncome | InterestExpense | NetIncome => StatementSection::IncomeStatement,
            OperatingCashFlow => StatementSection::CashFlow,
        }
    }

    pub fn display_name(&self) -> &'static str {
        use CanonicalAccount::*;
        match self {
            Cash => "Cash",
            AccountsReceivable => "Accounts Receivable",
            Inventory => "Inventory",
            CurrentAssets => "Current Assets",
            TotalAssets => "Total Assets",
            AccountsPayable => "Accounts Payable",
            CurrentLiabilities => "Current Liabilities",
            TotalDebt => "Total Debt",
            TotalLiabilities => "Total Liabilities",
            RetainedEarnings => "Retained Earnings",
            TotalEquity => "Total Equity",
            TotalLiabilitiesAndEquity => "Total Liabilities and Equity",
            Revenue => "Revenue",
            CostOfGoodsSold => "Cost of Goods Sold",
            GrossProfit => "Gross Profit",
            OperatingExpenses => "Operating Expenses",
            Ebitda => "EBITDA",
            OperatingIncome => "Operating Income (EBIT)",
            InterestExpense => "Interest Expense",
            NetIncome => "Net Income",
            OperatingCashFlow => "Operating Cash Flow",
        }
    }

    /// Built-in wording seen in SME statements, spreadsheet exports and the column
    /// names accounting packages emit.
    pub fn default_aliases(&self) -> &'static [&'static str] {
        use CanonicalAccount::*;
        match self {
            Cash => &[
                "cash",
                "cash at bank",
                "cash and cash equivalents",
                "cash and equivalents",
                "bank balances",
            ],
            AccountsReceivable => &[
                "accounts receivable",
                "trade receivables",
                "trade and other receivables",
                "trade debtors",
                "debtors",
                "receivables",
            ],
            Inventory => &["inventory", "inventories", "stock", "stock on hand", "closing stock"],
            CurrentAssets => &["current assets", "total current assets"],
            TotalAssets => &["total assets", "assets"],
            AccountsPayable => &[
                "accounts payable",
                "trade payables",
                "trade and other payables",
                "trade creditors",
                "creditors",
                "payables",
            ],
            CurrentLiabilities => &["current liabilities", "total current liabilities"],
            TotalDebt => &[
                "total debt",
                "debt",
                "loans",
                "borrowings",
                "bank loans",
                "total borrowings",
            ],
            TotalLiabilities => &["total liabilities", "liabilities"],
            RetainedEarnings => &["retained earnings", "accumulated profits", "retained profits"],
            TotalEquity => &[
                "total equity",
                "equity",
                "shareholders equity",
                "total shareholders equity",
                "owners equity",
                "net worth",
            ],
            TotalLiabilitiesAndEquity => &[
                "total liabilities and equity",
                "total liabilities and shareholders equity",
                "liabilities and equity",
            ],
            Revenue => &[
                "revenue",
                "revenues",
                "sales",
                "net sales",
                "turnover",
                "total revenue",
                "total income",
            ],
            CostOfGoodsSold => &[
                "cost of goods sold",
                "cogs",
                "cost of sales",
                "cost of revenue",
                "direct costs",
            ],
            GrossProfit => &["gross profit", "gross margin"],
            OperatingExpenses => &[
                "operating expenses",
                "opex",
                "expenses",
                "total expenses",
                "overheads",
                "total operating expenses",
            ],
            Ebitda => &["ebitda"],
            OperatingIncome => &[
                "operating income",
                "operating profit",
                "ebit",
                "profit from operations",
            ],
            InterestExpense => &["interest expense", "finance costs", "interest paid", "interest"],
            NetIncome => &[
                "net income",
                "net profit",
                "profit for the year",
                "net profit after tax",
                "profit after tax",
                "net earnings",
            ],
            OperatingCashFlow => &[
                "operating cash flow",
                "cash from operations",
                "net cash from operating activities",
                "cash flow from operations",
            ],
        }
    }
}

impl fmt::Display for CanonicalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Normalized alias text
    pub alias: String,
    pub account: CanonicalAccount,
    pub tokens: Vec<String>,
}

/// The alias table the mapper matches raw labels against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    entries: Vec<AliasEntry>,
    exact: BTreeMap<String, CanonicalAccount>,
}

const STOP_WORDS: [&str; 6] = ["and", "of", "the", "for", "in", "on"];

pub fn label_tokens(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

impl ChartOfAccounts {
    pub fn standard() -> Self {
        Self::with_extra_aliases(&BTreeMap::new())
    }

    /// Extra aliases are consulted before the built-in table, so a configured alias can
    /// redirect wording the defaults would map elsewhere.
    pub fn with_extra_aliases(extra: &BTreeMap<String, CanonicalAccount>) -> Self {
        let mut entries = Vec::new();
        let mut exact = BTreeMap::new();

        for (alias, account) in extra {
            let normalized = normalize_label(alias);
            if normalized.is_empty() {
                continue;
            }
            exact.insert(normalized.clone(), *account);
            entries.push(AliasEntry {
                tokens: label_tokens(&normalized),
                alias: normalized,
                account: *account,
            });
        }

        for account in CanonicalAccount::ALL {
            for alias in account.default_aliases() {
                let normalized = normalize_label(alias);
                if exact.contains_key(&normalized) {
                    continue;
                }
                exact.insert(normalized.clone(), account);
                entries.push(AliasEntry {
                    tokens: label_tokens(&normalized),
                    alias: normalized,
                    account,
                });
            }
        }

        Self { entries, exact }
    }

    pub fn lookup_exact(&self, normalized_label: &str) -> Option<CanonicalAccount> {
        self.exact.get(normalized_label).copied()
    }

    pub fn entries(&self) -> &[AliasEntry] {
        &self.entries
    }

    pub fn total_aliases(&self) -> usize {
        self.entries.len()
    }

    pub fn aliases_for(&self, account: CanonicalAccount) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.account == account)
            .map(|e| e.alias.as_str())
            .collect()
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Canonical Accounts\n\n");

        for section in [
            StatementSection::BalanceSheet,
            StatementSection::IncomeStatement,
            StatementSection::CashFlow,
        ] {
            output.push_str(&format!("## {:?}\n\n", section));
            for account in CanonicalAccount::ALL.iter().filter(|a| a.section() == section) {
                output.push_str(&format!(
                    "- **{}**: {}\n",
                    account.display_name(),
                    self.aliases_for(*account).join(", ")
                ));
            }
            output.push('\n');
        }

        output
    }
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_aliases_are_unique_after_normalization() {
        let chart = ChartOfAccounts::standard();
        let mut seen = std::collections::BTreeSet::new();
        for entry in chart.entries() {
            assert!(seen.insert(entry.alias.clone()), "duplicate alias {}", entry.alias);
        }
        assert_eq!(chart.lookup_exact("turnover"), Some(CanonicalAccount::Revenue));
    }

    #[test]
    fn test_every_account_has_an_alias() {
        let chart = ChartOfAccounts::standard();
        for account in CanonicalAccount::ALL {
            assert!(!chart.aliases_for(account).is_empty(), "{:?}", account);
        }
    }

    #[test]
    fn test_extra_alias_overrides_default() {
        let mut extra = BTreeMap::new();
        extra.insert("Stock".to_string(), CanonicalAccount::TotalEquity);
        extra.insert("Sundry Debtors".to_string(), CanonicalAccount::AccountsReceivable);

        let chart = ChartOfAccounts::with_extra_aliases(&extra);
        assert_eq!(chart.lookup_exact("stock"), Some(CanonicalAccount::TotalEquity));
        assert_eq!(
            chart.lookup_exact("sundry debtors"),
            Some(CanonicalAccount::AccountsReceivable)
        );
    }

    #[test]
    fn test_sections() {
        assert_eq!(CanonicalAccount::Inventory.section(), StatementSection::BalanceSheet);
        assert_eq!(CanonicalAccount::Ebitda.section(), StatementSection::IncomeStatement);
        assert_eq!(CanonicalAccount::OperatingCashFlow.section(), StatementSection::CashFlow);
    }

    #[test]
    fn test_chart_to_markdown() {
        let markdown = ChartOfAccounts::standard().to_markdown();
        assert!(markdown.contains("# Canonical Accounts"));
        assert!(markdown.contains("## BalanceSheet"));
        assert!(markdown.contains("**Revenue**: revenue, revenues, sales"));
    }
}
