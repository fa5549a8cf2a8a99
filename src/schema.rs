use crate::error::{FinancialHealthError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A fiscal year, optionally narrowed to one quarter.
///
/// Quarters of a year order before the annual period of that same year, so a
/// sorted sequence reads `2022-Q4, FY2022, 2023-Q1, ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PeriodId {
    pub fiscal_year: i32,
    pub quarter: Option<u8>,
}

impl PeriodId {
    pub fn annual(fiscal_year: i32) -> Self {
        Self {
            fiscal_year,
            quarter: None,
        }
    }

    pub fn quarterly(fiscal_year: i32, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(FinancialHealthError::InvalidPeriod(format!(
                "{}-Q{}",
                fiscal_year, quarter
            )));
        }
        Ok(Self {
            fiscal_year,
            quarter: Some(quarter),
        })
    }

    pub fn is_annual(&self) -> bool {
        self.quarter.is_none()
    }

    pub fn same_granularity(&self, other: &PeriodId) -> bool {
        self.is_annual() == other.is_annual()
    }

    /// The immediately preceding period of the same granularity.
    pub fn predecessor(&self) -> PeriodId {
        match self.quarter {
            None => PeriodId::annual(self.fiscal_year - 1),
            Some(1) => PeriodId {
                fiscal_year: self.fiscal_year - 1,
                quarter: Some(4),
            },
            Some(q) => PeriodId {
                fiscal_year: self.fiscal_year,
                quarter: Some(q - 1),
            },
        }
    }

    fn sort_key(&self) -> (i32, u8) {
        (self.fiscal_year, self.quarter.unwrap_or(5))
    }
}

impl Ord for PeriodId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for PeriodId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quarter {
            None => write!(f, "FY{}", self.fiscal_year),
            Some(q) => write!(f, "{}-Q{}", self.fiscal_year, q),
        }
    }
}

impl FromStr for PeriodId {
    type Err = FinancialHealthError;

    /// Accepts `2023`, `FY2023`, `FY 2023`, `2023-Q1`, `Q1 2023`, `Q1-2023`,
    /// `2023Q1` and `FY2023 Q1`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || FinancialHealthError::InvalidPeriod(s.to_string());

        let compact: String = s
            .trim()
            .to_ascii_uppercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '/' | '_' | '.' | '\t'))
            .collect();
        let compact = compact.replace("FY", "");
        if !compact.is_ascii() {
            return Err(invalid());
        }

        let parse_year = |digits: &str| -> Result<i32> {
            if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            let year: i32 = digits.parse().map_err(|_| invalid())?;
            if !(1900..=2100).contains(&year) {
                return Err(invalid());
            }
            Ok(year)
        };
        let parse_quarter = |text: &str| -> Result<u8> {
            let digit = text.strip_prefix('Q').ok_or_else(invalid)?;
            match digit {
                "1" => Ok(1),
                "2" => Ok(2),
                "3" => Ok(3),
                "4" => Ok(4),
                _ => Err(invalid()),
            }
        };

        match compact.len() {
            4 => Ok(PeriodId::annual(parse_year(&compact)?)),
            6 if compact.starts_with('Q') => {
                let quarter = parse_quarter(&compact[..2])?;
                PeriodId::quarterly(parse_year(&compact[2..])?, quarter)
            }
            6 => {
                let year = parse_year(&compact[..4])?;
                PeriodId::quarterly(year, parse_quarter(&compact[4..])?)
            }
            _ => Err(invalid()),
        }
    }
}

impl From<PeriodId> for String {
    fn from(period: PeriodId) -> Self {
        period.to_string()
    }
}

impl TryFrom<String> for PeriodId {
    type Error = FinancialHealthError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyUnit(pub String);

impl CurrencyUnit {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        let code = match symbol {
            '$' => "USD",
            '€' => "EUR",
            '£' => "GBP",
            '₹' => "INR",
            '¥' => "JPY",
            _ => return None,
        };
        Some(Self::new(code))
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyUnit {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How much the extractor trusts an item's position and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExtractionConfidence {
    Low,
    Medium,
    High,
}

impl ExtractionConfidence {
    /// One level down, bottoming out at `Low`.
    pub fn lowered(self) -> Self {
        match self {
            ExtractionConfidence::High => ExtractionConfidence::Medium,
            ExtractionConfidence::Medium | ExtractionConfidence::Low => ExtractionConfidence::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Zero-based data row and column of a spreadsheet cell
    Cell { row: usize, column: usize },
    /// One-based line number and character column of a text token
    Line { line: usize, column: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub document: String,
    pub locator: Locator,
    pub confidence: ExtractionConfidence,
    /// Position in the run-wide extraction order; later items have larger ordinals
    pub ordinal: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    pub label: String,
    pub value: f64,
    pub period: PeriodId,
    pub unit: CurrencyUnit,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Modality {
    /// Spreadsheet exports (CSV, TSV) and workbooks (xlsx, xls, ods)
    Tabular,
    /// Documents with a text layer (plain text, PDF text extraction)
    Text,
}

impl Modality {
    pub fn from_file_name(name: &str) -> Option<Self> {
        let mime = mime_guess::from_path(name).first()?;
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("text", "csv")
            | ("text", "tab-separated-values")
            | ("application", "vnd.ms-excel")
            | ("application", "vnd.openxmlformats-officedocument.spreadsheetml.sheet")
            | ("application", "vnd.oasis.opendocument.spreadsheet") => Some(Modality::Tabular),
            ("text", _) | ("application", "pdf") => Some(Modality::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub bytes: Vec<u8>,
    pub modality: Modality,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>, modality: Modality) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            modality,
        }
    }

    pub fn tabular(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, bytes, Modality::Tabular)
    }

    pub fn text(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, bytes, Modality::Text)
    }

    /// Reads a file, guessing its modality from the extension.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let modality = Modality::from_file_name(&name).ok_or_else(|| {
            FinancialHealthError::unreadable(&name, "unsupported file type")
        })?;
        let bytes = std::fs::read(path)?;
        Ok(Self::new(name, bytes, modality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing_variants() {
        assert_eq!("2023".parse::<PeriodId>().unwrap(), PeriodId::annual(2023));
        assert_eq!("FY2023".parse::<PeriodId>().unwrap(), PeriodId::annual(2023));
        assert_eq!("fy 2023".parse::<PeriodId>().unwrap(), PeriodId::annual(2023));

        let q1 = PeriodId::quarterly(2023, 1).unwrap();
        assert_eq!("2023-Q1".parse::<PeriodId>().unwrap(), q1);
        assert_eq!("Q1 2023".parse::<PeriodId>().unwrap(), q1);
        assert_eq!("2023Q1".parse::<PeriodId>().unwrap(), q1);
        assert_eq!("FY2023 Q1".parse::<PeriodId>().unwrap(), q1);

        assert!("Q5 2023".parse::<PeriodId>().is_err());
        assert!("1,200".parse::<PeriodId>().is_err());
        assert!("Revenue".parse::<PeriodId>().is_err());
        assert!("1850".parse::<PeriodId>().is_err());
    }

    #[test]
    fn test_period_ordering() {
        let mut periods = vec![
            PeriodId::annual(2023),
            PeriodId::quarterly(2023, 2).unwrap(),
            PeriodId::annual(2022),
            PeriodId::quarterly(2023, 1).unwrap(),
        ];
        periods.sort();
        let rendered: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
        assert_eq!(rendered, vec!["FY2022", "2023-Q1", "2023-Q2", "FY2023"]);
    }

    #[test]
    fn test_period_predecessor() {
        assert_eq!(PeriodId::annual(2023).predecessor(), PeriodId::annual(2022));
        assert_eq!(
            PeriodId::quarterly(2023, 1).unwrap().predecessor(),
            PeriodId::quarterly(2022, 4).unwrap()
        );
    }

    #[test]
    fn test_period_serializes_as_string() {
        let json = serde_json::to_string(&PeriodId::quarterly(2024, 3).unwrap()).unwrap();
        assert_eq!(json, "\"2024-Q3\"");
        let back: PeriodId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.quarter, Some(3));
    }

    #[test]
    fn test_confidence_lowered() {
        assert_eq!(ExtractionConfidence::High.lowered(), ExtractionConfidence::Medium);
        assert_eq!(ExtractionConfidence::Medium.lowered(), ExtractionConfidence::Low);
        assert_eq!(ExtractionConfidence::Low.lowered(), ExtractionConfidence::Low);
    }

    #[test]
    fn test_modality_from_file_name() {
        assert_eq!(Modality::from_file_name("tb.csv"), Some(Modality::Tabular));
        assert_eq!(Modality::from_file_name("accounts.xlsx"), Some(Modality::Tabular));
        assert_eq!(Modality::from_file_name("legacy.xls"), Some(Modality::Tabular));
        assert_eq!(Modality::from_file_name("report.pdf"), Some(Modality::Text));
        assert_eq!(Modality::from_file_name("notes.txt"), Some(Modality::Text));
        assert_eq!(Modality::from_file_name("photo.png"), None);
    }
}
