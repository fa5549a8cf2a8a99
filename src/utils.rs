use crate::schema::CurrencyUnit;

/// A numeric token parsed out of a spreadsheet cell or text line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAmount {
    pub value: f64,
    pub unit: Option<CurrencyUnit>,
    /// Parentheses, trailing minus or stray characters were needed to read the value
    pub heuristic: bool,
}

/// Parses an amount such as `1,234.50`, `$ 1,234`, `(2,000)`, `-350` or `1 234`.
///
/// Returns `None` for dashes meaning "nil", for empty cells, and for anything that
/// is not a plain number after stripping currency symbols and separators.
pub fn parse_amount(raw: &str) -> Option<ParsedAmount> {
    let mut text = raw.trim();
    if text.is_empty() || text.chars().all(|c| matches!(c, '-' | '–' | '—')) {
        return None;
    }

    let mut negative = false;
    let mut heuristic = false;
    let mut unit = None;

    if text.starts_with('(') && text.ends_with(')') {
        negative = true;
        heuristic = true;
        text = text[1..text.len() - 1].trim();
    }
    if let Some(rest) = text.strip_suffix('-') {
        negative = true;
        heuristic = true;
        text = rest.trim();
    }
    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.trim();
    }

    let mut digits = String::with_capacity(text.len());
    let mut seen_digit = false;
    for c in text.chars() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                digits.push(c);
            }
            '.' => digits.push(c),
            ',' | ' ' | '\u{a0}' | '\'' => {}
            '-' if !seen_digit => negative = !negative,
            other => match CurrencyUnit::from_symbol(other) {
                Some(symbol_unit) if !seen_digit => unit = Some(symbol_unit),
                _ => return None,
            },
        }
    }

    if !seen_digit || digits.matches('.').count() > 1 {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    Some(ParsedAmount {
        value: if negative { -value } else { value },
        unit,
        heuristic,
    })
}

/// Lowercases, maps `&` to `and`, replaces punctuation with spaces and collapses whitespace.
pub fn normalize_label(label: &str) -> String {
    let replaced = label.to_lowercase().replace('&', " and ");
    replaced
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    let value = numerator / denominator;
    value.is_finite().then_some(value)
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_grouped_amounts() {
        assert_eq!(parse_amount("1234").unwrap().value, 1234.0);
        assert_eq!(parse_amount("1,234.50").unwrap().value, 1234.5);
        assert_eq!(parse_amount(" 1 200 000 ").unwrap().value, 1_200_000.0);
        assert!(!parse_amount("1,234").unwrap().heuristic);
    }

    #[test]
    fn test_parse_negative_forms() {
        let paren = parse_amount("(2,000)").unwrap();
        assert_eq!(paren.value, -2000.0);
        assert!(paren.heuristic);

        assert_eq!(parse_amount("-350").unwrap().value, -350.0);
        assert_eq!(parse_amount("350-").unwrap().value, -350.0);
        assert_eq!(parse_amount("$-45").unwrap().value, -45.0);
    }

    #[test]
    fn test_parse_currency_symbols() {
        let amount = parse_amount("€ 12,500").unwrap();
        assert_eq!(amount.value, 12_500.0);
        assert_eq!(amount.unit, Some(CurrencyUnit::new("EUR")));

        let amount = parse_amount("$1,000").unwrap();
        assert_eq!(amount.unit, Some(CurrencyUnit::new("USD")));
    }

    #[test]
    fn test_parse_rejects_non_numbers() {
        assert!(parse_amount("").is_none());
        assert!(parse_amount("-").is_none());
        assert!(parse_amount("—").is_none());
        assert!(parse_amount("Revenue").is_none());
        assert!(parse_amount("12abc").is_none());
        assert!(parse_amount("1.2.3").is_none());
        assert!(parse_amount("20$").is_none());
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Total Liabilities & Equity "), "total liabilities and equity");
        assert_eq!(normalize_label("Cost of Goods Sold (COGS)"), "cost of goods sold cogs");
        assert_eq!(normalize_label("Shareholders' Equity"), "shareholders equity");
    }

    #[test]
    fn test_safe_ratio() {
        assert_eq!(safe_ratio(200_000.0, 100_000.0), Some(2.0));
        assert_eq!(safe_ratio(1.0, 0.0), None);
        assert_eq!(safe_ratio(f64::NAN, 1.0), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(66.666_666, 1), 66.7);
    }
}
