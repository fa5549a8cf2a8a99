use super::{ExtractionContext, LineItemExtractor};
use crate::error::{FinancialHealthError, Result};
use crate::schema::{
    ExtractionConfidence, Locator, Modality, PeriodId, RawLineItem, SourceDocument,
    SourceLocation,
};
use crate::utils::{parse_amount, ParsedAmount};
use log::debug;
use std::borrow::Cow;

const MAX_CONTROL_CHAR_RATIO: f64 = 0.10;
const PDF_MAGIC: &[u8] = b"%PDF-";
const LABEL_FILLERS: [&str; 7] = ["for", "in", "during", "the", "year", "of", "as"];

/// Reads the text layer of statements using column-alignment heuristics.
///
/// Nothing extracted from text is trusted above `Medium`.
pub struct TextExtractor;

/// A run of characters separated from its neighbours by a tab or two or more spaces.
#[derive(Debug, Clone)]
struct Segment<'a> {
    text: &'a str,
    byte_start: usize,
    start: usize,
    /// Exclusive character column of the segment's right edge
    end: usize,
}

#[derive(Debug, Clone, Copy)]
struct PeriodColumn {
    period: PeriodId,
    end: usize,
}

fn words(line: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut column = 0;

    for (byte, c) in line.char_indices() {
        if c.is_whitespace() {
            if let Some((s_byte, s_col)) = start.take() {
                out.push(Segment {
                    text: &line[s_byte..byte],
                    byte_start: s_byte,
                    start: s_col,
                    end: column,
                });
            }
        } else if start.is_none() {
            start = Some((byte, column));
        }
        column += 1;
    }
    if let Some((s_byte, s_col)) = start {
        out.push(Segment {
            text: &line[s_byte..],
            byte_start: s_byte,
            start: s_col,
            end: column,
        });
    }
    out
}

fn segments(line: &str) -> Vec<Segment<'_>> {
    let mut merged: Vec<Segment<'_>> = Vec::new();
    let chars: Vec<char> = line.chars().collect();

    for word in words(line) {
        if let Some(last) = merged.last_mut() {
            let single_space = word.start == last.end + 1 && chars.get(last.end) == Some(&' ');
            if single_space {
                last.text = &line[last.byte_start..word.byte_start + word.text.len()];
                last.end = word.end;
                continue;
            }
        }
        merged.push(word);
    }
    merged
}

/// Recognizes a row of period headings. Once columns are known, only a row made up
/// entirely of periods can replace them, since data rows may hold year-like amounts.
fn header_columns(segments: &[Segment<'_>], have_columns: bool) -> Option<Vec<PeriodColumn>> {
    let parsed: Vec<Option<PeriodId>> = segments
        .iter()
        .map(|s| s.text.parse::<PeriodId>().ok())
        .collect();
    let periods: Vec<PeriodColumn> = segments
        .iter()
        .zip(&parsed)
        .filter_map(|(s, period)| period.map(|period| PeriodColumn { period, end: s.end }))
        .collect();

    let first = periods.first()?;
    let distinct = periods
        .iter()
        .enumerate()
        .all(|(i, c)| periods[..i].iter().all(|earlier| earlier.period != c.period));
    let same_granularity = periods
        .iter()
        .all(|c| c.period.same_granularity(&first.period));
    if !distinct || !same_granularity {
        return None;
    }

    let all_but_first = parsed.iter().skip(1).all(Option::is_some);
    let all = all_but_first && parsed.first().map(Option::is_some).unwrap_or(false);

    if all || (all_but_first && !have_columns) {
        Some(periods)
    } else {
        None
    }
}

fn strip_label(label: &str) -> String {
    let trimmed = label.trim().trim_end_matches([':', '=', '-', '.']).trim();
    let mut words: Vec<&str> = trimmed.split_whitespace().collect();
    while words
        .last()
        .map(|w| LABEL_FILLERS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false)
    {
        words.pop();
    }
    words.join(" ")
}

fn clean_token(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '(' | ')' | ':' | ',' | ';' | '[' | ']'))
}

struct LineReading {
    label: String,
    amounts: Vec<(ParsedAmount, usize)>,
    /// The label and numbers could only be separated word by word
    loose: bool,
}

fn read_data_line(segs: &[Segment<'_>]) -> Option<LineReading> {
    let first = segs.first()?;
    if parse_amount(first.text).is_some() {
        return None;
    }

    if segs.len() > 1 {
        // Trailing numeric segments are the values; everything before them is the label
        // (note references and sub-captions included).
        let mut split = segs.len();
        while split > 1 && parse_amount(segs[split - 1].text).is_some() {
            split -= 1;
        }
        if split == segs.len() {
            return None;
        }
        let label: Vec<&str> = segs[..split].iter().map(|s| s.text).collect();
        return Some(LineReading {
            label: strip_label(&label.join(" ")),
            amounts: segs[split..]
                .iter()
                .filter_map(|s| parse_amount(s.text).map(|a| (a, s.end)))
                .collect(),
            loose: false,
        });
    }

    let words = words(first.text);
    let mut split = words.len();
    while split > 1 && parse_amount(words[split - 1].text).is_some() {
        split -= 1;
    }
    if split == words.len() {
        return None;
    }
    let last_label_word = &words[split - 1];
    Some(LineReading {
        label: strip_label(&first.text[..last_label_word.byte_start + last_label_word.text.len()]),
        amounts: words[split..]
            .iter()
            .filter_map(|w| parse_amount(w.text).map(|a| (a, first.start + w.end)))
            .collect(),
        loose: true,
    })
}

/// `Revenue for FY2023: 1,200,000` style lines.
fn read_inline(line: &str) -> Option<(String, Option<PeriodId>, ParsedAmount)> {
    let (head, tail) = line.split_once(':')?;
    let amount_token = tail.split_whitespace().map(clean_token).find(|t| !t.is_empty())?;
    let amount = parse_amount(amount_token.trim_end_matches('.'))?;

    let tokens: Vec<&str> = head.split_whitespace().collect();
    let mut period = None;
    let mut label_tokens = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = clean_token(tokens[i]);
        if period.is_none() {
            if let Some(next) = tokens.get(i + 1) {
                if let Ok(p) = format!("{} {}", token, clean_token(next)).parse::<PeriodId>() {
                    if p.quarter.is_some() {
                        period = Some(p);
                        i += 2;
                        continue;
                    }
                }
            }
            if let Ok(p) = token.parse::<PeriodId>() {
                period = Some(p);
                i += 1;
                continue;
            }
        }
        label_tokens.push(tokens[i]);
        i += 1;
    }

    let label = strip_label(&label_tokens.join(" "));
    if !label.chars().any(char::is_alphabetic) {
        return None;
    }
    Some((label, period, amount))
}

fn nearest_column(columns: &[PeriodColumn], end: usize) -> usize {
    columns
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.end.abs_diff(end))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

impl TextExtractor {
    /// Text layer of a PDF file. Scanned pages without one come back empty.
    fn pdf_text(document: &SourceDocument) -> Result<String> {
        let bytes = document.bytes.as_slice();
        // pdf-extract panics on some malformed files instead of returning an error
        let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| FinancialHealthError::unreadable(&document.name, "malformed PDF"))?;
        let text = extracted
            .map_err(|e| FinancialHealthError::unreadable(&document.name, e.to_string()))?;
        if text.trim().is_empty() {
            return Err(FinancialHealthError::unreadable(
                &document.name,
                "PDF has no text layer",
            ));
        }
        Ok(text)
    }

    fn decode<'a>(&self, document: &'a SourceDocument) -> Result<Cow<'a, str>> {
        if document.bytes.starts_with(PDF_MAGIC) {
            return Self::pdf_text(document).map(Cow::Owned);
        }

        let text = std::str::from_utf8(&document.bytes).map_err(|_| {
            FinancialHealthError::unreadable(&document.name, "no decodable text layer")
        })?;
        let text = text.trim_start_matches('\u{feff}');

        let total = text.chars().count();
        if total > 0 {
            let control = text
                .chars()
                .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
                .count();
            if control as f64 / total as f64 > MAX_CONTROL_CHAR_RATIO {
                return Err(FinancialHealthError::unreadable(
                    &document.name,
                    "text layer is mostly control characters",
                ));
            }
        }
        Ok(Cow::Borrowed(text))
    }
}

impl LineItemExtractor for TextExtractor {
    fn modality(&self) -> Modality {
        Modality::Text
    }

    fn extract_items(
        &self,
        document: &SourceDocument,
        context: &ExtractionContext,
    ) -> Result<Vec<RawLineItem>> {
        let text = self.decode(document)?;

        let mut items = Vec::new();
        let mut columns: Vec<PeriodColumn> = Vec::new();
        let mut ordinal = 0u64;

        let mut push = |label: &str,
                        amount: &ParsedAmount,
                        period: PeriodId,
                        line: usize,
                        column: usize,
                        confidence: ExtractionConfidence| {
            items.push(RawLineItem {
                label: label.to_string(),
                value: amount.value,
                period,
                unit: amount
                    .unit
                    .clone()
                    .unwrap_or_else(|| context.default_unit.clone()),
                source: SourceLocation {
                    document: document.name.clone(),
                    locator: Locator::Line { line, column },
                    confidence: if amount.heuristic {
                        confidence.lowered()
                    } else {
                        confidence
                    },
                    ordinal,
                },
            });
            ordinal += 1;
        };

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let segs = segments(line);
            if segs.is_empty() {
                continue;
            }

            if let Some(found) = header_columns(&segs, !columns.is_empty()) {
                debug!(
                    "Line {} of '{}' defines {} period column(s)",
                    line_no,
                    document.name,
                    found.len()
                );
                columns = found;
                continue;
            }

            if line.contains(':') {
                if let Some((label, period, amount)) = read_inline(line) {
                    let period = period
                        .or_else(|| (columns.len() == 1).then(|| columns[0].period))
                        .or(context.default_period);
                    if let Some(period) = period {
                        push(&label, &amount, period, line_no, 0, ExtractionConfidence::Low);
                    }
                    continue;
                }
            }

            let Some(reading) = read_data_line(&segs) else {
                continue;
            };
            if reading.amounts.is_empty() || !reading.label.chars().any(char::is_alphabetic) {
                continue;
            }

            if columns.is_empty() {
                if let (Some(period), [(amount, end)]) =
                    (context.default_period, reading.amounts.as_slice())
                {
                    push(&reading.label, amount, period, line_no, *end, ExtractionConfidence::Low);
                }
                continue;
            }

            if reading.amounts.len() == columns.len() {
                let confidence = if reading.loose {
                    ExtractionConfidence::Low
                } else {
                    ExtractionConfidence::Medium
                };
                for ((amount, end), column) in reading.amounts.iter().zip(columns.iter()) {
                    push(&reading.label, amount, column.period, line_no, *end, confidence);
                }
                continue;
            }

            // Count mismatch: place each number under its nearest header, keeping only the
            // closest number per column.
            let mut placed: Vec<Option<(usize, usize)>> = vec![None; columns.len()];
            for (amount_idx, (_, end)) in reading.amounts.iter().enumerate() {
                let col = nearest_column(&columns, *end);
                let distance = columns[col].end.abs_diff(*end);
                match placed[col] {
                    Some((_, best)) if best <= distance => {}
                    _ => placed[col] = Some((amount_idx, distance)),
                }
            }
            for (col, slot) in placed.iter().enumerate() {
                if let Some((amount_idx, _)) = slot {
                    let (amount, end) = &reading.amounts[*amount_idx];
                    push(
                        &reading.label,
                        amount,
                        columns[col].period,
                        line_no,
                        *end,
                        ExtractionConfidence::Low,
                    );
                }
            }
        }

        Ok(items)
    }
}
