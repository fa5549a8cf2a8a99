use super::{ExtractionContext, LineItemExtractor};
use crate::error::{FinancialHealthError, Result};
use crate::schema::{
    ExtractionConfidence, Locator, Modality, PeriodId, RawLineItem, SourceDocument,
    SourceLocation,
};
use crate::utils::{parse_amount, ParsedAmount};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use log::debug;
use std::io::Cursor;

const PERIOD_HEADERS: [&str; 6] = ["period", "year", "fiscal_year", "fiscal year", "fy", "date"];

/// Zip container (xlsx, ods) and OLE compound file (xls) signatures.
const WORKBOOK_MAGIC: [&[u8]; 2] = [b"PK\x03\x04", b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1"];

/// Reads CSV/TSV exports and spreadsheet workbooks.
pub struct TabularExtractor;

#[derive(Debug, PartialEq)]
enum Layout {
    /// Labels down the first column, one column per period
    PeriodColumns(Vec<(usize, PeriodId)>),
    /// One column per account, periods named in a dedicated column
    AccountColumns { period_column: usize },
    /// One column per account, no period information; rows are summed
    AccountColumnsSummed,
}

/// A header row and the data rows beneath it, as cell text.
#[derive(Debug, Default)]
struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Grid {
    fn cell<'a>(row: &'a [String], column: usize) -> Option<&'a str> {
        row.get(column).map(String::as_str)
    }
}

fn detect_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let tabs = first_line.iter().filter(|b| **b == b'\t').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();

    if tabs > commas && tabs >= semicolons {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn detect_layout(headers: &[String]) -> Layout {
    let period_columns: Vec<(usize, PeriodId)> = headers
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, h)| h.parse::<PeriodId>().ok().map(|p| (idx, p)))
        .collect();

    let first_is_period = headers
        .first()
        .map(|h| h.parse::<PeriodId>().is_ok())
        .unwrap_or(false);

    if !period_columns.is_empty() && !first_is_period {
        return Layout::PeriodColumns(period_columns);
    }

    let period_column = headers
        .iter()
        .position(|h| PERIOD_HEADERS.contains(&h.trim().to_lowercase().as_str()));

    match period_column {
        Some(period_column) => Layout::AccountColumns { period_column },
        None => Layout::AccountColumnsSummed,
    }
}

fn is_workbook(bytes: &[u8]) -> bool {
    WORKBOOK_MAGIC.iter().any(|magic| bytes.starts_with(magic))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        // dates, booleans and error cells never hold amounts or period headings
        _ => String::new(),
    }
}

/// The first row with any content becomes the header row.
fn grid_from_range(range: &Range<Data>) -> Grid {
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>())
        .skip_while(|row| row.iter().all(String::is_empty));
    let headers = rows.next().unwrap_or_default();
    Grid {
        headers,
        rows: rows.collect(),
    }
}

impl TabularExtractor {
    fn read_delimited(document: &SourceDocument) -> Result<Grid> {
        if document.bytes.contains(&0) {
            return Err(FinancialHealthError::unreadable(
                &document.name,
                "binary content is neither a workbook nor a delimited text export",
            ));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(detect_delimiter(&document.bytes))
            .from_reader(document.bytes.as_slice());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| FinancialHealthError::unreadable(&document.name, e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<String>>()))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| FinancialHealthError::unreadable(&document.name, e.to_string()))?;

        Ok(Grid { headers, rows })
    }

    /// Reads the first worksheet that has any content.
    fn read_workbook(document: &SourceDocument) -> Result<Grid> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(document.bytes.clone()))
            .map_err(|e| FinancialHealthError::unreadable(&document.name, e.to_string()))?;

        for (sheet, range) in workbook.worksheets() {
            let grid = grid_from_range(&range);
            if !grid.headers.is_empty() {
                debug!("Reading sheet '{}' of '{}'", sheet, document.name);
                return Ok(grid);
            }
        }
        Ok(Grid::default())
    }

    fn item(
        document: &SourceDocument,
        context: &ExtractionContext,
        label: &str,
        raw_value: &str,
        period: PeriodId,
        locator: Locator,
        confidence: ExtractionConfidence,
        ordinal: u64,
    ) -> Option<RawLineItem> {
        let amount = parse_amount(raw_value)?;
        let confidence = if amount.heuristic {
            confidence.lowered()
        } else {
            confidence
        };
        Some(RawLineItem {
            label: label.trim().to_string(),
            value: amount.value,
            period,
            unit: amount.unit.unwrap_or_else(|| context.default_unit.clone()),
            source: SourceLocation {
                document: document.name.clone(),
                locator,
                confidence,
                ordinal,
            },
        })
    }

    fn extract_grid(
        document: &SourceDocument,
        context: &ExtractionContext,
        grid: &Grid,
    ) -> Result<Vec<RawLineItem>> {
        let Grid { headers, rows } = grid;
        if headers.iter().all(|h| h.is_empty()) {
            return Ok(Vec::new());
        }

        let layout = detect_layout(headers);
        debug!("Tabular layout for '{}': {:?}", document.name, layout);

        let mut items = Vec::new();
        let mut ordinal = 0u64;
        let mut next_ordinal = || {
            ordinal += 1;
            ordinal - 1
        };

        match layout {
            Layout::PeriodColumns(period_columns) => {
                for (row_idx, row) in rows.iter().enumerate() {
                    let label = Grid::cell(row, 0).unwrap_or_default();
                    if !label.chars().any(char::is_alphabetic) {
                        continue;
                    }
                    for (column, period) in &period_columns {
                        let Some(cell) = Grid::cell(row, *column) else {
                            continue;
                        };
                        if let Some(item) = Self::item(
                            document,
                            context,
                            label,
                            cell,
                            *period,
                            Locator::Cell {
                                row: row_idx,
                                column: *column,
                            },
                            ExtractionConfidence::High,
                            next_ordinal(),
                        ) {
                            items.push(item);
                        }
                    }
                }
            }
            Layout::AccountColumns { period_column } => {
                for (row_idx, row) in rows.iter().enumerate() {
                    let period = match Grid::cell(row, period_column).map(str::parse::<PeriodId>) {
                        Some(Ok(period)) => period,
                        _ => {
                            debug!(
                                "Skipping row {} of '{}': no readable period",
                                row_idx, document.name
                            );
                            continue;
                        }
                    };
                    for (column, header) in headers.iter().enumerate() {
                        if column == period_column || header.is_empty() {
                            continue;
                        }
                        let Some(cell) = Grid::cell(row, column) else {
                            continue;
                        };
                        if let Some(item) = Self::item(
                            document,
                            context,
                            header,
                            cell,
                            period,
                            Locator::Cell {
                                row: row_idx,
                                column,
                            },
                            ExtractionConfidence::High,
                            next_ordinal(),
                        ) {
                            items.push(item);
                        }
                    }
                }
            }
            Layout::AccountColumnsSummed => {
                let Some(period) = context.default_period else {
                    return Err(FinancialHealthError::unreadable(
                        &document.name,
                        "no period columns and no default period supplied",
                    ));
                };
                for (column, header) in headers.iter().enumerate() {
                    if header.is_empty() || !header.chars().any(char::is_alphabetic) {
                        continue;
                    }
                    let amounts: Vec<ParsedAmount> = rows
                        .iter()
                        .filter_map(|row| Grid::cell(row, column).and_then(parse_amount))
                        .collect();
                    let Some(first) = amounts.first() else {
                        continue;
                    };
                    let unit = first
                        .unit
                        .clone()
                        .unwrap_or_else(|| context.default_unit.clone());
                    let confidence = if amounts.iter().any(|a| a.heuristic) {
                        ExtractionConfidence::Low
                    } else {
                        ExtractionConfidence::Medium
                    };
                    items.push(RawLineItem {
                        label: header.to_string(),
                        value: amounts.iter().map(|a| a.value).sum(),
                        period,
                        unit,
                        source: SourceLocation {
                            document: document.name.clone(),
                            locator: Locator::Cell { row: 0, column },
                            confidence,
                            ordinal: next_ordinal(),
                        },
                    });
                }
            }
        }

        Ok(items)
    }
}

impl LineItemExtractor for TabularExtractor {
    fn modality(&self) -> Modality {
        Modality::Tabular
    }

    fn extract_items(
        &self,
        document: &SourceDocument,
        context: &ExtractionContext,
    ) -> Result<Vec<RawLineItem>> {
        let grid = if is_workbook(&document.bytes) {
            Self::read_workbook(document)?
        } else {
            Self::read_delimited(document)?
        };
        Self::extract_grid(document, context, &grid)
    }
}
