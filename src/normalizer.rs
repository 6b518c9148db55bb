//! Turns the raw, header-ambiguous rows of a scrape into a typed dataset.
//!
//! Every step is total: malformed input degrades to missing values or
//! positional column names, never to an error.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::extractor::RawDataset;

pub const HEADER_KEYWORDS: &[&str] = &[
    "contract", "stock", "symbol", "buyer", "seller", "quantity", "rate", "amount",
];

pub const FALLBACK_COLUMNS: [&str; 8] = [
    "SN",
    "Contract No.",
    "Stock Symbol",
    "Buyer",
    "Seller",
    "Quantity",
    "Rate (Rs)",
    "Amount (Rs)",
];

pub const NUMERIC_COLUMNS: &[&str] = &["Rate (Rs)", "Amount (Rs)", "Quantity"];

const CURRENCY_MARKER: &str = "Rs";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Missing,
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
            CellValue::Missing => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Plain decimal text, no thousands separators; missing values are empty.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnNaming {
    /// Names taken from a detected header row.
    Header,
    /// No header, exactly eight columns: the fixed floor sheet names.
    Fallback,
    /// No header and an unexpected width: `"0"`, `"1"`, ...
    Positional,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRow {
    pub index: usize,
    pub values: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedDataset {
    columns: Vec<String>,
    naming: ColumnNaming,
    rows: Vec<CleanedRow>,
}

impl CleanedDataset {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn naming(&self) -> ColumnNaming {
        self.naming
    }

    pub fn rows(&self) -> &[CleanedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in the row at `index`.
    pub fn get(&self, index: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(index)?.values.get(col)
    }
}

/// A raw row widened to the dataset width; `None` marks padding.
type PaddedRow = Vec<Option<String>>;

pub fn normalize(raw: RawDataset) -> CleanedDataset {
    let width = raw.iter().map(Vec::len).max().unwrap_or(0);
    let padded: Vec<PaddedRow> = raw
        .into_iter()
        .map(|row| {
            let mut cells: PaddedRow = row.into_iter().map(Some).collect();
            cells.resize(width, None);
            cells
        })
        .collect();

    let mut rows = dedup_rows(padded);

    let has_header = rows.first().is_some_and(|first| is_header_row(first));

    let (columns, naming) = if has_header {
        let names: Vec<String> = rows
            .remove(0)
            .into_iter()
            .enumerate()
            .map(|(i, cell)| cell.unwrap_or_else(|| i.to_string()))
            .collect();
        (names, ColumnNaming::Header)
    } else if width == FALLBACK_COLUMNS.len() {
        (
            FALLBACK_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ColumnNaming::Fallback,
        )
    } else {
        if width > 0 {
            log::warn!(
                "Expected {} columns, but got {}",
                FALLBACK_COLUMNS.len(),
                width
            );
        }
        ((0..width).map(|i| i.to_string()).collect(), ColumnNaming::Positional)
    };

    let numeric: Vec<bool> = columns
        .iter()
        .map(|name| naming != ColumnNaming::Positional && NUMERIC_COLUMNS.contains(&name.as_str()))
        .collect();

    let rows: Vec<CleanedRow> = rows
        .into_iter()
        .map(|cells| {
            cells
                .into_iter()
                .zip(&numeric)
                .map(|(cell, &is_numeric)| match (cell, is_numeric) {
                    (Some(text), true) => coerce_number(&text).map_or(CellValue::Missing, CellValue::Number),
                    (None, _) => CellValue::Missing,
                    (Some(text), false) => CellValue::Text(text),
                })
                .collect::<Vec<_>>()
        })
        .filter(|values| !values.iter().all(CellValue::is_blank))
        .enumerate()
        .map(|(index, values)| CleanedRow { index, values })
        .collect();

    log::info!(
        "Data cleaned. Final shape: ({}, {})",
        rows.len(),
        columns.len()
    );

    CleanedDataset {
        columns,
        naming,
        rows,
    }
}

/// Drops exact duplicates, keeping the first occurrence in place.
pub fn dedup_rows<T: Clone + Eq + std::hash::Hash>(rows: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}

/// Case-insensitive keyword match over the joined cell texts.
pub fn is_header_row<S: AsRef<str>>(cells: &[Option<S>]) -> bool {
    let joined = cells
        .iter()
        .map(|c| c.as_ref().map(|s| s.as_ref().to_lowercase()).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ");
    HEADER_KEYWORDS.iter().any(|kw| joined.contains(kw))
}

/// Strips thousands separators and the currency marker, then parses.
/// Anything that is not a finite decimal becomes `None`.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "").replace(CURRENCY_MARKER, "");
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn header() -> Vec<String> {
        row(&FALLBACK_COLUMNS)
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header_row(&[Some("Contract No."), Some("Stock Symbol"), Some("Buyer")]));
        assert!(is_header_row(&[Some("SN"), Some("QUANTITY")]));
        assert!(!is_header_row(&[Some("1"), Some("ABC123"), Some("XYZ")]));
        assert!(!is_header_row::<&str>(&[None, None]));
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number("1,234.50"), Some(1234.5));
        assert_eq!(coerce_number(" Rs 250.50 "), Some(250.5));
        assert_eq!(coerce_number("100"), Some(100.0));
        assert_eq!(coerce_number("N/A"), None);
        assert_eq!(coerce_number(""), None);
        assert_eq!(coerce_number("NaN"), None);
        assert_eq!(coerce_number("inf"), None);
    }

    #[test]
    fn test_dedup_idempotent() {
        let rows = vec![row(&["a"]), row(&["b"]), row(&["a"]), row(&["c"]), row(&["b"])];
        let once = dedup_rows(rows);
        assert_eq!(once, vec![row(&["a"]), row(&["b"]), row(&["c"])]);
        assert_eq!(dedup_rows(once.clone()), once);
    }

    #[test]
    fn test_fallback_naming() {
        let raw = vec![row(&["1", "C1", "ALBSL", "B1", "S1", "100", "250.50", "25050.00"])];
        let dataset = normalize(raw);

        assert_eq!(dataset.naming(), ColumnNaming::Fallback);
        assert_eq!(dataset.columns(), header().as_slice());
        assert_eq!(dataset.get(0, "Rate (Rs)").and_then(CellValue::as_number), Some(250.50));
        assert_eq!(dataset.get(0, "Amount (Rs)").and_then(CellValue::as_number), Some(25050.00));
        assert_eq!(dataset.get(0, "Quantity").and_then(CellValue::as_number), Some(100.0));
        assert_eq!(dataset.get(0, "Stock Symbol"), Some(&CellValue::Text("ALBSL".into())));
    }

    #[test]
    fn test_header_row_names_columns() {
        let raw = vec![
            header(),
            row(&["1", "C1", "NABIL", "42", "58", "1,000", "1,234.50", "N/A"]),
            header(),
        ];
        let dataset = normalize(raw);

        assert_eq!(dataset.naming(), ColumnNaming::Header);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.get(0, "Quantity").and_then(CellValue::as_number), Some(1000.0));
        assert_eq!(dataset.get(0, "Rate (Rs)").and_then(CellValue::as_number), Some(1234.5));
        assert_eq!(dataset.get(0, "Amount (Rs)"), Some(&CellValue::Missing));
    }

    #[test]
    fn test_unexpected_width_stays_positional() {
        let raw = vec![row(&["1", "2", "1,000"]), row(&["3", "4", "5"])];
        let dataset = normalize(raw);

        assert_eq!(dataset.naming(), ColumnNaming::Positional);
        assert_eq!(dataset.columns(), &["0", "1", "2"]);
        assert_eq!(dataset.get(0, "2"), Some(&CellValue::Text("1,000".into())));
    }

    #[test]
    fn test_empty_rows_removed_and_index_reset() {
        let raw = vec![
            header(),
            row(&["", "", "", "", "", "", "", ""]),
            row(&["1", "C1", "NABIL", "42", "58", "10", "500", "5,000"]),
            row(&["", " ", "", "", "", "N/A", "-", ""]),
            row(&["2", "C2", "NABIL", "42", "58", "20", "500", "10,000"]),
        ];
        let dataset = normalize(raw);

        assert_eq!(dataset.len(), 2);
        let indexes: Vec<usize> = dataset.rows().iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert!(dataset.rows().iter().all(|r| !r.values.iter().all(CellValue::is_blank)));
    }

    #[test]
    fn test_ragged_rows_padded() {
        let raw = vec![
            row(&["Contract No.", "Stock Symbol", "Quantity"]),
            row(&["C1", "NABIL"]),
            row(&["C1", "NABIL", ""]),
        ];
        let dataset = normalize(raw);

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0, "Quantity"), Some(&CellValue::Missing));
        assert_eq!(dataset.get(1, "Quantity"), Some(&CellValue::Missing));
    }

    #[test]
    fn test_empty_input() {
        let dataset = normalize(Vec::new());
        assert!(dataset.is_empty());
        assert!(dataset.columns().is_empty());
    }

    #[test]
    fn test_three_page_scenario() {
        let mut raw = vec![header()];
        for n in 1..=23 {
            let serial = n.to_string();
            let contract = format!("C{n}");
            raw.push(row(&[&serial, &contract, "NABIL", "42", "58", "10", "500", "5,000"]));
        }
        assert_eq!(raw.len(), 24);

        let dataset = normalize(raw);
        assert_eq!(dataset.len(), 23);
        assert_eq!(dataset.columns(), header().as_slice());
        assert_eq!(dataset.rows().last().map(|r| r.index), Some(22));
    }

    #[test]
    fn test_display_plain_decimal() {
        assert_eq!(CellValue::Number(1234.5).to_string(), "1234.5");
        assert_eq!(CellValue::Number(25050.0).to_string(), "25050");
        assert_eq!(CellValue::Missing.to_string(), "");
    }
}
