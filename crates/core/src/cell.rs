use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// A raw cell as a source reader surfaced it. No normalization applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// Build a text cell, mapping the empty string to `Empty`.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }

    /// True for `Empty` and for whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render the cell as text the way a spreadsheet would display it.
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                // Integers without decimals
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Convert a spreadsheet serial number (1900 date system) to a calendar date.
///
/// Serial 60 is the phantom 1900-02-29; serials below 61 are shifted by one so
/// that 1 maps to 1900-01-01.
pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= 2_958_466.0 {
        return None;
    }
    let days = serial.floor() as i64;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let adjusted = if days < 61 { days + 1 } else { days };
    epoch.checked_add_signed(Duration::days(adjusted))
}

/// Header lookup key: trimmed, whitespace-collapsed, lowercased.
pub fn header_key(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One row from a source, keyed by source column name.
///
/// `index` is 1-based and matches the row number an operator sees when the
/// source is opened in its native viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub index: usize,
    pub cells: Vec<(String, CellValue)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RawRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            cells: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_cell(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.cells.push((column.into(), value));
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    /// Look up a cell by column name, ignoring case and surrounding whitespace.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        let key = header_key(column);
        self.cells
            .iter()
            .find(|(name, _)| header_key(name) == key)
            .map(|(_, value)| value)
    }

    /// True when every cell is blank.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_blank())
    }
}
