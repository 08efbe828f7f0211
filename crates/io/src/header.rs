//! Header-row detection shared by every reader.

use accord_core::header_key;

/// How many leading non-empty rows are scanned for a header row.
pub const HEADER_SCAN_LIMIT: usize = 20;

/// A column the caller expects, known by a field name and its source aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedColumn {
    pub field: String,
    pub aliases: Vec<String>,
    pub required: bool,
}

impl ExpectedColumn {
    pub fn new(field: impl Into<String>, aliases: Vec<String>, required: bool) -> Self {
        Self {
            field: field.into(),
            aliases,
            required,
        }
    }

    /// True if `header` names this column (field name or any alias).
    pub fn matches(&self, header: &str) -> bool {
        let key = header_key(header);
        if key.is_empty() {
            return false;
        }
        header_key(&self.field) == key || self.aliases.iter().any(|a| header_key(a) == key)
    }

    /// The header name used when a row is mapped by position.
    pub fn positional_name(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or(&self.field)
    }
}

/// The header set a source must present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    pub columns: Vec<ExpectedColumn>,
}

impl HeaderSet {
    pub fn new(columns: Vec<ExpectedColumn>) -> Self {
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Required columns absent from `headers`.
    pub fn missing(&self, headers: &[String]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.required && !headers.iter().any(|h| c.matches(h)))
            .map(|c| c.field.clone())
            .collect()
    }

    /// Number of expected columns (required or not) present in `headers`.
    fn score(&self, headers: &[String]) -> usize {
        self.columns
            .iter()
            .filter(|c| headers.iter().any(|h| c.matches(h)))
            .count()
    }
}

/// Outcome of scanning candidate rows for a header.
#[derive(Debug)]
pub(crate) enum HeaderScan {
    /// Position (within the scanned rows) of the header row.
    Found(usize),
    /// No row qualified; `missing` is reported against the best-scoring row.
    NotFound { missing: Vec<String> },
}

/// Pick the first row that contains every required column.
///
/// With an empty header set the first row is the header.
pub(crate) fn scan_for_header(rows: &[Vec<String>], expected: &HeaderSet) -> HeaderScan {
    if rows.is_empty() {
        return HeaderScan::NotFound {
            missing: expected
                .columns
                .iter()
                .filter(|c| c.required)
                .map(|c| c.field.clone())
                .collect(),
        };
    }
    if expected.is_empty() {
        return HeaderScan::Found(0);
    }

    let mut best: Option<(usize, usize)> = None;
    for (pos, cells) in rows.iter().enumerate().take(HEADER_SCAN_LIMIT) {
        if expected.missing(cells).is_empty() && expected.score(cells) > 0 {
            return HeaderScan::Found(pos);
        }
        let score = expected.score(cells);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((pos, score));
        }
    }

    let best_row = best.map(|(pos, _)| rows[pos].as_slice()).unwrap_or(&[]);
    HeaderScan::NotFound {
        missing: expected.missing(best_row),
    }
}
