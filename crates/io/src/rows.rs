//! Turns positional rows into named `RawRow`s once the header is known.

use std::collections::VecDeque;

use accord_core::{CellValue, RawRow};

use crate::header::{scan_for_header, HeaderScan, HeaderSet, HEADER_SCAN_LIMIT};
use crate::SourceError;

/// A positional row as a format adapter produced it: 1-based index and cells.
pub(crate) type Positional = (usize, Vec<CellValue>);

const POSITIONAL_WARNING: &str = "no header line found; columns mapped by position";

/// Lazily maps positional rows to named rows.
pub(crate) struct Headered<I> {
    inner: I,
    headers: Vec<String>,
    pending: VecDeque<Positional>,
    positional: bool,
}

impl<I> Headered<I>
where
    I: Iterator<Item = Result<Positional, SourceError>>,
{
    /// Read ahead up to the scan window and locate the header row.
    ///
    /// With `positional_fallback` a source without a header maps columns in
    /// the expected order instead of failing.
    pub(crate) fn new(
        mut inner: I,
        expected: &HeaderSet,
        positional_fallback: bool,
    ) -> Result<Self, SourceError> {
        let mut window: Vec<Positional> = Vec::new();
        while window.len() < HEADER_SCAN_LIMIT {
            match inner.next() {
                Some(row) => {
                    let row = row?;
                    if !row.1.iter().all(CellValue::is_blank) {
                        window.push(row);
                    }
                }
                None => break,
            }
        }

        let texts: Vec<Vec<String>> = window
            .iter()
            .map(|(_, cells)| cells.iter().map(|c| c.to_text().trim().to_string()).collect())
            .collect();

        match scan_for_header(&texts, expected) {
            HeaderScan::Found(pos) => {
                let headers = texts[pos].clone();
                let pending = window.into_iter().skip(pos + 1).collect();
                Ok(Self {
                    inner,
                    headers,
                    pending,
                    positional: false,
                })
            }
            HeaderScan::NotFound { missing } => {
                if positional_fallback && !expected.is_empty() && !window.is_empty() {
                    let headers = expected
                        .columns
                        .iter()
                        .map(|c| c.positional_name().to_string())
                        .collect();
                    tracing::warn!(
                        missing = ?missing,
                        "no header row found, falling back to positional mapping"
                    );
                    Ok(Self {
                        inner,
                        headers,
                        pending: window.into(),
                        positional: true,
                    })
                } else {
                    Err(SourceError::Schema { missing })
                }
            }
        }
    }

    fn build(&self, (index, cells): Positional) -> RawRow {
        let mut row = RawRow::new(index);
        let width = self.headers.len().max(cells.len());
        let mut cells = cells.into_iter();
        for col in 0..width {
            let value = cells.next().unwrap_or(CellValue::Empty);
            match self.headers.get(col).filter(|h| !h.is_empty()) {
                Some(name) => row.push(name.clone(), value),
                None if value.is_blank() => {}
                None => row.push(format!("column {}", col + 1), value),
            }
        }
        if self.positional {
            row.warnings.push(POSITIONAL_WARNING.to_string());
        }
        row
    }
}

impl<I> Iterator for Headered<I>
where
    I: Iterator<Item = Result<Positional, SourceError>>,
{
    type Item = Result<RawRow, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = match self.pending.pop_front() {
                Some(row) => row,
                None => match self.inner.next()? {
                    Ok(row) => row,
                    Err(e) => return Some(Err(e)),
                },
            };
            if next.1.iter().all(CellValue::is_blank) {
                continue;
            }
            return Some(Ok(self.build(next)));
        }
    }
}
