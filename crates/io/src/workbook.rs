// Workbook sources (xlsx, xls, xlsb, ods) via calamine

use std::io::Cursor;

use accord_core::cell::date_from_serial;
use accord_core::CellValue;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::NaiveDate;

use crate::header::HeaderSet;
use crate::rows::{Headered, Positional};
use crate::{RowIter, SourceError};

/// Open a workbook and read one sheet: `sheet` if named, otherwise the first
/// sheet that holds any data.
pub fn read(bytes: Vec<u8>, expected: &HeaderSet, sheet: Option<&str>) -> Result<RowIter, SourceError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    if sheet_names.is_empty() {
        return Err(SourceError::Format("workbook contains no sheets".to_string()));
    }

    let range = match sheet {
        Some(name) => {
            if !sheet_names.iter().any(|s| s == name) {
                return Err(SourceError::Format(format!(
                    "sheet '{}' not found (available: {})",
                    name,
                    sheet_names.join(", ")
                )));
            }
            workbook
                .worksheet_range(name)
                .map_err(|e| SourceError::Format(format!("failed to read sheet '{}': {}", name, e)))?
        }
        None => {
            let mut chosen = None;
            for name in &sheet_names {
                let range = workbook
                    .worksheet_range(name)
                    .map_err(|e| SourceError::Format(format!("failed to read sheet '{}': {}", name, e)))?;
                if !range.is_empty() {
                    tracing::debug!(sheet = %name, "using first non-empty sheet");
                    chosen = Some(range);
                    break;
                }
            }
            chosen.ok_or_else(|| SourceError::Schema {
                missing: expected
                    .columns
                    .iter()
                    .filter(|c| c.required)
                    .map(|c| c.field.clone())
                    .collect(),
            })?
        }
    };

    Ok(Box::new(Headered::new(SheetRows::new(range), expected, false)?))
}

/// Owned row cursor over a calamine range.
struct SheetRows {
    range: Range<Data>,
    start_row: usize,
    next: usize,
    height: usize,
    width: usize,
}

impl SheetRows {
    fn new(range: Range<Data>) -> Self {
        let (height, width) = range.get_size();
        let start_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
        Self {
            range,
            start_row,
            next: 0,
            height,
            width,
        }
    }
}

impl Iterator for SheetRows {
    type Item = Result<Positional, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.height {
            return None;
        }
        let rel = self.next;
        self.next += 1;

        // Columns left of the used range are not represented; headers are
        // matched by name so the offset does not matter.
        let cells = (0..self.width)
            .map(|col| self.range.get((rel, col)).map(cell_value).unwrap_or(CellValue::Empty))
            .collect();
        Some(Ok((self.start_row + rel + 1, cells)))
    }
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
        Data::DateTime(dt) => {
            // Assumes the 1900 date system
            let serial = dt.as_f64();
            match date_from_serial(serial) {
                Some(date) => CellValue::Date(date),
                None => CellValue::Number(serial),
            }
        }
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::text(s.clone())),
        Data::DurationIso(s) => CellValue::text(s.clone()),
    }
}
