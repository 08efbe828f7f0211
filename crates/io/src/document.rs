//! Semi-structured documents: layout text such as a PDF text extraction.
//!
//! Each non-decorative line is one row. Fields are split on tabs, pipes, or
//! runs of two or more spaces, so single spaces inside a value survive.

use std::sync::OnceLock;

use accord_core::CellValue;
use regex::Regex;

use crate::delimited::decode;
use crate::header::HeaderSet;
use crate::rows::{Headered, Positional};
use crate::{RowIter, SourceError};

fn field_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\t|\s*\|\s*|\s{2,}").expect("valid regex"))
}

fn summary_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(sub\s*total|total|grand\s+total|ara\s+toplam|genel\s+toplam|toplam)\b")
            .expect("valid regex")
    })
}

/// Open a document source. Falls back to positional mapping when no line
/// carries the expected headers.
pub fn read(bytes: Vec<u8>, expected: &HeaderSet) -> Result<RowIter, SourceError> {
    let text = decode(bytes);
    let lines: Vec<Positional> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !is_decorative(line) && !summary_line().is_match(line))
        .map(|(idx, line)| (idx + 1, split_fields(line)))
        .filter(|(_, cells)| !cells.is_empty())
        .collect();

    tracing::debug!(lines = lines.len(), "reading document source");
    Ok(Box::new(Headered::new(lines.into_iter().map(Ok), expected, true)?))
}

/// Blank lines and rules made only of `-`, `=`, `_` (and spacing).
fn is_decorative(line: &str) -> bool {
    line.chars()
        .all(|c| c.is_whitespace() || matches!(c, '-' | '=' | '_' | '+' | '|'))
}

fn split_fields(line: &str) -> Vec<CellValue> {
    let trimmed = line.trim().trim_matches('|');
    if trimmed.trim().is_empty() {
        return Vec::new();
    }
    field_separator()
        .split(trimmed.trim())
        .map(|f| CellValue::text(f.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ExpectedColumn;
    use accord_core::RawRow;

    fn expected() -> HeaderSet {
        HeaderSet::new(vec![
            ExpectedColumn::new("product_code", vec!["Kod".into()], false),
            ExpectedColumn::new("description", vec!["Açıklama".into()], true),
            ExpectedColumn::new("quantity", vec!["Miktar".into()], true),
        ])
    }

    fn collect(text: &str) -> Vec<RawRow> {
        read(text.as_bytes().to_vec(), &expected())
            .unwrap()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn header_line_maps_by_name() {
        let text = "\
TEKLIF No: 2024-17
Kod      Açıklama            Miktar
-------  ------------------  ------
P-1      Vida M8 galvaniz    100
P-2 |    Somun M8       |    50
Toplam                       150
";
        let rows = collect(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 4);
        assert_eq!(rows[0].get("Açıklama"), Some(&CellValue::text("Vida M8 galvaniz")));
        assert_eq!(rows[1].get("miktar"), Some(&CellValue::text("50")));
        assert!(rows[0].warnings.is_empty());
    }

    #[test]
    fn positional_fallback_without_header() {
        let rows = collect("P-1\tVida M8\t100\n\n====\nP-2\tSomun\t50\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].index, 4);
        assert_eq!(rows[1].get("Miktar"), Some(&CellValue::text("50")));
        assert_eq!(rows[1].warnings.len(), 1);
    }

    #[test]
    fn empty_document_is_schema_error() {
        let err = read(b"-----\n\n".to_vec(), &expected()).err().unwrap();
        assert!(matches!(err, SourceError::Schema { .. }));
    }
}
