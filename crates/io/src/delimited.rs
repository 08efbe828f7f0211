// Delimited text sources (CSV, TSV, semicolon, pipe)

use accord_core::CellValue;

use crate::header::HeaderSet;
use crate::rows::{Headered, Positional};
use crate::{RowIter, SourceError};

/// Open a delimited source. The delimiter is sniffed unless `declared`.
pub fn read(bytes: Vec<u8>, expected: &HeaderSet, declared: Option<u8>) -> Result<RowIter, SourceError> {
    let content = decode(bytes);
    let delimiter = declared.unwrap_or_else(|| sniff_delimiter(&content));
    tracing::debug!(delimiter = %(delimiter as char).escape_default(), "reading delimited source");

    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(std::io::Cursor::new(content.into_bytes()));

    let records = reader.into_records().enumerate().map(|(idx, result)| {
        let record = result?;
        // The reader drops blank lines, so the index comes from the record position
        let index = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 1);
        let cells = record.iter().map(CellValue::text).collect();
        Ok::<Positional, SourceError>((index, cells))
    });

    Ok(Box::new(Headered::new(records, expected, false)?))
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Most common multi-field count; title lines above the header are single-field
        let Some(target) = modal_width(&counts) else {
            continue;
        };
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn modal_width(counts: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for &c in counts.iter().filter(|&&c| c > 1) {
        let freq = counts.iter().filter(|&&x| x == c).count();
        if best.map_or(true, |(bc, bf)| freq > bf || (freq == bf && c > bc)) {
            best = Some((c, freq));
        }
    }
    best.map(|(c, _)| c)
}

/// Decode source bytes, falling back to Windows-1252 (common for Excel-exported CSVs).
pub fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}
