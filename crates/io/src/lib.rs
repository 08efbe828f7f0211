// Source readers: byte streams in, raw rows out

pub mod delimited;
pub mod document;
mod error;
pub mod header;
mod rows;
pub mod workbook;

use std::io::Read;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use accord_core::RawRow;

pub use error::SourceError;
pub use header::{ExpectedColumn, HeaderSet, HEADER_SCAN_LIMIT};

/// Lazy sequence of rows in source order. Read failures surface as items.
pub type RowIter = Box<dyn Iterator<Item = Result<RawRow, SourceError>> + Send>;

/// Source container formats, one reader each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Delimited,
    Workbook,
    Document,
}

impl SourceKind {
    /// Infer the kind from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "tab" | "psv" => Some(Self::Delimited),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Self::Workbook),
            "txt" | "text" | "prn" => Some(Self::Document),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delimited" | "csv" => Some(Self::Delimited),
            "workbook" | "xlsx" => Some(Self::Workbook),
            "document" | "text" => Some(Self::Document),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delimited => "delimited",
            Self::Workbook => "workbook",
            Self::Document => "document",
        }
    }
}

/// Per-source reading options.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Headers the header row must carry.
    pub expected: HeaderSet,
    /// Workbook sheet to read; the first non-empty sheet when unset.
    pub sheet: Option<String>,
    /// Declared delimiter; sniffed when unset.
    pub delimiter: Option<u8>,
}

/// Open a source of the given kind.
///
/// Header detection runs eagerly, so schema failures surface here before any
/// row is yielded.
pub fn open_source(kind: SourceKind, bytes: Vec<u8>, options: &ReadOptions) -> Result<RowIter, SourceError> {
    match kind {
        SourceKind::Delimited => delimited::read(bytes, &options.expected, options.delimiter),
        SourceKind::Workbook => workbook::read(bytes, &options.expected, options.sheet.as_deref()),
        SourceKind::Document => document::read(bytes, &options.expected),
    }
}

/// Drain `reader` on a helper thread, failing once `timeout` elapses.
///
/// A reader stuck past the deadline is abandoned; its thread ends when the
/// underlying read returns.
pub fn read_with_timeout<R>(mut reader: R, timeout: Duration) -> Result<Vec<u8>, SourceError>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("accord-source-read".into())
        .spawn(move || {
            let mut bytes = Vec::new();
            let result = reader.read_to_end(&mut bytes).map(|_| bytes);
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result?),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SourceError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SourceError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "source reader thread ended without a result",
        ))),
    }
}

/// Content digest of a source, recorded in the ingestion report.
pub fn source_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
