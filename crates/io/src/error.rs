use std::time::Duration;

/// Failures raised while opening or reading a source. All are fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The container cannot be opened or is corrupt.
    #[error("source format error: {0}")]
    Format(String),
    /// No row within the scan window carries the expected headers.
    #[error("source schema error: no header row contains {}", .missing.join(", "))]
    Schema { missing: Vec<String> },
    /// Reading the byte stream did not finish in time.
    #[error("source read timed out after {0:?}")]
    Timeout(Duration),
    #[error("source IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for SourceError {
    fn from(err: csv::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<calamine::Error> for SourceError {
    fn from(err: calamine::Error) -> Self {
        Self::Format(format!("cannot open workbook: {err}"))
    }
}
