use std::time::Duration;

/// Canonical store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// An operation waited longer than the store's busy timeout.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    /// A uniqueness or integrity constraint rejected the write.
    #[error("store constraint violated: {0}")]
    Constraint(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// The audit log rejected an append.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit write failed: {0}")]
pub struct AuditWriteError(pub String);

/// A row that cannot become a candidate after normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowValidationError {
    #[error("missing required field '{field}'")]
    Missing { field: String },
    #[error("invalid value for '{field}': '{raw}'")]
    Invalid { field: String, raw: String },
}

/// Failure confined to one row. Recorded as `failed`; the run continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error(transparent)]
    Validation(#[from] RowValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditWriteError),
}

/// Profile parse or validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("profile parse error: {0}")]
    Parse(String),
    #[error("profile validation error: {0}")]
    Invalid(String),
}

/// Failure that aborts a whole run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The store became unreachable while resolving. `committed` rows were
    /// already written before the failure.
    #[error("entity resolution unavailable at row {row}: {reason} ({committed} row(s) already committed)")]
    ResolutionUnavailable {
        row: usize,
        reason: String,
        committed: usize,
    },
    #[error("cannot load denylist: {0}")]
    Denylist(StoreError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("cannot start worker pool: {0}")]
    Pool(String),
}
