//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 60-69   | ingest           | Ingestion outcomes and failures          |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input file, unreadable settings.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Ingest (60-69)
// =============================================================================

/// Run completed but at least one row failed (validation, constraint, audit).
pub const EXIT_INGEST_FAILED_ROWS: u8 = 60;

/// Run completed with ambiguous rows that need a human decision.
/// Failed rows take precedence.
pub const EXIT_INGEST_AMBIGUOUS: u8 = 61;

/// Source could not be read: corrupt file, missing headers, read timeout.
pub const EXIT_INGEST_SOURCE: u8 = 62;

/// Canonical store unreachable (open failure, or lost mid-run).
pub const EXIT_INGEST_STORE_UNAVAILABLE: u8 = 63;

/// Ingestion profile failed to parse or validate.
pub const EXIT_INGEST_INVALID_PROFILE: u8 = 64;

/// Run interrupted (SIGINT); committed rows stay committed.
pub const EXIT_INGEST_CANCELLED: u8 = 65;
