//! `accord-store`: SQLite persistence for the reconciliation engine.
//!
//! Implements the `accord-recon` storage seams: canonical entities with a
//! per-type unique code, an append-only audit log enforced by triggers, and
//! the runtime denylist with its version counter.

mod schema;
mod sqlite;

pub use sqlite::{SqliteStore, DEFAULT_BUSY_TIMEOUT};
