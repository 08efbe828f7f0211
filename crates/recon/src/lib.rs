//! `accord-recon`: normalization, entity resolution and reconciliation.
//!
//! Pure engine crate: receives rows already read from a source, resolves them
//! against a [`CanonicalStore`] and returns an [`IngestionReport`].
//! No CLI or IO dependencies.

pub mod audit;
pub mod candidate;
pub mod config;
pub mod engine;
pub mod error;
mod lanes;
pub mod memory;
pub mod normalize;
pub mod report;
pub mod resolve;
pub mod store;
pub mod upsert;

pub use candidate::{extract, Candidate, CandidateEntity, EntityRecord};
pub use config::{ColumnSpec, IngestProfile};
pub use engine::{run, CancelToken, IngestInput, RunOptions};
pub use error::{AuditWriteError, IngestError, ProfileError, RowError, RowValidationError, StoreError};
pub use memory::MemoryStore;
pub use report::{IngestionReport, RowDiagnostic, RowOutcome, RunStatus, SourceInfo};
pub use resolve::{Denylist, MatchRule, RejectReason, Resolution, ResolutionOutcome, Resolver};
pub use store::{AuditLog, CanonicalStore, DenylistSource, WriteScope};
