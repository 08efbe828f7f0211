//! `accord-core`: shared data model.
//!
//! Types that cross crate boundaries: raw rows produced by source readers,
//! canonical entities held by the store, and audit records.

pub mod cell;
pub mod entity;
pub mod mutation;

pub use cell::{header_key, CellValue, RawRow};
pub use entity::{CanonicalEntity, EntityId, EntityType, ParseEntityTypeError};
pub use mutation::{MutationAction, MutationRecord};
