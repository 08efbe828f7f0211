//! Storage seams. The engine only talks to these traits.

use accord_core::{CanonicalEntity, EntityId, EntityType, MutationRecord};
use chrono::{DateTime, Utc};

use crate::error::{AuditWriteError, RowError, StoreError};
use crate::resolve::Denylist;

/// Writes staged inside one atomic unit.
pub trait WriteScope {
    fn insert(&mut self, entity: &CanonicalEntity) -> Result<(), StoreError>;
    fn update(&mut self, id: EntityId, entity: &CanonicalEntity) -> Result<(), StoreError>;
    fn append(&mut self, record: &MutationRecord) -> Result<(), AuditWriteError>;
}

/// Canonical entity store.
///
/// Reads reflect every unit committed before them, including units committed
/// earlier in the same run.
pub trait CanonicalStore: Send + Sync {
    fn find_by_code(
        &self,
        entity_type: EntityType,
        code: &str,
    ) -> Result<Option<CanonicalEntity>, StoreError>;

    /// Entities of `entity_type` whose folded name equals `name_key`.
    fn find_by_name(
        &self,
        entity_type: EntityType,
        name_key: &str,
    ) -> Result<Vec<CanonicalEntity>, StoreError>;

    fn get(&self, id: EntityId) -> Result<Option<CanonicalEntity>, StoreError>;

    /// Run `unit` as one all-or-nothing unit. When `unit` fails nothing it
    /// staged persists.
    fn atomically(
        &self,
        unit: &mut dyn FnMut(&mut dyn WriteScope) -> Result<(), RowError>,
    ) -> Result<(), RowError>;
}

/// Read side of the append-only audit log. Results are in append order.
pub trait AuditLog: Send + Sync {
    fn query_by_entity(&self, id: EntityId) -> Result<Vec<MutationRecord>, StoreError>;
    /// The `limit` most recent records, oldest first.
    fn query_recent(&self, limit: usize) -> Result<Vec<MutationRecord>, StoreError>;
    /// Records at or after `since`, oldest first, at most `limit`.
    fn query_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MutationRecord>, StoreError>;
}

/// Runtime-editable known-bad names.
pub trait DenylistSource: Send + Sync {
    fn load_denylist(&self) -> Result<Denylist, StoreError>;
}
