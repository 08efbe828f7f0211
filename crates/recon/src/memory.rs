//! In-memory store used by tests and dry runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use accord_core::{CanonicalEntity, EntityId, EntityType, MutationRecord};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::{AuditWriteError, RowError, StoreError};
use crate::resolve::Denylist;
use crate::store::{AuditLog, CanonicalStore, DenylistSource, WriteScope};

type AuditFault = Box<dyn Fn(&MutationRecord) -> bool + Send + Sync>;

#[derive(Default)]
struct State {
    entities: BTreeMap<EntityId, CanonicalEntity>,
    audit: Vec<MutationRecord>,
    denylist: Vec<String>,
    denylist_version: u32,
}

impl State {
    fn code_taken(&self, entity: &CanonicalEntity, staged: &[Staged]) -> bool {
        let Some(code) = entity.code.as_deref() else {
            return false;
        };
        let clash = |other: &CanonicalEntity| {
            other.id != entity.id
                && other.entity_type == entity.entity_type
                && other.code.as_deref() == Some(code)
        };
        self.entities.values().any(clash)
            || staged.iter().any(|s| match s {
                Staged::Put(e) => clash(e),
                Staged::Append(_) => false,
            })
    }
}

enum Staged {
    Put(CanonicalEntity),
    Append(MutationRecord),
}

struct MemoryScope<'a> {
    state: &'a State,
    staged: Vec<Staged>,
    audit_fault: Option<&'a AuditFault>,
}

impl WriteScope for MemoryScope<'_> {
    fn insert(&mut self, entity: &CanonicalEntity) -> Result<(), StoreError> {
        if self.state.entities.contains_key(&entity.id) {
            return Err(StoreError::Constraint(format!("entity {} already exists", entity.id)));
        }
        if self.state.code_taken(entity, &self.staged) {
            return Err(StoreError::Constraint(format!(
                "{} code {} already exists",
                entity.entity_type,
                entity.code.as_deref().unwrap_or_default()
            )));
        }
        self.staged.push(Staged::Put(entity.clone()));
        Ok(())
    }

    fn update(&mut self, id: EntityId, entity: &CanonicalEntity) -> Result<(), StoreError> {
        if !self.state.entities.contains_key(&id) || entity.id != id {
            return Err(StoreError::Constraint(format!("entity {id} does not exist")));
        }
        if self.state.code_taken(entity, &self.staged) {
            return Err(StoreError::Constraint(format!(
                "{} code {} already exists",
                entity.entity_type,
                entity.code.as_deref().unwrap_or_default()
            )));
        }
        self.staged.push(Staged::Put(entity.clone()));
        Ok(())
    }

    fn append(&mut self, record: &MutationRecord) -> Result<(), AuditWriteError> {
        if self.audit_fault.is_some_and(|fault| fault(record)) {
            return Err(AuditWriteError("audit log rejected the append".into()));
        }
        self.staged.push(Staged::Append(record.clone()));
        Ok(())
    }
}

/// Thread-safe in-memory canonical store and audit log.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    audit_fault: Mutex<Option<AuditFault>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = CanonicalEntity>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write();
            for e in entities {
                state.entities.insert(e.id, e);
            }
        }
        store
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make audit appends fail for records matching `fault`.
    pub fn set_audit_fault(&self, fault: impl Fn(&MutationRecord) -> bool + Send + Sync + 'static) {
        *self.audit_fault.lock() = Some(Box::new(fault));
    }

    pub fn clear_audit_fault(&self) {
        *self.audit_fault.lock() = None;
    }

    pub fn set_denylist(&self, version: u32, entries: impl IntoIterator<Item = String>) {
        let mut state = self.state.write();
        state.denylist = entries.into_iter().collect();
        state.denylist_version = version;
    }

    pub fn entities(&self) -> Vec<CanonicalEntity> {
        self.state.read().entities.values().cloned().collect()
    }

    pub fn entity_count(&self, entity_type: EntityType) -> usize {
        self.state
            .read()
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .count()
    }

    pub fn audit_records(&self) -> Vec<MutationRecord> {
        self.state.read().audit.clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store switched off".into()))
        } else {
            Ok(())
        }
    }
}

impl CanonicalStore for MemoryStore {
    fn find_by_code(&self, entity_type: EntityType, code: &str) -> Result<Option<CanonicalEntity>, StoreError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .entities
            .values()
            .find(|e| e.entity_type == entity_type && e.code.as_deref() == Some(code))
            .cloned())
    }

    fn find_by_name(&self, entity_type: EntityType, name_key: &str) -> Result<Vec<CanonicalEntity>, StoreError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type && e.name_key == name_key)
            .cloned()
            .collect())
    }

    fn get(&self, id: EntityId) -> Result<Option<CanonicalEntity>, StoreError> {
        self.check()?;
        Ok(self.state.read().entities.get(&id).cloned())
    }

    fn atomically(
        &self,
        unit: &mut dyn FnMut(&mut dyn WriteScope) -> Result<(), RowError>,
    ) -> Result<(), RowError> {
        self.check()?;
        let fault = self.audit_fault.lock();
        let mut state = self.state.write();

        let mut scope = MemoryScope {
            state: &*state,
            staged: Vec::new(),
            audit_fault: fault.as_ref(),
        };
        unit(&mut scope)?;
        let staged = scope.staged;

        for op in staged {
            match op {
                Staged::Put(entity) => {
                    state.entities.insert(entity.id, entity);
                }
                Staged::Append(mut record) => {
                    record.sequence = Some(state.audit.len() as u64 + 1);
                    state.audit.push(record);
                }
            }
        }
        Ok(())
    }
}

impl AuditLog for MemoryStore {
    fn query_by_entity(&self, id: EntityId) -> Result<Vec<MutationRecord>, StoreError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .audit
            .iter()
            .filter(|r| r.entity_id == id)
            .cloned()
            .collect())
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<MutationRecord>, StoreError> {
        self.check()?;
        let state = self.state.read();
        let skip = state.audit.len().saturating_sub(limit);
        Ok(state.audit[skip..].to_vec())
    }

    fn query_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MutationRecord>, StoreError> {
        self.check()?;
        Ok(self
            .state
            .read()
            .audit
            .iter()
            .filter(|r| r.timestamp >= since)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl DenylistSource for MemoryStore {
    fn load_denylist(&self) -> Result<Denylist, StoreError> {
        self.check()?;
        let state = self.state.read();
        Ok(Denylist::new(state.denylist_version, &state.denylist))
    }
}
