use accord_core::{CanonicalEntity, MutationAction, MutationRecord};
use chrono::Utc;

use crate::error::AuditWriteError;
use crate::store::WriteScope;

/// Builds mutation records for one run and appends them inside a write scope.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    run_id: String,
    actor: String,
}

impl AuditRecorder {
    pub fn new(run_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            actor: actor.into(),
        }
    }

    pub fn insert(&self, after: &CanonicalEntity, source_row: usize) -> MutationRecord {
        self.record(MutationAction::Insert, None, after, source_row)
    }

    pub fn update(&self, before: &CanonicalEntity, after: &CanonicalEntity, source_row: usize) -> MutationRecord {
        self.record(MutationAction::Update, Some(before.clone()), after, source_row)
    }

    fn record(
        &self,
        action: MutationAction,
        before: Option<CanonicalEntity>,
        after: &CanonicalEntity,
        source_row: usize,
    ) -> MutationRecord {
        MutationRecord {
            sequence: None,
            run_id: self.run_id.clone(),
            entity_type: after.entity_type,
            entity_id: after.id,
            action,
            before,
            after: after.clone(),
            actor: self.actor.clone(),
            timestamp: Utc::now(),
            source_row: Some(source_row),
        }
    }

    /// Append within the caller's atomic unit; a failure here rolls the unit back.
    pub fn append(&self, scope: &mut dyn WriteScope, record: &MutationRecord) -> Result<(), AuditWriteError> {
        scope.append(record)?;
        tracing::debug!(
            run_id = %self.run_id,
            entity_id = %record.entity_id,
            action = %record.action,
            "audit record appended"
        );
        Ok(())
    }
}
