//! Upsert planning: what a matched or created record writes.

use accord_core::{CanonicalEntity, EntityId};
use serde::Serialize;

use crate::candidate::EntityRecord;

/// One field changed by an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

pub fn new_entity(id: EntityId, record: &EntityRecord) -> CanonicalEntity {
    CanonicalEntity {
        id,
        entity_type: record.entity_type,
        code: record.code.clone(),
        name: record.name.display.clone(),
        name_key: record.name.key.clone(),
        attributes: record.attributes.clone(),
    }
}

/// Diff `record` against `existing`. `None` means nothing to write.
///
/// Compared: the folded name, the code when the entity has none, and every
/// attribute the record carries. Attributes absent from the record are kept.
/// A spelling that folds to the stored key keeps the stored display name.
pub fn plan_update(existing: &CanonicalEntity, record: &EntityRecord) -> Option<(CanonicalEntity, Vec<FieldChange>)> {
    let mut after = existing.clone();
    let mut changes = Vec::new();

    if existing.name_key != record.name.key {
        changes.push(FieldChange {
            field: "name".into(),
            before: Some(existing.name.clone()),
            after: Some(record.name.display.clone()),
        });
        after.name = record.name.display.clone();
        after.name_key = record.name.key.clone();
    }

    if existing.code.is_none() && record.code.is_some() {
        changes.push(FieldChange {
            field: "code".into(),
            before: None,
            after: record.code.clone(),
        });
        after.code = record.code.clone();
    }

    for (key, value) in &record.attributes {
        let current = existing.attributes.get(key);
        if current != Some(value) {
            changes.push(FieldChange {
                field: key.clone(),
                before: current.cloned(),
                after: Some(value.clone()),
            });
            after.attributes.insert(key.clone(), value.clone());
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some((after, changes))
    }
}
