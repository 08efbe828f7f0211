//! Entity resolution: decide whether a record is already known.

use std::collections::BTreeSet;

use accord_core::{CanonicalEntity, EntityId};
use serde::Serialize;

use crate::candidate::EntityRecord;
use crate::error::StoreError;
use crate::normalize::fold_key;
use crate::store::CanonicalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Code,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    Denylisted { name: String, list_version: u32 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Denylisted { name, list_version } => {
                write!(f, "name '{name}' is on the denylist (version {list_version})")
            }
        }
    }
}

/// The four resolution outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Matched { id: EntityId, rule: MatchRule },
    /// A reserved id. Nothing has been written.
    Created(EntityId),
    /// Every candidate id, sorted. Never auto-picked.
    Ambiguous(Vec<EntityId>),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    /// The matched entity as read during resolution.
    pub existing: Option<CanonicalEntity>,
}

// ---------------------------------------------------------------------------
// Denylist
// ---------------------------------------------------------------------------

/// Versioned set of folded names that must never become entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denylist {
    version: u32,
    entries: BTreeSet<String>,
}

impl Denylist {
    pub fn new<I, S>(version: u32, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self {
            version,
            entries: BTreeSet::new(),
        };
        list.extend(entries);
        list
    }

    /// Add names; they are folded the same way candidate names are.
    pub fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            let key = fold_key(entry.as_ref());
            if !key.is_empty() {
                self.entries.insert(key);
            }
        }
    }

    pub fn contains(&self, name_key: &str) -> bool {
        self.entries.contains(name_key)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Read-only matcher over a store and a fixed denylist.
pub struct Resolver<'a> {
    store: &'a dyn CanonicalStore,
    denylist: &'a Denylist,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn CanonicalStore, denylist: &'a Denylist) -> Self {
        Self { store, denylist }
    }

    /// Apply the rules in priority order: code, then folded name, then the
    /// denylist, then a fresh id.
    pub fn resolve(&self, record: &EntityRecord) -> Result<Resolution, StoreError> {
        if let Some(code) = record.code.as_deref() {
            if let Some(existing) = self.store.find_by_code(record.entity_type, code)? {
                return Ok(Resolution {
                    outcome: ResolutionOutcome::Matched {
                        id: existing.id,
                        rule: MatchRule::Code,
                    },
                    existing: Some(existing),
                });
            }
        }

        let mut hits = self
            .store
            .find_by_name(record.entity_type, &record.name.key)?;
        if record.code.is_some() {
            // An entity carrying a different code is a different entity
            hits.retain(|e| e.code.is_none());
        }
        match hits.len() {
            0 => {}
            1 => {
                let existing = hits.remove(0);
                return Ok(Resolution {
                    outcome: ResolutionOutcome::Matched {
                        id: existing.id,
                        rule: MatchRule::Name,
                    },
                    existing: Some(existing),
                });
            }
            _ => {
                let mut ids: Vec<EntityId> = hits.iter().map(|e| e.id).collect();
                ids.sort();
                return Ok(Resolution {
                    outcome: ResolutionOutcome::Ambiguous(ids),
                    existing: None,
                });
            }
        }

        if self.denylist.contains(&record.name.key) {
            return Ok(Resolution {
                outcome: ResolutionOutcome::Rejected(RejectReason::Denylisted {
                    name: record.name.display.clone(),
                    list_version: self.denylist.version(),
                }),
                existing: None,
            });
        }

        Ok(Resolution {
            outcome: ResolutionOutcome::Created(EntityId::new()),
            existing: None,
        })
    }
}
