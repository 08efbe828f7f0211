// SQLite-backed canonical store

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use accord_core::{CanonicalEntity, EntityId, EntityType, MutationAction, MutationRecord};
use accord_recon::normalize::fold_key;
use accord_recon::{
    AuditLog, AuditWriteError, CanonicalStore, Denylist, DenylistSource, RowError, StoreError,
    WriteScope,
};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::schema;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTITY_COLUMNS: &str = "id, entity_type, code, name, name_key, attributes";
const AUDIT_COLUMNS: &str = "seq, run_id, entity_type, entity_id, action, before_json, after_json, actor, recorded_at, source_row";

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn classify(err: rusqlite::Error, busy_timeout: Duration) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Timeout(busy_timeout),
            ErrorCode::ConstraintViolation => {
                StoreError::Constraint(message.clone().unwrap_or_else(|| err.to_string()))
            }
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure
            | ErrorCode::PermissionDenied => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {what} in store: {err}"))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

struct EntityRow {
    id: String,
    entity_type: String,
    code: Option<String>,
    name: String,
    name_key: String,
    attributes: String,
}

impl EntityRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            code: row.get(2)?,
            name: row.get(3)?,
            name_key: row.get(4)?,
            attributes: row.get(5)?,
        })
    }

    fn into_entity(self) -> Result<CanonicalEntity, StoreError> {
        Ok(CanonicalEntity {
            id: EntityId::from_str(&self.id).map_err(|e| corrupt("entity id", e))?,
            entity_type: self
                .entity_type
                .parse()
                .map_err(|e| corrupt("entity type", e))?,
            code: self.code,
            name: self.name,
            name_key: self.name_key,
            attributes: serde_json::from_str(&self.attributes)
                .map_err(|e| corrupt("entity attributes", e))?,
        })
    }
}

struct AuditRow {
    seq: i64,
    run_id: String,
    entity_type: String,
    entity_id: String,
    action: String,
    before: Option<String>,
    after: String,
    actor: String,
    recorded_at: String,
    source_row: Option<i64>,
}

impl AuditRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            run_id: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            action: row.get(4)?,
            before: row.get(5)?,
            after: row.get(6)?,
            actor: row.get(7)?,
            recorded_at: row.get(8)?,
            source_row: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<MutationRecord, StoreError> {
        let before = match self.before {
            Some(json) => Some(serde_json::from_str(&json).map_err(|e| corrupt("audit before image", e))?),
            None => None,
        };
        Ok(MutationRecord {
            sequence: Some(self.seq as u64),
            run_id: self.run_id,
            entity_type: self
                .entity_type
                .parse()
                .map_err(|e| corrupt("audit entity type", e))?,
            entity_id: EntityId::from_str(&self.entity_id).map_err(|e| corrupt("audit entity id", e))?,
            action: MutationAction::parse(&self.action)
                .ok_or_else(|| corrupt("audit action", &self.action))?,
            before,
            after: serde_json::from_str(&self.after).map_err(|e| corrupt("audit after image", e))?,
            actor: self.actor,
            timestamp: DateTime::parse_from_rfc3339(&self.recorded_at)
                .map_err(|e| corrupt("audit timestamp", e))?
                .with_timezone(&Utc),
            source_row: self.source_row.map(|r| r as usize),
        })
    }
}

// ---------------------------------------------------------------------------
// Write scope
// ---------------------------------------------------------------------------

struct SqliteScope<'a> {
    conn: &'a Connection,
    busy_timeout: Duration,
}

impl WriteScope for SqliteScope<'_> {
    fn insert(&mut self, entity: &CanonicalEntity) -> Result<(), StoreError> {
        let attributes = serde_json::to_string(&entity.attributes).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO entities (id, entity_type, code, name, name_key, attributes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entity.id.to_string(),
                    entity.entity_type.as_str(),
                    entity.code,
                    entity.name,
                    entity.name_key,
                    attributes
                ],
            )
            .map_err(|e| classify(e, self.busy_timeout))?;
        Ok(())
    }

    fn update(&mut self, id: EntityId, entity: &CanonicalEntity) -> Result<(), StoreError> {
        if entity.id != id {
            return Err(StoreError::Constraint(format!(
                "entity id {} cannot replace {id}",
                entity.id
            )));
        }
        let attributes = serde_json::to_string(&entity.attributes).map_err(|e| StoreError::Backend(e.to_string()))?;
        let changed = self
            .conn
            .execute(
                "UPDATE entities
                 SET entity_type = ?2, code = ?3, name = ?4, name_key = ?5, attributes = ?6
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    entity.entity_type.as_str(),
                    entity.code,
                    entity.name,
                    entity.name_key,
                    attributes
                ],
            )
            .map_err(|e| classify(e, self.busy_timeout))?;
        if changed == 0 {
            return Err(StoreError::Constraint(format!("entity {id} does not exist")));
        }
        Ok(())
    }

    fn append(&mut self, record: &MutationRecord) -> Result<(), AuditWriteError> {
        let before = record
            .before
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AuditWriteError(e.to_string()))?;
        let after = serde_json::to_string(&record.after).map_err(|e| AuditWriteError(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO audit_log
                 (run_id, entity_type, entity_id, action, before_json, after_json, actor, recorded_at, source_row)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.run_id,
                    record.entity_type.as_str(),
                    record.entity_id.to_string(),
                    record.action.as_str(),
                    before,
                    after,
                    record.actor,
                    format_timestamp(&record.timestamp),
                    record.source_row.map(|r| r as i64)
                ],
            )
            .map_err(|e| AuditWriteError(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Canonical entities, audit log and denylist in one SQLite database.
///
/// One connection behind a mutex; every write unit is an `IMMEDIATE`
/// transaction, so concurrent processes wait up to the busy timeout.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database at `path`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("cannot open {}: {e}", path.display())))?;
        let store = Self::init(conn, busy_timeout)?;
        info!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::init(conn, DEFAULT_BUSY_TIMEOUT)
    }

    fn init(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        let map = |e| classify(e, busy_timeout);
        conn.busy_timeout(busy_timeout).map_err(map)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(map)?;
        schema::migrate(&conn).map_err(map)?;
        Ok(Self {
            conn: Mutex::new(conn),
            busy_timeout,
        })
    }

    fn err(&self) -> impl Fn(rusqlite::Error) -> StoreError {
        let busy_timeout = self.busy_timeout;
        move |e| classify(e, busy_timeout)
    }

    fn query_entities(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<CanonicalEntity>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(self.err())?;
        let rows = stmt
            .query_map(params, EntityRow::read)
            .map_err(self.err())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(self.err())?;
        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    fn query_audit(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<MutationRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(self.err())?;
        let rows = stmt
            .query_map(params, AuditRow::read)
            .map_err(self.err())?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(self.err())?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }

    /// Every stored entity, optionally of one type, ordered by id.
    pub fn entities(&self, entity_type: Option<EntityType>) -> Result<Vec<CanonicalEntity>, StoreError> {
        match entity_type {
            Some(t) => self.query_entities(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_type = ?1 ORDER BY id"),
                params![t.as_str()],
            ),
            None => self.query_entities(&format!("SELECT {ENTITY_COLUMNS} FROM entities ORDER BY id"), []),
        }
    }

    pub fn count_entities(&self, entity_type: EntityType) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE entity_type = ?1",
                params![entity_type.as_str()],
                |row| row.get(0),
            )
            .map_err(self.err())?;
        Ok(count as usize)
    }

    // -----------------------------------------------------------------------
    // Denylist administration
    // -----------------------------------------------------------------------

    pub fn denylist_version(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        self.read_denylist_version(&conn)
    }

    fn read_denylist_version(&self, conn: &Connection) -> Result<u32, StoreError> {
        let raw = schema::meta_value(conn, "denylist_version").map_err(self.err())?;
        match raw {
            Some(v) => v.parse().map_err(|e| corrupt("denylist version", e)),
            None => Ok(0),
        }
    }

    /// Entries in display form, ordered by folded name.
    pub fn denylist_entries(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        self.read_denylist_entries(&conn)
    }

    fn read_denylist_entries(&self, conn: &Connection) -> Result<Vec<String>, StoreError> {
        let mut stmt = conn
            .prepare("SELECT name FROM denylist ORDER BY name_key")
            .map_err(self.err())?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(self.err())?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(self.err())?;
        Ok(names)
    }

    /// Add `name`. Returns false when its folded form is already listed.
    pub fn add_denylist(&self, name: &str) -> Result<bool, StoreError> {
        let key = fold_key(name);
        if key.is_empty() {
            return Err(StoreError::Constraint("denylist entry must not be empty".into()));
        }
        self.change_denylist(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO denylist (name_key, name, added_at) VALUES (?1, ?2, ?3)",
                params![key, name.trim(), format_timestamp(&Utc::now())],
            )
        })
    }

    /// Remove `name` (matched by folded form). Returns false when absent.
    pub fn remove_denylist(&self, name: &str) -> Result<bool, StoreError> {
        let key = fold_key(name);
        self.change_denylist(|conn| conn.execute("DELETE FROM denylist WHERE name_key = ?1", params![key]))
    }

    /// Apply one denylist edit and bump the list version when it changed anything.
    fn change_denylist(
        &self,
        edit: impl FnOnce(&Connection) -> rusqlite::Result<usize>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.err())?;
        let changed = edit(&tx).map_err(self.err())? > 0;
        if changed {
            tx.execute(
                "UPDATE meta SET value = CAST(value AS INTEGER) + 1 WHERE key = 'denylist_version'",
                [],
            )
            .map_err(self.err())?;
        }
        tx.commit().map_err(self.err())?;
        debug!(changed, "denylist edited");
        Ok(changed)
    }
}

impl CanonicalStore for SqliteStore {
    fn find_by_code(&self, entity_type: EntityType, code: &str) -> Result<Option<CanonicalEntity>, StoreError> {
        let mut found = self.query_entities(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_type = ?1 AND code = ?2"),
            params![entity_type.as_str(), code],
        )?;
        Ok(found.pop())
    }

    fn find_by_name(&self, entity_type: EntityType, name_key: &str) -> Result<Vec<CanonicalEntity>, StoreError> {
        self.query_entities(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_type = ?1 AND name_key = ?2 ORDER BY id"),
            params![entity_type.as_str(), name_key],
        )
    }

    fn get(&self, id: EntityId) -> Result<Option<CanonicalEntity>, StoreError> {
        let mut found = self.query_entities(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1"),
            params![id.to_string()],
        )?;
        Ok(found.pop())
    }

    fn atomically(
        &self,
        unit: &mut dyn FnMut(&mut dyn WriteScope) -> Result<(), RowError>,
    ) -> Result<(), RowError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(self.err())?;
        let mut scope = SqliteScope {
            conn: &*tx,
            busy_timeout: self.busy_timeout,
        };
        // Dropping an uncommitted transaction rolls it back
        unit(&mut scope)?;
        tx.commit().map_err(self.err())?;
        Ok(())
    }
}

impl AuditLog for SqliteStore {
    fn query_by_entity(&self, id: EntityId) -> Result<Vec<MutationRecord>, StoreError> {
        self.query_audit(
            &format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE entity_id = ?1 ORDER BY seq"),
            params![id.to_string()],
        )
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<MutationRecord>, StoreError> {
        self.query_audit(
            &format!(
                "SELECT {AUDIT_COLUMNS} FROM
                 (SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY seq DESC LIMIT ?1)
                 ORDER BY seq"
            ),
            params![limit as i64],
        )
    }

    fn query_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MutationRecord>, StoreError> {
        self.query_audit(
            &format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE recorded_at >= ?1 ORDER BY seq LIMIT ?2"),
            params![format_timestamp(&since), limit as i64],
        )
    }
}

impl DenylistSource for SqliteStore {
    fn load_denylist(&self) -> Result<Denylist, StoreError> {
        // One lock so the version always describes the entries read with it.
        let conn = self.conn.lock();
        let version = self.read_denylist_version(&conn)?;
        let entries = self.read_denylist_entries(&conn)?;
        Ok(Denylist::new(version, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn company(code: Option<&str>, name: &str) -> CanonicalEntity {
        CanonicalEntity {
            id: EntityId::new(),
            entity_type: EntityType::Company,
            code: code.map(str::to_string),
            name: name.to_string(),
            name_key: fold_key(name),
            attributes: BTreeMap::from([("city".to_string(), "Bursa".to_string())]),
        }
    }

    fn insert_record(entity: &CanonicalEntity, source_row: usize) -> MutationRecord {
        MutationRecord {
            sequence: None,
            run_id: "run-1".into(),
            entity_type: entity.entity_type,
            entity_id: entity.id,
            action: MutationAction::Insert,
            before: None,
            after: entity.clone(),
            actor: "tester".into(),
            timestamp: Utc::now(),
            source_row: Some(source_row),
        }
    }

    fn insert(store: &SqliteStore, entity: &CanonicalEntity, source_row: usize) -> Result<(), RowError> {
        let record = insert_record(entity, source_row);
        store.atomically(&mut |scope| {
            scope.insert(entity)?;
            scope.append(&record)?;
            Ok(())
        })
    }

    #[test]
    fn entities_round_trip_through_lookups() {
        let store = SqliteStore::open_in_memory().unwrap();
        let acme = company(Some("C100"), "Acme Ltd");
        insert(&store, &acme, 2).unwrap();

        assert_eq!(store.find_by_code(EntityType::Company, "C100").unwrap(), Some(acme.clone()));
        assert_eq!(store.find_by_code(EntityType::Person, "C100").unwrap(), None);
        assert_eq!(store.find_by_name(EntityType::Company, "acme ltd").unwrap(), vec![acme.clone()]);
        assert_eq!(store.get(acme.id).unwrap(), Some(acme));
        assert_eq!(store.count_entities(EntityType::Company).unwrap(), 1);
    }

    #[test]
    fn duplicate_code_rolls_back_the_unit() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, &company(Some("C1"), "Alpha"), 2).unwrap();

        let err = insert(&store, &company(Some("C1"), "Beta"), 3).unwrap_err();
        assert!(matches!(err, RowError::Store(StoreError::Constraint(_))));
        assert_eq!(store.count_entities(EntityType::Company).unwrap(), 1);
        assert_eq!(store.query_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn uncoded_entities_may_share_names() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, &company(None, "Acme"), 2).unwrap();
        insert(&store, &company(None, "ACME"), 3).unwrap();
        assert_eq!(store.find_by_name(EntityType::Company, "acme").unwrap().len(), 2);
    }

    #[test]
    fn failed_audit_append_discards_the_entity() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER reject_row_99 BEFORE INSERT ON audit_log
                 WHEN NEW.source_row = 99
                 BEGIN SELECT RAISE(FAIL, 'audit log full'); END;",
            )
            .unwrap();

        let entity = company(Some("C9"), "Gamma");
        let err = insert(&store, &entity, 99).unwrap_err();
        assert!(matches!(err, RowError::Audit(_)));
        assert_eq!(store.get(entity.id).unwrap(), None);
        assert!(store.query_by_entity(entity.id).unwrap().is_empty());
    }

    #[test]
    fn audit_log_rejects_update_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        insert(&store, &company(Some("C1"), "Alpha"), 2).unwrap();

        let conn = store.conn.lock();
        let update = conn.execute("UPDATE audit_log SET actor = 'mallory'", []);
        assert!(update.unwrap_err().to_string().contains("append-only"));
        let delete = conn.execute("DELETE FROM audit_log", []);
        assert!(delete.unwrap_err().to_string().contains("append-only"));
    }

    #[test]
    fn update_keeps_before_image_in_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        let before = company(Some("C1"), "Alpha");
        insert(&store, &before, 2).unwrap();

        let mut after = before.clone();
        after.name = "Alpha Holding".into();
        after.name_key = fold_key(&after.name);
        let record = MutationRecord {
            action: MutationAction::Update,
            before: Some(before.clone()),
            after: after.clone(),
            ..insert_record(&after, 3)
        };
        store
            .atomically(&mut |scope| {
                scope.update(before.id, &after)?;
                scope.append(&record)?;
                Ok(())
            })
            .unwrap();

        let history = store.query_by_entity(before.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, Some(1));
        assert_eq!(history[1].action, MutationAction::Update);
        assert_eq!(history[1].before.as_ref(), Some(&before));
        assert_eq!(history[1].after, after);
        assert_eq!(history[1].source_row, Some(3));
        assert_eq!(store.get(before.id).unwrap().unwrap().name, "Alpha Holding");
    }

    #[test]
    fn update_of_missing_entity_is_a_constraint_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ghost = company(Some("C7"), "Ghost");
        let err = store
            .atomically(&mut |scope| {
                scope.update(ghost.id, &ghost)?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, RowError::Store(StoreError::Constraint(_))));
    }

    #[test]
    fn recent_and_since_queries_are_oldest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let start = Utc::now();
        for (i, code) in ["C1", "C2", "C3", "C4"].into_iter().enumerate() {
            insert(&store, &company(Some(code), code), i + 2).unwrap();
        }

        let recent = store.query_recent(2).unwrap();
        let seqs: Vec<u64> = recent.iter().filter_map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![3, 4]);

        let since = store.query_since(start, 3).unwrap();
        let seqs: Vec<u64> = since.iter().filter_map(|r| r.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let future = store.query_since(Utc::now() + chrono::Duration::hours(1), 10).unwrap();
        assert!(future.is_empty());
    }

    #[test]
    fn denylist_edits_bump_the_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.denylist_version().unwrap(), 0);

        assert!(store.add_denylist("Bay").unwrap());
        assert!(store.add_denylist("Test Firması").unwrap());
        assert!(!store.add_denylist("  BAY ").unwrap());
        assert_eq!(store.denylist_version().unwrap(), 2);

        let list = store.load_denylist().unwrap();
        assert_eq!(list.version(), 2);
        assert!(list.contains("bay"));
        assert!(list.contains("test firmasi"));

        assert!(store.remove_denylist("bay").unwrap());
        assert!(!store.remove_denylist("bay").unwrap());
        assert_eq!(store.denylist_version().unwrap(), 3);
        assert_eq!(store.denylist_entries().unwrap(), vec!["Test Firması".to_string()]);
    }

    #[test]
    fn loaded_denylist_version_matches_its_entries_under_concurrent_adds() {
        let store = SqliteStore::open_in_memory().unwrap();
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..50 {
                    assert!(store.add_denylist(&format!("Firma {i}")).unwrap());
                }
            });
            for _ in 0..50 {
                let list = store.load_denylist().unwrap();
                assert_eq!(list.version() as usize, list.len());
            }
        });
        let list = store.load_denylist().unwrap();
        assert_eq!(list.version(), 50);
        assert_eq!(list.len(), 50);
    }

    #[test]
    fn empty_denylist_entry_is_refused() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(store.add_denylist("   "), Err(StoreError::Constraint(_))));
    }

    #[test]
    fn reopening_keeps_data_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accord.db");
        let entity = company(Some("C1"), "Alpha");
        {
            let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            insert(&store, &entity, 2).unwrap();
            store.add_denylist("Bay").unwrap();
        }
        let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(store.get(entity.id).unwrap(), Some(entity));
        assert_eq!(store.denylist_version().unwrap(), 1);
        let conn = store.conn.lock();
        assert_eq!(
            schema::meta_value(&conn, "schema_version").unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/accord.db");
        let err = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn locked_database_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accord.db");
        let holder = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        let waiter = SqliteStore::open(&path, Duration::from_millis(50)).unwrap();

        let conn = holder.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE").unwrap();

        let err = insert(&waiter, &company(Some("C1"), "Alpha"), 2).unwrap_err();
        assert_eq!(err, RowError::Store(StoreError::Timeout(Duration::from_millis(50))));

        conn.execute_batch("ROLLBACK").unwrap();
        drop(conn);
        insert(&waiter, &company(Some("C1"), "Alpha"), 2).unwrap();
    }
}
