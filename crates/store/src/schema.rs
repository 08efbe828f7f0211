// Store schema: canonical entities, the append-only audit log and the denylist

use rusqlite::{params, Connection};

pub(crate) const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    code TEXT,                     -- unique per entity_type when present
    name TEXT NOT NULL,
    name_key TEXT NOT NULL,
    attributes TEXT NOT NULL       -- JSON object of canonical strings
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_entities_code
    ON entities (entity_type, code) WHERE code IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_entities_name
    ON entities (entity_type, name_key);

CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action TEXT NOT NULL,
    before_json TEXT,
    after_json TEXT NOT NULL,
    actor TEXT NOT NULL,
    recorded_at TEXT NOT NULL,     -- RFC 3339, UTC, microseconds
    source_row INTEGER
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log (entity_id, seq);
CREATE INDEX IF NOT EXISTS idx_audit_time ON audit_log (recorded_at, seq);

CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
  SELECT RAISE(FAIL, 'audit_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
  SELECT RAISE(FAIL, 'audit_log is append-only');
END;

CREATE TABLE IF NOT EXISTS denylist (
    name_key TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    added_at TEXT NOT NULL
);
"#;

/// Create missing tables and seed the meta rows. Safe to run on every open.
pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('denylist_version', '0')",
        [],
    )?;
    Ok(())
}

pub(crate) fn meta_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
