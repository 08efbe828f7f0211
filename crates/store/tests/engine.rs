use accord_core::{CellValue, EntityType, MutationAction, RawRow};
use accord_recon::{run, AuditLog, CanonicalStore, IngestInput, IngestProfile, RowOutcome, RunOptions, SourceInfo};
use accord_store::{SqliteStore, DEFAULT_BUSY_TIMEOUT};

const PROFILE: &str = r#"
name = "crm-companies"
entity = "company"

[columns]
code = "Kod"
name = "Unvan"
city = "Şehir"

[denylist]
entries = ["Bay"]
"#;

fn row(index: usize, code: &str, name: &str, city: &str) -> RawRow {
    RawRow::new(index)
        .with_cell("Kod", CellValue::text(code))
        .with_cell("Unvan", CellValue::text(name))
        .with_cell("Şehir", CellValue::text(city))
}

fn input(rows: Vec<RawRow>) -> IngestInput {
    IngestInput {
        source: SourceInfo {
            name: "companies.csv".into(),
            digest: Some("abc".into()),
        },
        rows,
    }
}

fn sample() -> Vec<RawRow> {
    vec![
        row(2, "C-100", "acme ltd", "İzmir"),
        row(3, "C-200", "Globex", "Ankara"),
        row(4, "", "Bay", ""),
    ]
}

#[test]
fn rerun_against_sqlite_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accord.db");
    let profile = IngestProfile::from_toml(PROFILE).unwrap();

    let first = {
        let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        run(&store, &profile, input(sample()), &RunOptions::default()).unwrap()
    };
    assert_eq!(first.summary.created, 2);
    assert_eq!(first.summary.rejected, 1);

    let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let second = run(&store, &profile, input(sample()), &RunOptions::default()).unwrap();
    assert_eq!(second.summary.skipped, 2);
    assert_eq!(second.summary.rejected, 1);
    assert_eq!(store.count_entities(EntityType::Company).unwrap(), 2);
    assert_eq!(store.query_recent(100).unwrap().len(), 2);
}

#[test]
fn updates_are_audited_with_before_images() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("accord.db"), DEFAULT_BUSY_TIMEOUT).unwrap();
    let profile = IngestProfile::from_toml(PROFILE).unwrap();
    let options = RunOptions {
        actor: "ops".into(),
        ..RunOptions::default()
    };

    run(&store, &profile, input(sample()), &options).unwrap();
    let report = run(
        &store,
        &profile,
        input(vec![row(2, "C-100", "Acme Ltd", "Izmir Merkez")]),
        &options,
    )
    .unwrap();

    let diag = &report.rows[0];
    assert_eq!(diag.outcome, RowOutcome::Updated);
    let id = diag.entity_id.unwrap();

    let history = store.query_by_entity(id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action, MutationAction::Update);
    assert_eq!(history[1].actor, "ops");
    assert_eq!(history[1].run_id, report.meta.run_id);
    assert_eq!(history[1].before.as_ref().unwrap().name, "acme ltd");
    assert_eq!(history[1].after.name, "Acme Ltd");

    let stored = store.get(id).unwrap().unwrap();
    assert_eq!(stored.attribute("city"), Some("Izmir Merkez"));
}

#[test]
fn runtime_denylist_applies_to_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("accord.db"), DEFAULT_BUSY_TIMEOUT).unwrap();
    let profile = IngestProfile::from_toml(PROFILE).unwrap();
    store.add_denylist("Test Firması").unwrap();

    let report = run(
        &store,
        &profile,
        input(vec![row(2, "", "TEST FIRMASI", ""), row(3, "C-1", "Real Co", "")]),
        &RunOptions::default(),
    )
    .unwrap();
    assert_eq!(report.rows[0].outcome, RowOutcome::Rejected);
    assert!(report.rows[0].message.as_deref().unwrap().contains("version 1"));
    assert_eq!(report.rows[1].outcome, RowOutcome::Created);
    assert_eq!(store.find_by_code(EntityType::Company, "C1").unwrap().unwrap().name, "Real Co");
}

#[test]
fn parallel_run_keeps_audit_sequence_dense() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("accord.db"), DEFAULT_BUSY_TIMEOUT).unwrap();
    let profile = IngestProfile::from_toml(PROFILE).unwrap();
    let rows = (0..60)
        .map(|i| row(i + 2, &format!("C{}", i % 6), &format!("Firm {}", i % 6), &format!("City {i}")))
        .collect();
    let options = RunOptions {
        workers: 4,
        ..RunOptions::default()
    };

    let report = run(&store, &profile, input(rows), &options).unwrap();
    assert_eq!(report.summary.created, 6);
    assert_eq!(report.summary.updated, 54);

    let seqs: Vec<u64> = store
        .query_recent(1000)
        .unwrap()
        .iter()
        .filter_map(|r| r.sequence)
        .collect();
    assert_eq!(seqs, (1..=60).collect::<Vec<u64>>());
}
