use std::collections::BTreeMap;
use std::path::PathBuf;

use accord_core::{CanonicalEntity, CellValue, EntityId, EntityType, MutationAction, RawRow};
use accord_io::{open_source, ExpectedColumn, HeaderSet, ReadOptions, SourceKind};
use accord_recon::{
    run, AuditLog, CancelToken, CanonicalStore, Denylist, DenylistSource, IngestError, IngestInput,
    IngestProfile, IngestionReport, MemoryStore, RowError, RowOutcome, RunOptions, RunStatus,
    SourceInfo, StoreError,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_profile(name: &str) -> IngestProfile {
    let path = fixtures_dir().join(name);
    let toml = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    IngestProfile::from_toml(&toml).unwrap()
}

fn load_rows(profile: &IngestProfile, kind: SourceKind, file: &str) -> IngestInput {
    let path = fixtures_dir().join(file);
    let bytes = std::fs::read(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    let expected = HeaderSet::new(
        profile
            .column_specs()
            .into_iter()
            .map(|spec| ExpectedColumn::new(spec.field, spec.aliases, spec.required))
            .collect(),
    );
    let options = ReadOptions {
        expected,
        sheet: profile.source.sheet.clone(),
        delimiter: profile.source.delimiter_byte(),
    };
    let rows = open_source(kind, bytes, &options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    IngestInput {
        source: SourceInfo {
            name: file.to_string(),
            digest: None,
        },
        rows,
    }
}

fn ingest(store: &MemoryStore, profile: &IngestProfile, input: IngestInput) -> IngestionReport {
    run(store, profile, input, &RunOptions::default()).unwrap()
}

fn company(code: Option<&str>, name: &str) -> CanonicalEntity {
    CanonicalEntity {
        id: EntityId::new(),
        entity_type: EntityType::Company,
        code: code.map(str::to_string),
        name: name.to_string(),
        name_key: accord_recon::normalize::fold_key(name),
        attributes: BTreeMap::new(),
    }
}

fn company_row(index: usize, code: &str, name: &str, city: &str) -> RawRow {
    RawRow::new(index)
        .with_cell("Firma Kodu", CellValue::text(code))
        .with_cell("Firma Adı", CellValue::text(name))
        .with_cell("Şehir", CellValue::text(city))
}

fn input(rows: Vec<RawRow>) -> IngestInput {
    IngestInput {
        source: SourceInfo {
            name: "inline".into(),
            digest: None,
        },
        rows,
    }
}

// -------------------------------------------------------------------------
// Delimited source end to end
// -------------------------------------------------------------------------

#[test]
fn first_run_creates_and_rejects() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let report = ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "companies.csv"));

    assert_eq!(report.meta.status, RunStatus::Completed);
    assert_eq!(report.meta.entity_type, EntityType::Company);
    assert_eq!(report.summary.total_rows, 3);
    assert_eq!(report.summary.created, 2);
    assert_eq!(report.summary.rejected, 1);
    assert_eq!(report.summary.failed, 0);

    // Title line skipped; rows keep their source line numbers
    let indices: Vec<usize> = report.rows.iter().map(|r| r.row_index).collect();
    assert_eq!(indices, vec![3, 4, 5]);
    assert_eq!(report.rows[2].outcome, RowOutcome::Rejected);
    assert!(report.rows[2].message.as_deref().unwrap().contains("denylist"));

    let acme = store
        .find_by_code(EntityType::Company, "C100")
        .unwrap()
        .expect("C100 stored");
    assert_eq!(acme.name, "acme ltd");
    assert_eq!(acme.attributes.get("city").map(String::as_str), Some("İzmir"));
    assert_eq!(acme.attributes.get("email").map(String::as_str), Some("info@acme.com"));

    let audit = store.audit_records();
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|r| r.action == MutationAction::Insert));
    assert!(audit.iter().all(|r| r.run_id == report.meta.run_id));
    assert!(audit.iter().all(|r| r.actor == "accord"));
}

#[test]
fn second_run_over_same_source_changes_nothing() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "companies.csv"));
    let entities = store.entities();

    let report = ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "companies.csv"));
    assert_eq!(report.summary.created, 0);
    assert_eq!(report.summary.updated, 0);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.rejected, 1);
    assert_eq!(store.entities(), entities);
    assert_eq!(store.audit_records().len(), 2);
}

#[test]
fn case_variants_of_one_name_converge_on_rerun() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let rows = || {
        input(vec![
            company_row(2, "", "Acme Ltd", "İzmir"),
            company_row(3, "", "ACME LTD", "İzmir"),
        ])
    };

    let first = ingest(&store, &profile, rows());
    assert_eq!(first.summary.created, 1);
    assert_eq!(first.summary.skipped, 1);
    assert_eq!(store.audit_records().len(), 1);
    let entities = store.entities();

    for _ in 0..2 {
        let rerun = ingest(&store, &profile, rows());
        assert_eq!(rerun.summary.created, 0);
        assert_eq!(rerun.summary.updated, 0);
        assert_eq!(rerun.summary.skipped, 2);
        assert_eq!(store.audit_records().len(), 1);
        assert_eq!(store.entities(), entities);
    }
    assert_eq!(entities[0].name, "Acme Ltd");
}

#[test]
fn invalid_row_fails_alone() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let report = ingest(
        &store,
        &profile,
        load_rows(&profile, SourceKind::Delimited, "companies_one_bad.csv"),
    );

    assert_eq!(report.summary.created, 3);
    assert_eq!(report.summary.failed, 1);
    let failed = report
        .rows
        .iter()
        .find(|r| r.outcome == RowOutcome::Failed)
        .unwrap();
    assert_eq!(failed.row_index, 3);
    assert!(failed.message.as_deref().unwrap().contains("name"));
    assert!(failed.entity_id.is_none());
    assert_eq!(store.entity_count(EntityType::Company), 3);
    assert_eq!(store.audit_records().len(), 3);
}

// -------------------------------------------------------------------------
// Resolution rules
// -------------------------------------------------------------------------

#[test]
fn code_match_wins_over_name_match() {
    let profile = load_profile("companies.profile.toml");
    let coded = company(Some("C100"), "Acme Old Name");
    let same_name = company(None, "Acme Ltd");
    let store = MemoryStore::with_entities([coded.clone(), same_name.clone()]);

    let report = ingest(&store, &profile, input(vec![company_row(2, "c-100", "ACME LTD", "İzmir")]));
    let row = &report.rows[0];
    assert_eq!(row.outcome, RowOutcome::Updated);
    assert_eq!(row.entity_id, Some(coded.id));
    assert!(row.changes.iter().any(|c| c.field == "name"));

    let updated = store.get(coded.id).unwrap().unwrap();
    assert_eq!(updated.name, "ACME LTD");
    assert_eq!(store.get(same_name.id).unwrap().unwrap(), same_name);

    let history = store.query_by_entity(coded.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, MutationAction::Update);
    assert_eq!(history[0].before.as_ref().unwrap().name, "Acme Old Name");
    assert_eq!(history[0].source_row, Some(2));
}

#[test]
fn shared_name_is_ambiguous_and_untouched() {
    let profile = load_profile("companies.profile.toml");
    let a = company(None, "Acme");
    let b = company(None, "acme");
    let store = MemoryStore::with_entities([a.clone(), b.clone()]);

    let report = ingest(&store, &profile, input(vec![company_row(2, "C-9", "ACME", "Bursa")]));
    let row = &report.rows[0];
    assert_eq!(row.outcome, RowOutcome::Ambiguous);
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(row.candidates, expected);
    assert_eq!(report.summary.ambiguous, 1);
    assert_eq!(store.entity_count(EntityType::Company), 2);
    assert!(store.audit_records().is_empty());
}

#[test]
fn store_denylist_rejects_folded_names() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    store.set_denylist(3, vec!["Test Firması".to_string()]);

    let report = ingest(&store, &profile, input(vec![company_row(2, "", "TEST FIRMASI", "")]));
    assert_eq!(report.rows[0].outcome, RowOutcome::Rejected);
    assert!(report.rows[0].message.as_deref().unwrap().contains("version 3"));
    assert_eq!(store.entity_count(EntityType::Company), 0);
}

#[test]
fn existing_name_is_matched_before_denylist() {
    let profile = load_profile("companies.profile.toml");
    let existing = company(None, "Bay");
    let store = MemoryStore::with_entities([existing.clone()]);

    let report = ingest(&store, &profile, input(vec![company_row(2, "", "Bay", "")]));
    assert_eq!(report.rows[0].outcome, RowOutcome::Skipped);
    assert_eq!(report.rows[0].entity_id, Some(existing.id));
}

#[test]
fn person_names_match_across_casing() {
    let profile = load_profile("contacts.profile.toml");
    let store = MemoryStore::new();
    let report = ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "contacts.csv"));

    let outcomes: Vec<RowOutcome> = report.rows.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![RowOutcome::Created, RowOutcome::Skipped, RowOutcome::Created]
    );
    assert_eq!(report.rows[0].entity_id, report.rows[1].entity_id);

    let mut names: Vec<String> = store.entities().into_iter().map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, vec!["Ayşe Yılmaz".to_string(), "Ümit Kaya".to_string()]);
    let ayse = store
        .entities()
        .into_iter()
        .find(|e| e.name == "Ayşe Yılmaz")
        .unwrap();
    assert_eq!(ayse.attributes.get("company_code").map(String::as_str), Some("C200"));
}

// -------------------------------------------------------------------------
// Review flagging
// -------------------------------------------------------------------------

#[test]
fn heavily_rewritten_rows_are_flagged() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let report = ingest(
        &store,
        &profile,
        input(vec![
            company_row(2, "C300", "Clean Co", "Bursa"),
            company_row(3, "c-301", "  Messy   Co ", "Bursa"),
        ]),
    );

    assert!(!report.rows[0].needs_review);
    assert!(report.rows[1].needs_review);
    assert_eq!(report.rows[1].outcome, RowOutcome::Created);
    assert_eq!(report.summary.flagged, 1);
    assert!(store.find_by_code(EntityType::Company, "C301").unwrap().is_some());
}

// -------------------------------------------------------------------------
// Atomicity
// -------------------------------------------------------------------------

#[test]
fn audit_failure_rolls_back_the_row() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    store.set_audit_fault(|record| record.after.code.as_deref() == Some("C200"));

    let report = ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "companies.csv"));
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.summary.failed, 1);
    let failed = report
        .rows
        .iter()
        .find(|r| r.outcome == RowOutcome::Failed)
        .unwrap();
    assert!(failed.message.as_deref().unwrap().contains("audit"));

    assert!(store.find_by_code(EntityType::Company, "C200").unwrap().is_none());
    assert_eq!(store.audit_records().len(), 1);
    assert_eq!(store.entity_count(EntityType::Company), 1);
}

#[test]
fn every_stored_entity_has_an_audit_record() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "companies_one_bad.csv"));
    ingest(&store, &profile, load_rows(&profile, SourceKind::Delimited, "companies.csv"));

    for entity in store.entities() {
        let history = store.query_by_entity(entity.id).unwrap();
        assert!(!history.is_empty(), "{} has no audit history", entity.id);
        assert_eq!(history.last().unwrap().after, entity);
    }
}

// -------------------------------------------------------------------------
// Store failures and cancellation
// -------------------------------------------------------------------------

struct Unreachable;

impl CanonicalStore for Unreachable {
    fn find_by_code(&self, _: EntityType, _: &str) -> Result<Option<CanonicalEntity>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn find_by_name(&self, _: EntityType, _: &str) -> Result<Vec<CanonicalEntity>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn get(&self, _: EntityId) -> Result<Option<CanonicalEntity>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn atomically(
        &self,
        _: &mut dyn FnMut(&mut dyn accord_recon::WriteScope) -> Result<(), RowError>,
    ) -> Result<(), RowError> {
        Err(StoreError::Unavailable("connection refused".into()).into())
    }
}

impl DenylistSource for Unreachable {
    fn load_denylist(&self) -> Result<Denylist, StoreError> {
        Ok(Denylist::default())
    }
}

#[test]
fn unreachable_store_aborts_the_run() {
    let profile = load_profile("companies.profile.toml");
    let err = run(
        &Unreachable,
        &profile,
        load_rows(&profile, SourceKind::Delimited, "companies.csv"),
        &RunOptions::default(),
    )
    .unwrap_err();

    match err {
        IngestError::ResolutionUnavailable { row, committed, reason } => {
            assert_eq!(row, 3);
            assert_eq!(committed, 0);
            assert!(reason.contains("refused"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn switched_off_store_fails_before_any_row() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    store.set_available(false);
    let err = run(
        &store,
        &profile,
        load_rows(&profile, SourceKind::Delimited, "companies.csv"),
        &RunOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IngestError::Denylist(StoreError::Unavailable(_))));
    assert_eq!(store.entity_count(EntityType::Company), 0);
}

#[test]
fn cancelled_run_reports_partial_status() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let options = RunOptions::default();
    options.cancel.cancel();

    let report = run(
        &store,
        &profile,
        load_rows(&profile, SourceKind::Delimited, "companies.csv"),
        &options,
    )
    .unwrap();
    assert!(report.is_cancelled());
    assert_eq!(report.summary.total_rows, 3);
    assert_eq!(report.summary.processed, 0);
    assert!(store.entities().is_empty());
    assert!(store.audit_records().is_empty());
}

#[test]
fn cancel_token_clones_share_the_flag() {
    let token = CancelToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
    assert!(token.flag().load(std::sync::atomic::Ordering::SeqCst));
}

// -------------------------------------------------------------------------
// Concurrency
// -------------------------------------------------------------------------

#[test]
fn parallel_workers_preserve_per_entity_source_order() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let rows: Vec<RawRow> = (0..200)
        .map(|i| {
            let code = format!("C{:02}", i % 20);
            let name = format!("Company {code}");
            company_row(i + 2, &code, &name, &format!("City {i}"))
        })
        .collect();
    let options = RunOptions {
        workers: 8,
        ..RunOptions::default()
    };

    let report = run(&store, &profile, input(rows), &options).unwrap();
    assert_eq!(report.summary.processed, 200);
    assert_eq!(report.summary.created, 20);
    assert_eq!(report.summary.updated, 180);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(store.entity_count(EntityType::Company), 20);

    for n in 0..20usize {
        let code = format!("C{n:02}");
        let entity = store.find_by_code(EntityType::Company, &code).unwrap().unwrap();
        let last_row = 180 + n;
        assert_eq!(
            entity.attributes.get("city").cloned(),
            Some(format!("City {last_row}"))
        );

        let history = store.query_by_entity(entity.id).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].action, MutationAction::Insert);
        let source_rows: Vec<usize> = history.iter().filter_map(|r| r.source_row).collect();
        let mut sorted = source_rows.clone();
        sorted.sort();
        assert_eq!(source_rows, sorted);
    }

    let sequences: Vec<u64> = store.audit_records().iter().filter_map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=200).collect::<Vec<u64>>());
}

#[test]
fn duplicate_new_names_in_one_source_create_once() {
    let profile = load_profile("companies.profile.toml");
    let store = MemoryStore::new();
    let rows = (0..12)
        .map(|i| company_row(i + 2, "", "Initech", "Austin"))
        .collect();
    let options = RunOptions {
        workers: 6,
        ..RunOptions::default()
    };

    let report = run(&store, &profile, input(rows), &options).unwrap();
    assert_eq!(report.summary.created, 1);
    assert_eq!(report.summary.skipped, 11);
    assert_eq!(store.entity_count(EntityType::Company), 1);
}

// -------------------------------------------------------------------------
// Document source
// -------------------------------------------------------------------------

#[test]
fn proposal_document_lines_become_entities() {
    let profile = load_profile("proposal_lines.profile.toml");
    let store = MemoryStore::new();
    let report = ingest(
        &store,
        &profile,
        load_rows(&profile, SourceKind::Document, "proposal_2024_17.txt"),
    );

    assert_eq!(report.summary.total_rows, 2);
    assert_eq!(report.summary.created, 2);

    let line = store
        .find_by_code(EntityType::ProposalLine, "TK2024171")
        .unwrap()
        .expect("first line stored");
    assert_eq!(line.name, "Vida M8 galvaniz");
    assert_eq!(line.attributes.get("product_code").map(String::as_str), Some("P100"));
    assert_eq!(line.attributes.get("unit_price").map(String::as_str), Some("2.75"));
    assert_eq!(line.attributes.get("currency").map(String::as_str), Some("TRY"));
}
