use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use accord_core::RawRow;
use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::candidate::{extract, Candidate, EntityRecord};
use crate::config::IngestProfile;
use crate::error::{IngestError, RowError, StoreError};
use crate::lanes::{partition, EntityLocks, LaneKey};
use crate::report::{
    compute_summary, IngestionReport, ReportMeta, RowDiagnostic, RowOutcome, RunStatus, SourceInfo,
};
use crate::resolve::{ResolutionOutcome, Resolver};
use crate::store::{CanonicalStore, DenylistSource};
use crate::upsert::{new_entity, plan_update};

// ---------------------------------------------------------------------------
// Run inputs
// ---------------------------------------------------------------------------

/// Shared cancel flag, checked between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub actor: String,
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            actor: "accord".to_string(),
            cancel: CancelToken::new(),
        }
    }
}

/// Rows already read from one source.
pub struct IngestInput {
    pub source: SourceInfo,
    pub rows: Vec<RawRow>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

enum Prepared {
    Failed {
        index: usize,
        warnings: Vec<String>,
        error: RowError,
    },
    Ready {
        candidate: Candidate,
        record: EntityRecord,
        tentative: ResolutionOutcome,
    },
}

impl Prepared {
    fn lane_keys(&self) -> Vec<LaneKey> {
        let Self::Ready { record, tentative, .. } = self else {
            return Vec::new();
        };
        let mut keys = vec![LaneKey::Name(record.entity_type, record.name.key.clone())];
        if let Some(code) = &record.code {
            keys.push(LaneKey::Code(record.entity_type, code.clone()));
        }
        match tentative {
            ResolutionOutcome::Matched { id, .. } => keys.push(LaneKey::Entity(*id)),
            ResolutionOutcome::Ambiguous(ids) => keys.extend(ids.iter().copied().map(LaneKey::Entity)),
            ResolutionOutcome::Created(_) | ResolutionOutcome::Rejected(_) => {}
        }
        keys
    }
}

/// The store went away; the run stops.
struct Fatal {
    row: usize,
    reason: String,
}

/// Run one ingestion: normalize, resolve and apply every row of `input`.
///
/// Row-level failures land in the report. Only an unreachable store aborts.
pub fn run<S>(
    store: &S,
    profile: &IngestProfile,
    input: IngestInput,
    options: &RunOptions,
) -> Result<IngestionReport, IngestError>
where
    S: CanonicalStore + DenylistSource,
{
    profile.validate()?;

    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("ingest", run_id = %run_id, profile = %profile.name);
    let _enter = span.enter();
    let started_at = Utc::now();
    let total_rows = input.rows.len();

    let mut denylist = store.load_denylist().map_err(IngestError::Denylist)?;
    denylist.extend(&profile.denylist.entries);
    debug!(
        version = denylist.version(),
        entries = denylist.len(),
        "denylist loaded"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .thread_name(|i| format!("accord-worker-{i}"))
        .build()
        .map_err(|e| IngestError::Pool(e.to_string()))?;

    let resolver = Resolver::new(store, &denylist);

    // Prepare: normalize and resolve tentatively, no writes
    let attempts: Vec<Result<Prepared, Fatal>> = pool.install(|| {
        input
            .rows
            .into_par_iter()
            .map(|row| prepare(&row, profile, &resolver))
            .collect()
    });
    // Source order, so the first unreachable row is the one reported
    let prepared = attempts
        .into_iter()
        .collect::<Result<Vec<_>, Fatal>>()
        .map_err(|f| IngestError::ResolutionUnavailable {
            row: f.row,
            reason: f.reason,
            committed: 0,
        })?;

    let keys: Vec<Vec<LaneKey>> = prepared.iter().map(Prepared::lane_keys).collect();
    let lanes = partition(&keys);
    info!(rows = total_rows, lanes = lanes.len(), "rows prepared");

    let applier = Applier {
        store,
        resolver: Resolver::new(store, &denylist),
        recorder: AuditRecorder::new(run_id.clone(), options.actor.clone()),
        locks: EntityLocks::new(options.workers.max(1) * 16),
        review_threshold: profile.review_threshold,
        cancel: &options.cancel,
        abort: AtomicBool::new(false),
        committed: AtomicUsize::new(0),
    };

    let results: Vec<Result<Vec<RowDiagnostic>, Fatal>> = pool.install(|| {
        lanes
            .par_iter()
            .map(|lane| applier.apply_lane(lane, &prepared))
            .collect()
    });

    let mut rows = Vec::with_capacity(total_rows);
    let mut fatal: Option<Fatal> = None;
    for result in results {
        match result {
            Ok(diagnostics) => rows.extend(diagnostics),
            Err(f) => {
                if fatal.as_ref().map_or(true, |current| f.row < current.row) {
                    fatal = Some(f);
                }
            }
        }
    }
    if let Some(f) = fatal {
        let committed = applier.committed.load(Ordering::SeqCst);
        warn!(row = f.row, committed, reason = %f.reason, "store unavailable, run aborted");
        return Err(IngestError::ResolutionUnavailable {
            row: f.row,
            reason: f.reason,
            committed,
        });
    }

    rows.sort_by_key(|r| r.row_index);
    let status = if options.cancel.is_cancelled() && rows.len() < total_rows {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    let summary = compute_summary(total_rows, &rows);
    info!(
        status = %status,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        ambiguous = summary.ambiguous,
        rejected = summary.rejected,
        failed = summary.failed,
        "ingest finished"
    );

    Ok(IngestionReport {
        meta: ReportMeta {
            run_id,
            profile: profile.name.clone(),
            entity_type: profile.entity,
            source: input.source,
            status,
            actor: options.actor.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: Utc::now(),
        },
        summary,
        rows,
    })
}

fn prepare(row: &RawRow, profile: &IngestProfile, resolver: &Resolver<'_>) -> Result<Prepared, Fatal> {
    let candidate = match extract(row, profile) {
        Ok(c) => c,
        Err(e) => {
            return Ok(Prepared::Failed {
                index: row.index,
                warnings: row.warnings.clone(),
                error: e.into(),
            })
        }
    };
    let record = candidate.entity.to_record();
    match resolver.resolve(&record) {
        Ok(resolution) => Ok(Prepared::Ready {
            candidate,
            record,
            tentative: resolution.outcome,
        }),
        Err(StoreError::Unavailable(reason)) => Err(Fatal {
            row: row.index,
            reason,
        }),
        Err(e) => Ok(Prepared::Failed {
            index: row.index,
            warnings: candidate.warnings,
            error: e.into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

struct Applier<'a> {
    store: &'a dyn CanonicalStore,
    resolver: Resolver<'a>,
    recorder: AuditRecorder,
    locks: EntityLocks,
    review_threshold: usize,
    cancel: &'a CancelToken,
    abort: AtomicBool,
    committed: AtomicUsize,
}

impl Applier<'_> {
    fn apply_lane(&self, lane: &[usize], prepared: &[Prepared]) -> Result<Vec<RowDiagnostic>, Fatal> {
        let mut out = Vec::with_capacity(lane.len());
        for &pos in lane {
            if self.cancel.is_cancelled() || self.abort.load(Ordering::SeqCst) {
                break;
            }
            let diagnostic = match &prepared[pos] {
                Prepared::Failed { index, warnings, error } => {
                    warn!(row = index, error = %error, "row failed");
                    let mut d = RowDiagnostic::new(*index, RowOutcome::Failed);
                    d.message = Some(error.to_string());
                    d.warnings = warnings.clone();
                    d
                }
                Prepared::Ready { candidate, record, .. } => match self.apply_row(candidate, record) {
                    Ok(d) => d,
                    Err(f) => {
                        self.abort.store(true, Ordering::SeqCst);
                        return Err(f);
                    }
                },
            };
            out.push(diagnostic);
        }
        Ok(out)
    }

    fn diagnostic(&self, candidate: &Candidate, outcome: RowOutcome) -> RowDiagnostic {
        let mut d = RowDiagnostic::new(candidate.source_row_index, outcome);
        d.warnings = candidate.warnings.clone();
        d.needs_review = candidate.modified_fields.len() >= self.review_threshold;
        d
    }

    /// Row failure, unless the store is gone altogether.
    fn failure(&self, candidate: &Candidate, error: RowError) -> Result<RowDiagnostic, Fatal> {
        if let RowError::Store(StoreError::Unavailable(reason)) = error {
            return Err(Fatal {
                row: candidate.source_row_index,
                reason,
            });
        }
        warn!(row = candidate.source_row_index, error = %error, "row failed");
        let mut d = self.diagnostic(candidate, RowOutcome::Failed);
        d.message = Some(error.to_string());
        Ok(d)
    }

    fn apply_row(&self, candidate: &Candidate, record: &EntityRecord) -> Result<RowDiagnostic, Fatal> {
        let row = candidate.source_row_index;

        // Re-resolve against what earlier rows in this run committed
        let resolution = match self.resolver.resolve(record) {
            Ok(r) => r,
            Err(e) => return self.failure(candidate, e.into()),
        };

        match resolution.outcome {
            ResolutionOutcome::Matched { id, rule } => {
                let _guard = self.locks.lock(id);
                let existing = match self.store.get(id) {
                    Ok(Some(e)) => e,
                    Ok(None) => {
                        let mut d = self.diagnostic(candidate, RowOutcome::Failed);
                        d.message = Some(format!("matched entity {id} no longer exists"));
                        return Ok(d);
                    }
                    Err(e) => return self.failure(candidate, e.into()),
                };

                let Some((after, changes)) = plan_update(&existing, record) else {
                    debug!(row, entity_id = %id, rule = ?rule, "unchanged, skipped");
                    let mut d = self.diagnostic(candidate, RowOutcome::Skipped);
                    d.entity_id = Some(id);
                    return Ok(d);
                };

                let audit = self.recorder.update(&existing, &after, row);
                let written = self.store.atomically(&mut |scope| {
                    scope.update(id, &after)?;
                    self.recorder.append(scope, &audit)?;
                    Ok(())
                });
                match written {
                    Ok(()) => {
                        self.committed.fetch_add(1, Ordering::SeqCst);
                        debug!(row, entity_id = %id, changes = changes.len(), "updated");
                        let mut d = self.diagnostic(candidate, RowOutcome::Updated);
                        d.entity_id = Some(id);
                        d.changes = changes;
                        Ok(d)
                    }
                    Err(e) => self.failure(candidate, e),
                }
            }
            ResolutionOutcome::Created(id) => {
                let entity = new_entity(id, record);
                let audit = self.recorder.insert(&entity, row);
                let written = self.store.atomically(&mut |scope| {
                    scope.insert(&entity)?;
                    self.recorder.append(scope, &audit)?;
                    Ok(())
                });
                match written {
                    Ok(()) => {
                        self.committed.fetch_add(1, Ordering::SeqCst);
                        debug!(row, entity_id = %id, "created");
                        let mut d = self.diagnostic(candidate, RowOutcome::Created);
                        d.entity_id = Some(id);
                        Ok(d)
                    }
                    Err(e) => self.failure(candidate, e),
                }
            }
            ResolutionOutcome::Ambiguous(ids) => {
                debug!(row, candidates = ids.len(), "ambiguous");
                let mut d = self.diagnostic(candidate, RowOutcome::Ambiguous);
                d.message = Some(format!(
                    "{} existing {} entities share the name '{}'",
                    ids.len(),
                    record.entity_type,
                    record.name.display
                ));
                d.candidates = ids;
                Ok(d)
            }
            ResolutionOutcome::Rejected(reason) => {
                debug!(row, reason = %reason, "rejected");
                let mut d = self.diagnostic(candidate, RowOutcome::Rejected);
                d.message = Some(reason.to_string());
                Ok(d)
            }
        }
    }
}
