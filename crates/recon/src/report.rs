use accord_core::{EntityId, EntityType};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::upsert::FieldChange;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub meta: ReportMeta,
    pub summary: ReportSummary,
    pub rows: Vec<RowDiagnostic>,
}

impl IngestionReport {
    pub fn is_cancelled(&self) -> bool {
        self.meta.status == RunStatus::Cancelled
    }

    pub fn one_line(&self) -> String {
        let s = &self.summary;
        format!(
            "{} {}: {} row(s), {} created, {} updated, {} skipped, {} ambiguous, {} rejected, {} failed, {} flagged",
            self.meta.status,
            self.meta.profile,
            s.total_rows,
            s.created,
            s.updated,
            s.skipped,
            s.ambiguous,
            s.rejected,
            s.failed,
            s.flagged
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub run_id: String,
    pub profile: String,
    pub entity_type: EntityType,
    pub source: SourceInfo,
    pub status: RunStatus,
    pub actor: String,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total_rows: usize,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub ambiguous: usize,
    pub rejected: usize,
    pub failed: usize,
    pub flagged: usize,
}

// ---------------------------------------------------------------------------
// Per-row diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    Skipped,
    Ambiguous,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowDiagnostic {
    pub row_index: usize,
    pub outcome: RowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub needs_review: bool,
}

impl RowDiagnostic {
    pub fn new(row_index: usize, outcome: RowOutcome) -> Self {
        Self {
            row_index,
            outcome,
            entity_id: None,
            candidates: Vec::new(),
            message: None,
            changes: Vec::new(),
            warnings: Vec::new(),
            needs_review: false,
        }
    }
}

/// Count outcomes over per-row diagnostics.
pub fn compute_summary(total_rows: usize, rows: &[RowDiagnostic]) -> ReportSummary {
    let mut summary = ReportSummary {
        total_rows,
        processed: rows.len(),
        ..Default::default()
    };
    for row in rows {
        match row.outcome {
            RowOutcome::Created => summary.created += 1,
            RowOutcome::Updated => summary.updated += 1,
            RowOutcome::Skipped => summary.skipped += 1,
            RowOutcome::Ambiguous => summary.ambiguous += 1,
            RowOutcome::Rejected => summary.rejected += 1,
            RowOutcome::Failed => summary.failed += 1,
        }
        if row.needs_review {
            summary.flagged += 1;
        }
    }
    summary
}
