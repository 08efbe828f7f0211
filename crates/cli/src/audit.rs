//! `accord audit`: read the append-only mutation log.

use accord_core::{EntityId, MutationRecord};
use accord_recon::AuditLog;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;

use crate::{CliError, Context};

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Full history of one entity, oldest first
    #[command(after_help = "\
Examples:
  accord audit entity 1f0c6a4e-3b7e-4c41-9a55-2b8f6d1c9e07")]
    Entity {
        /// Entity id (UUID)
        id: String,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Most recent mutations, oldest first
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Mutations recorded at or after a point in time
    #[command(after_help = "\
Examples:
  accord audit since 2024-03-01
  accord audit since 2024-03-01T09:30:00Z --limit 500")]
    Since {
        /// RFC 3339 timestamp or YYYY-MM-DD (midnight UTC)
        since: String,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, CliError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CliError::args(format!("invalid time '{raw}' (expected RFC 3339 or YYYY-MM-DD)")))
}

pub fn cmd_audit(ctx: &Context, cmd: AuditCommands) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    let (records, json) = match cmd {
        AuditCommands::Entity { id, json } => {
            let id: EntityId = id
                .parse()
                .map_err(|e| CliError::args(format!("invalid entity id '{id}': {e}")))?;
            (store.query_by_entity(id).map_err(CliError::store)?, json)
        }
        AuditCommands::Recent { limit, json } => (store.query_recent(limit).map_err(CliError::store)?, json),
        AuditCommands::Since { since, limit, json } => {
            let since = parse_since(&since)?;
            (store.query_since(since, limit).map_err(CliError::store)?, json)
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&records)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{out}");
    } else {
        print_table(&records);
    }
    Ok(())
}

fn print_table(records: &[MutationRecord]) {
    if records.is_empty() {
        eprintln!("no audit records");
        return;
    }
    for r in records {
        println!(
            "{:>6}  {}  {:<6}  {:<13}  {}  {:<24}  row {}  run {}",
            r.sequence.map(|s| s.to_string()).unwrap_or_default(),
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.action.as_str(),
            r.entity_type.as_str(),
            r.entity_id,
            r.after.name,
            r.source_row.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            r.run_id,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_accepts_dates_and_timestamps() {
        let day = parse_since("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let ts = parse_since("2024-03-01T12:30:00+03:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T09:30:00+00:00");
        assert!(parse_since("yesterday").is_err());
    }
}
