//! `accord ingest` and `accord validate`.

use std::fs::File;
use std::path::{Path, PathBuf};

use accord_io::{open_source, read_with_timeout, source_digest, ExpectedColumn, HeaderSet, ReadOptions, SourceError, SourceKind};
use accord_recon::{
    run, CancelToken, IngestError, IngestInput, IngestProfile, IngestionReport, MemoryStore, RunOptions,
    SourceInfo,
};
use clap::Args;

use crate::exit_codes::{
    EXIT_ERROR, EXIT_INGEST_AMBIGUOUS, EXIT_INGEST_CANCELLED, EXIT_INGEST_FAILED_ROWS,
    EXIT_INGEST_INVALID_PROFILE, EXIT_INGEST_SOURCE, EXIT_INGEST_STORE_UNAVAILABLE,
};
use crate::{CliError, Context};

#[derive(Args)]
pub struct IngestArgs {
    /// Path to the .profile.toml file
    pub profile: PathBuf,

    /// Source file (spreadsheet, delimited text or layout text)
    pub source: PathBuf,

    /// Resolve and report without writing to the store
    #[arg(long)]
    pub dry_run: bool,

    /// Output the JSON report to stdout instead of the human summary only
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report to file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Worker threads (default: settings)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Actor recorded on audit entries (default: settings, then $USER)
    #[arg(long)]
    pub actor: Option<String>,

    /// Worksheet to read (workbooks only)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Source kind: delimited, workbook or document (default: profile, then extension)
    #[arg(long)]
    pub kind: Option<String>,
}

fn source_err(err: SourceError, source: &Path) -> CliError {
    let hint = match &err {
        SourceError::Schema { .. } => Some("check the [columns] aliases against the file's header row"),
        SourceError::Timeout(_) => Some("raise ingest.source_timeout_ms in settings"),
        _ => None,
    };
    let e = CliError::new(EXIT_INGEST_SOURCE, format!("{}: {err}", source.display()));
    match hint {
        Some(h) => e.with_hint(h),
        None => e,
    }
}

fn ingest_err(err: IngestError) -> CliError {
    match err {
        IngestError::ResolutionUnavailable { .. } | IngestError::Denylist(_) => {
            CliError::new(EXIT_INGEST_STORE_UNAVAILABLE, err.to_string())
        }
        IngestError::Profile(e) => CliError::new(EXIT_INGEST_INVALID_PROFILE, e.to_string()),
        IngestError::Pool(_) => CliError::new(EXIT_ERROR, err.to_string()),
    }
}

fn load_profile(path: &Path) -> Result<IngestProfile, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::args(format!("cannot read profile {}: {e}", path.display())))?;
    IngestProfile::from_toml(&text)
        .map_err(|e| CliError::new(EXIT_INGEST_INVALID_PROFILE, format!("{}: {e}", path.display())))
}

/// Headers the source readers look for, in the profile's column order.
fn expected_columns(profile: &IngestProfile) -> HeaderSet {
    HeaderSet::new(
        profile
            .column_specs()
            .into_iter()
            .map(|spec| ExpectedColumn::new(spec.field, spec.aliases, spec.required))
            .collect(),
    )
}

fn source_kind(flag: Option<&str>, profile: &IngestProfile, source: &Path) -> Result<SourceKind, CliError> {
    if let Some(name) = flag.or(profile.source.kind.as_deref()) {
        return SourceKind::parse(name)
            .ok_or_else(|| CliError::args(format!("unknown source kind '{name}' (expected delimited, workbook or document)")));
    }
    SourceKind::from_path(source).ok_or_else(|| {
        CliError::args(format!("cannot tell the source kind of {}", source.display()))
            .with_hint("pass --kind delimited|workbook|document")
    })
}

/// Store contents copied into memory so a dry run never writes.
fn dry_run_store(ctx: &Context) -> Result<MemoryStore, CliError> {
    if !ctx.db.exists() {
        return Ok(MemoryStore::new());
    }
    let sqlite = ctx.open_store()?;
    let store = MemoryStore::with_entities(sqlite.entities(None).map_err(CliError::store)?);
    store.set_denylist(
        sqlite.denylist_version().map_err(CliError::store)?,
        sqlite.denylist_entries().map_err(CliError::store)?,
    );
    Ok(store)
}

fn install_interrupt(cancel: &CancelToken) {
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGINT;
        if let Err(e) = signal_hook::flag::register(SIGINT, cancel.flag()) {
            tracing::warn!(error = %e, "cannot install SIGINT handler");
        }
    }
    #[cfg(not(unix))]
    let _ = cancel;
}

pub fn cmd_ingest(ctx: &Context, args: IngestArgs) -> Result<(), CliError> {
    let profile = load_profile(&args.profile)?;
    let kind = source_kind(args.kind.as_deref(), &profile, &args.source)?;

    let file = File::open(&args.source)
        .map_err(|e| CliError::args(format!("cannot open {}: {e}", args.source.display())))?;
    let bytes = read_with_timeout(file, ctx.settings.source_timeout()).map_err(|e| source_err(e, &args.source))?;
    let digest = source_digest(&bytes);

    let options = ReadOptions {
        expected: expected_columns(&profile),
        sheet: args.sheet.clone().or_else(|| profile.source.sheet.clone()),
        delimiter: profile.source.delimiter_byte(),
    };
    let rows = open_source(kind, bytes, &options)
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| source_err(e, &args.source))?;
    tracing::info!(source = %args.source.display(), kind = kind.as_str(), rows = rows.len(), "source read");

    let input = IngestInput {
        source: SourceInfo {
            name: args.source.display().to_string(),
            digest: Some(digest),
        },
        rows,
    };

    let cancel = CancelToken::new();
    install_interrupt(&cancel);
    let run_options = RunOptions {
        workers: args.workers.unwrap_or(ctx.settings.ingest.workers).max(1),
        actor: args.actor.clone().unwrap_or_else(|| ctx.settings.actor()),
        cancel,
    };

    let report = if args.dry_run {
        let store = dry_run_store(ctx)?;
        run(&store, &profile, input, &run_options).map_err(ingest_err)?
    } else {
        let store = ctx.open_store()?;
        run(&store, &profile, input, &run_options).map_err(ingest_err)?
    };

    emit_report(&report, &args)?;
    exit_for(&report)
}

fn emit_report(report: &IngestionReport, args: &IngestArgs) -> Result<(), CliError> {
    if args.json || args.output.is_some() {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        if let Some(ref path) = args.output {
            std::fs::write(path, &json)
                .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        if args.json {
            println!("{json}");
        }
    }

    for row in report.rows.iter().filter(|r| r.message.is_some()) {
        eprintln!(
            "  row {}: {:?}: {}",
            row.row_index,
            row.outcome,
            row.message.as_deref().unwrap_or_default()
        );
    }
    let prefix = if args.dry_run { "dry run, " } else { "" };
    eprintln!("{prefix}{}", report.one_line());
    Ok(())
}

fn exit_for(report: &IngestionReport) -> Result<(), CliError> {
    let s = &report.summary;
    if report.is_cancelled() {
        return Err(CliError::new(
            EXIT_INGEST_CANCELLED,
            format!("interrupted after {} of {} row(s)", s.processed, s.total_rows),
        ));
    }
    if s.failed > 0 {
        return Err(CliError::silent(EXIT_INGEST_FAILED_ROWS));
    }
    if s.ambiguous > 0 {
        return Err(CliError::silent(EXIT_INGEST_AMBIGUOUS));
    }
    Ok(())
}

pub fn cmd_validate(path: &Path) -> Result<(), CliError> {
    let profile = load_profile(path)?;
    let columns = profile.column_specs();
    println!(
        "ok: {} ({}), {} column(s), review threshold {}",
        profile.name,
        profile.entity,
        columns.len(),
        profile.review_threshold
    );
    for spec in &columns {
        let marker = if spec.required { "*" } else { " " };
        println!("  {marker} {:<16} {}", spec.field, spec.aliases.join(" | "));
    }
    if !profile.denylist.entries.is_empty() {
        println!("  static denylist entries: {}", profile.denylist.entries.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
name = "crm"
entity = "company"

[source]
positional = ["name", "code"]

[columns]
code = ["Kod", "Code"]
name = "Unvan"
"#;

    #[test]
    fn expected_columns_follow_profile_order() {
        let profile = IngestProfile::from_toml(PROFILE).unwrap();
        let set = expected_columns(&profile);
        let fields: Vec<&str> = set.columns.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "code"]);
        assert!(set.columns[0].required);
        assert_eq!(set.columns[1].aliases, vec!["Kod".to_string(), "Code".to_string()]);
    }

    #[test]
    fn kind_flag_beats_extension() {
        let profile = IngestProfile::from_toml(PROFILE).unwrap();
        let kind = source_kind(Some("document"), &profile, Path::new("a.csv")).unwrap();
        assert_eq!(kind, SourceKind::Document);
        let kind = source_kind(None, &profile, Path::new("a.xlsx")).unwrap();
        assert_eq!(kind, SourceKind::Workbook);
        assert!(source_kind(None, &profile, Path::new("a.bin")).is_err());
    }
}
