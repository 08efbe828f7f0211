// accord CLI - ingestion, audit and denylist commands

mod audit;
mod denylist;
mod exit_codes;
mod ingest;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use accord_config::Settings;
use accord_recon::StoreError;
use accord_store::SqliteStore;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_ERROR, EXIT_INGEST_STORE_UNAVAILABLE, EXIT_SUCCESS, EXIT_USAGE};

/// Log filter override.
const LOG_ENV: &str = "ACCORD_LOG";

#[derive(Parser)]
#[command(name = "accord")]
#[command(about = "Ingest business records into a deduplicated, audited store")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// SQLite database (default: settings, then the platform data dir)
    #[arg(long, global = true, env = "ACCORD_DB")]
    db: Option<PathBuf>,

    /// Settings file (default: ~/.config/accord/settings.toml)
    #[arg(long, global = true, env = "ACCORD_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one source file with an ingestion profile
    #[command(after_help = "\
Examples:
  accord ingest companies.profile.toml crm-export.csv
  accord ingest companies.profile.toml crm-export.xlsx --sheet Firmalar
  accord ingest lines.profile.toml proposal.txt --dry-run --json
  accord ingest companies.profile.toml crm-export.csv --output report.json")]
    Ingest(ingest::IngestArgs),

    /// Validate an ingestion profile without running it
    #[command(after_help = "\
Examples:
  accord validate companies.profile.toml")]
    Validate {
        /// Path to the .profile.toml file
        profile: PathBuf,
    },

    /// Query the audit log
    #[command(subcommand)]
    Audit(audit::AuditCommands),

    /// Manage the runtime denylist
    #[command(subcommand)]
    Denylist(denylist::DenylistCommands),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Exit with `code` and print nothing; the command already reported.
    pub fn silent(code: u8) -> Self {
        Self::new(code, "")
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn store(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                Self::new(EXIT_INGEST_STORE_UNAVAILABLE, err.to_string())
                    .with_hint("check the --db path and that no other process holds the database")
            }
            other => Self::new(EXIT_ERROR, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

pub struct Context {
    pub settings: Settings,
    pub db: PathBuf,
}

impl Context {
    fn load(config: Option<&Path>, db: Option<PathBuf>) -> Result<Self, CliError> {
        let settings = match config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        }
        .map_err(|e| CliError::args(e.to_string()).with_hint("fix or remove the settings file"))?;
        let db = db.unwrap_or_else(|| settings.database_path());
        Ok(Self { settings, db })
    }

    /// Open the store, creating the database directory on first use.
    pub fn open_store(&self) -> Result<SqliteStore, CliError> {
        if let Some(parent) = self.db.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CliError::store(StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))))?;
        }
        SqliteStore::open(&self.db, self.settings.busy_timeout()).map_err(CliError::store)
    }
}

fn init_logging(verbose: bool, default_filter: &str) {
    let filter = if verbose {
        EnvFilter::new("accord=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter))
    };
    // Logs go to stderr; stdout carries command output (JSON reports)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  accord-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  accord-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Context::load(cli.config.as_deref(), cli.db)?;
    init_logging(cli.verbose, &ctx.settings.log.filter);

    match cli.command {
        Commands::Ingest(args) => ingest::cmd_ingest(&ctx, args),
        Commands::Validate { profile } => ingest::cmd_validate(&profile),
        Commands::Audit(cmd) => audit::cmd_audit(&ctx, cmd),
        Commands::Denylist(cmd) => denylist::cmd_denylist(&ctx, cmd),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}
