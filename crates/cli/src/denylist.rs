//! `accord denylist`: runtime-editable names that never become entities.

use clap::Subcommand;

use crate::{CliError, Context};

#[derive(Subcommand)]
pub enum DenylistCommands {
    /// Show entries and the list version
    List {
        #[arg(long)]
        json: bool,
    },

    /// Add names (matched case-insensitively)
    #[command(after_help = "\
Examples:
  accord denylist add Bay Bayan \"Test Firması\"")]
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Remove names
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

pub fn cmd_denylist(ctx: &Context, cmd: DenylistCommands) -> Result<(), CliError> {
    let store = ctx.open_store()?;
    match cmd {
        DenylistCommands::List { json } => {
            let version = store.denylist_version().map_err(CliError::store)?;
            let entries = store.denylist_entries().map_err(CliError::store)?;
            if json {
                let out = serde_json::json!({ "version": version, "entries": entries });
                println!("{out:#}");
            } else {
                eprintln!("denylist version {version}, {} entries", entries.len());
                for name in entries {
                    println!("{name}");
                }
            }
        }
        DenylistCommands::Add { names } => {
            for name in &names {
                let added = store.add_denylist(name).map_err(CliError::store)?;
                if added {
                    eprintln!("added '{name}'");
                } else {
                    eprintln!("'{name}' already listed");
                }
            }
            report_version(&store)?;
        }
        DenylistCommands::Remove { names } => {
            for name in &names {
                let removed = store.remove_denylist(name).map_err(CliError::store)?;
                if removed {
                    eprintln!("removed '{name}'");
                } else {
                    eprintln!("'{name}' not listed");
                }
            }
            report_version(&store)?;
        }
    }
    Ok(())
}

fn report_version(store: &accord_store::SqliteStore) -> Result<(), CliError> {
    let version = store.denylist_version().map_err(CliError::store)?;
    eprintln!("denylist version {version}");
    Ok(())
}
