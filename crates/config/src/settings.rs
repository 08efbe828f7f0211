// User settings
// Loaded from ~/.config/accord/settings.toml (or $ACCORD_CONFIG)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the settings file location.
pub const CONFIG_ENV: &str = "ACCORD_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Canonical store location and timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    /// SQLite database path. None = platform data dir
    pub database: Option<PathBuf>,

    /// How long a write waits for a locked database (milliseconds)
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    /// Recorded on every audit entry. None = $USER
    pub actor: Option<String>,

    /// Worker threads per run
    pub workers: usize,

    /// Upper bound for reading one source file (milliseconds)
    pub source_timeout_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            actor: None,
            workers: 4,
            source_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// `tracing` filter directive, used when ACCORD_LOG is unset
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "accord=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    pub log: LogSettings,
}

impl Settings {
    /// The settings file path: $ACCORD_CONFIG, else the platform config dir
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("accord")
            .join("settings.toml")
    }

    /// Load settings from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, String> {
        let settings: Settings = toml::from_str(contents).map_err(|e| e.to_string())?;
        if settings.ingest.workers == 0 {
            return Err("ingest.workers must be at least 1".to_string());
        }
        Ok(settings)
    }

    /// Configured database, else `<data dir>/accord/accord.db`
    pub fn database_path(&self) -> PathBuf {
        self.store.database.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("accord")
                .join("accord.db")
        })
    }

    /// Configured actor, else the login name, else "accord"
    pub fn actor(&self) -> String {
        self.ingest
            .actor
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .or_else(|| std::env::var("USERNAME").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| "accord".to_string())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store.busy_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.ingest.source_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.ingest.workers, 4);
        assert_eq!(settings.busy_timeout(), Duration::from_secs(5));
        assert_eq!(settings.log.filter, "accord=info");
    }

    #[test]
    fn sections_override_defaults() {
        let settings = Settings::from_toml(
            r#"
[store]
database = "/srv/accord/main.db"

[ingest]
actor = "etl"
workers = 8
source_timeout_ms = 1000
"#,
        )
        .unwrap();
        assert_eq!(settings.database_path(), PathBuf::from("/srv/accord/main.db"));
        assert_eq!(settings.actor(), "etl");
        assert_eq!(settings.ingest.workers, 8);
        assert_eq!(settings.source_timeout(), Duration::from_secs(1));
        assert_eq!(settings.store.busy_timeout_ms, 5_000);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_toml("[ingest]\nthreads = 3\n").unwrap_err();
        assert!(err.contains("threads"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(Settings::from_toml("[ingest]\nworkers = 0\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn unparsable_file_names_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[store\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("settings.toml"));
    }

    #[test]
    fn default_database_lives_under_data_dir() {
        let path = Settings::default().database_path();
        assert!(path.ends_with("accord/accord.db"));
    }
}
