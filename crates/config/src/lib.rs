// Configuration loading

pub mod settings;

pub use settings::{ConfigError, IngestSettings, LogSettings, Settings, StoreSettings};
