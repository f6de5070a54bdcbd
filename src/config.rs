//! Engine configuration
//!
//! Defaults, overridden by environment variables, overridden in turn by
//! whatever the embedding program sets through the builder methods.

use std::env;
use std::path::PathBuf;

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Environment variable overriding `data_dir`
pub const ENV_DATA_DIR: &str = "TABLEDB_DATA_DIR";
/// Environment variable overriding `log_filter`
pub const ENV_LOG: &str = "TABLEDB_LOG";
/// Environment variable overriding `default_database`
pub const ENV_DATABASE: &str = "TABLEDB_DATABASE";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root directory holding one sub-directory per database
    pub data_dir: PathBuf,
    /// `tracing-subscriber` filter directive
    pub log_filter: String,
    /// Database selected when a session starts
    pub default_database: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_database: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `TABLEDB_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.default_database = Some(database);
        }
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the log filter directive
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the database selected at startup
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }
}
