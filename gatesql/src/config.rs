///
/// # Database Configuration
///
/// The `[database]` table of a `gatesql.toml` file. Every key is optional;
/// missing keys take the defaults below.
///
/// ```toml
/// [database]
/// path = "app.db"
/// migrations_table = "migrations"
/// migrations_dir = "migrations"
/// read_only = true
/// busy_timeout_ms = 5000
/// ```
///
/// `read_only` opens the second, authorizer-gated handle alongside the
/// read-write one. `migrations_dir` is only a hint for callers that load
/// sources with `read_migrations`; `Database::open` takes the sources
/// explicitly.
///

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::Error;

pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub migrations_table: String,
    pub migrations_dir: Option<PathBuf>,
    pub read_only: bool,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            migrations_dir: None,
            read_only: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.migrations_table.trim().is_empty() {
            return Err(Error::Config("migrations_table must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseConfig,
}

/// Parse the `[database]` table of a config file. Other tables are ignored.
pub fn parse_config(path: &Path) -> Result<DatabaseConfig, Error> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<DatabaseConfig, Error> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
    file.database.validate()?;
    Ok(file.database)
}
