///
/// # CLI Settings
///
/// Composes the `[database]` and `[server]` tables of an optional
/// `gatesql.toml` with the command-line flags. Flags win over the file.
///

use serde::Deserialize;
use std::path::Path;

use gatesql::DatabaseConfig;
use gatesql_http::ServerConfig;

use crate::errors::CliError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CliError> {
        let settings: Settings = toml::from_str(content).map_err(|e| CliError::Config(e.to_string()))?;
        settings.database.validate()?;
        settings.server.validate()?;
        Ok(settings)
    }
}
