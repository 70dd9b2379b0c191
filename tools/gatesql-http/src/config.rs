///
/// # Server Configuration
///
/// The `[server]` table of a `gatesql.toml` file:
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:8080"
/// query_params = ["query", "q"]
/// arg_param = "arg"
/// ```
///
/// The query text is taken from the first listed parameter that is present
/// and non-empty. Every `arg_param` occurrence becomes one positional
/// argument, in request order.
///

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::errors::ServerError;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub query_params: Vec<String>,
    pub arg_param: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            query_params: vec!["query".to_string(), "q".to_string()],
            arg_param: "arg".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// `:8080` is shorthand for every interface on port 8080.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let addr = if self.bind.starts_with(':') {
            format!("0.0.0.0{}", self.bind)
        } else {
            self.bind.clone()
        };
        addr.parse().map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
            addr: self.bind.clone(),
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.query_params.iter().all(|p| p.is_empty()) {
            return Err(ServerError::Config("query_params must name at least one parameter".to_string()));
        }
        if self.arg_param.is_empty() {
            return Err(ServerError::Config("arg_param must not be empty".to_string()));
        }
        self.socket_addr().map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
}

/// Parse the `[server]` table of a config file. Other tables are ignored.
pub fn parse_config(path: &Path) -> Result<ServerConfig, ServerError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<ServerConfig, ServerError> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| ServerError::Config(e.to_string()))?;
    file.server.validate()?;
    Ok(file.server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_config_str("[database]\npath = \"x.db\"\n").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_parse_server_table() {
        let config = parse_config_str(
            r#"
[server]
bind = ":9090"
query_params = ["sql"]
arg_param = "p"
"#,
        )
        .unwrap();
        assert_eq!(config.query_params, vec!["sql"]);
        assert_eq!(config.arg_param, "p");
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:9090");
    }

    #[test]
    fn test_invalid_server_table() {
        assert!(matches!(
            parse_config_str("[server]\nbind = \"nowhere\"\n"),
            Err(ServerError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_config_str("[server]\nquery_params = []\n"),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            parse_config_str("[server]\nport = 1\n"),
            Err(ServerError::Config(_))
        ));
    }
}
