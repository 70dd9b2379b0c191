//!
//! Query Endpoint
//!
//! Turns a request's query string into a read-only query and its answer.
//! The endpoint holds no connection of its own: every call opens a fresh
//! read-only handle, so concurrent requests only rely on the engine's
//! connection-level guarantees.
//!
//! ## Responses
//!
//! - `200` with a JSON array of row objects, columns in result order and
//!   nested JSON text columns expanded into structure
//! - `400` with `{"error": "query must not be empty"}` when no query was given
//! - `400` with `{"error": "<sql>: <engine message>"}` when the statement
//!   was rejected, including by the read-only authorizer
//! - `500` with `{"error": ...}` when the database could not be reached,
//!   including after it was closed
//!

use hyper::StatusCode;
use indexmap::IndexMap;
use serde_json::json;
use tracing::{debug, warn};

use gatesql::{Access, Database, Error, Json, Opener};

use crate::config::ServerConfig;

/// The status and JSON body for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }).to_string(),
        }
    }
}

/// The query text and positional arguments carried by a request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRequest {
    pub query: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryEndpoint {
    opener: Opener,
    config: ServerConfig,
}

impl QueryEndpoint {
    /// Fails with a capability error unless `db` was opened with a
    /// read-only handle.
    pub fn new(db: &Database, config: ServerConfig) -> Result<Self, Error> {
        db.read_only()?;
        Ok(Self {
            opener: db.opener().clone(),
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn parse(&self, query_string: &str) -> QueryRequest {
        let pairs = decode_pairs(query_string);
        let query = self
            .config
            .query_params
            .iter()
            .find_map(|name| {
                pairs
                    .iter()
                    .find(|(key, value)| key == name && !value.trim().is_empty())
                    .map(|(_, value)| value.clone())
            })
            .unwrap_or_default();
        let args = pairs
            .iter()
            .filter(|(key, _)| *key == self.config.arg_param)
            .map(|(_, value)| value.clone())
            .collect();
        QueryRequest { query, args }
    }

    /// Answer one request. Blocks on engine I/O.
    pub fn respond(&self, query_string: &str) -> Reply {
        let request = self.parse(query_string);
        if request.query.trim().is_empty() {
            return Reply::error(StatusCode::BAD_REQUEST, "query must not be empty");
        }
        debug!(query = %request.query, args = request.args.len(), "Running query");

        match self.run(&request) {
            Ok(body) => Reply {
                status: StatusCode::OK,
                body,
            },
            Err(e) => {
                let status = match e {
                    Error::Engine { .. } | Error::Conversion(_) | Error::Shape { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                warn!(error = %e, status = status.as_u16(), "Query rejected");
                Reply::error(status, e.to_string())
            }
        }
    }

    fn run(&self, request: &QueryRequest) -> Result<String, Error> {
        let handle = self.opener.open(Access::ReadOnly)?;
        let rows: Vec<IndexMap<String, Json>> = gatesql::query(
            &handle,
            &request.query,
            rusqlite::params_from_iter(request.args.iter()),
        )?;
        handle.close()?;
        serde_json::to_string(&rows).map_err(|e| gatesql::ConversionError::new(e.to_string()).into())
    }
}

fn decode_pairs(query_string: &str) -> Vec<(String, String)> {
    query_string
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pairs() {
        let pairs = decode_pairs("q=SELECT+1%2C+2&arg=a%20b&&flag");
        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "SELECT 1, 2".to_string()),
                ("arg".to_string(), "a b".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_decode_keeps_literal_plus_when_escaped() {
        assert_eq!(decode("1%2B1"), "1+1");
        assert_eq!(decode("bad%zz"), "bad%zz");
    }
}
