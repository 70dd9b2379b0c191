//!
//! # gatesql-http - Read-only query endpoint
//!
//! Exposes a gatesql database to untrusted callers over HTTP. Only
//! databases opened with a read-only handle can be served, and every
//! statement runs behind the read-only authorizer.
//!
//! ```rust,ignore
//! let mut db = Database::new(DatabaseConfig::new("app.db").with_read_only(true));
//! db.open(&Migrations::new())?;
//! let endpoint = QueryEndpoint::new(&db, ServerConfig::default())?;
//! serve(endpoint, async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```
//!
//! ```sh
//! curl 'http://127.0.0.1:8080/?q=SELECT+*+FROM+users+WHERE+id+%3D+%3F&arg=1'
//! ```
//!

pub mod config;
pub mod endpoint;
pub mod errors;
pub mod server;

pub use config::{ServerConfig, parse_config, parse_config_str};
pub use endpoint::{QueryEndpoint, QueryRequest, Reply};
pub use errors::ServerError;
pub use server::{serve, serve_listener};
