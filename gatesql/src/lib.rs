//!
//! # gatesql - Generic data access over embedded SQLite
//!
//! Materializes query results into caller-declared shapes, applies ordered
//! migrations exactly once, and gates a second connection behind a
//! read-only authorizer so it can be handed to untrusted callers.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use gatesql::{Database, DatabaseConfig, Json, query, read_migrations};
//! use indexmap::IndexMap;
//!
//! let mut db = Database::new(DatabaseConfig::new("app.db").with_read_only(true));
//! db.open(&read_migrations("migrations")?)?;
//!
//! #[derive(serde::Deserialize)]
//! struct User { id: i64, name: String }
//!
//! let users: Vec<User> = query(db.read_write()?, "SELECT id, name FROM users", [])?;
//! let rows: Vec<IndexMap<String, Json>> = query(db.read_only()?, "SELECT * FROM users", [])?;
//! ```
//!
//! Record fields bind to columns by exact, case-sensitive name.
//!

pub mod authorizer;
pub mod coerce;
pub mod config;
pub mod database;
pub mod errors;
pub mod functions;
pub mod json;
pub mod materialize;
pub mod migrate;
pub mod query;
pub mod shape;

pub use config::{DatabaseConfig, parse_config, parse_config_str};
pub use database::{Access, Database, Handle, Opener};
pub use errors::{ConversionError, Error};
pub use json::Json;
pub use materialize::{QueryResult, materialize};
pub use migrate::{MigrationRecord, Migrations, Migrator, read_migrations};
pub use query::{Conflict, Connection, ExecResult, exec, fetch, insert, query, query_into};
pub use shape::TargetShape;
