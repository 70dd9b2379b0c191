//!
//! Migration Engine
//!
//! Keeps a ledger relation of applied migration names inside the governed
//! database and applies every source not yet in the ledger, in
//! lexicographic name order. Each migration body and its ledger row are
//! committed together in one transaction; the first failure stops the run
//! and leaves earlier migrations committed.
//!
//! Name order is the only ordering guarantee, so sources should carry
//! zero-padded prefixes (`0001_init.sql`, `0002_users.sql`, ...).
//!

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::DEFAULT_MIGRATIONS_TABLE;
use crate::errors::Error;
use crate::query::{exec, query, quote_identifier};

/// Migration sources keyed by name, iterated in name order.
pub type Migrations = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationRecord {
    pub name: String,
    pub applied_at: String,
}

#[derive(Debug, Clone)]
pub struct Migrator {
    table: String,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATIONS_TABLE)
    }
}

impl Migrator {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Apply every pending source and return the names applied by this run.
    pub fn run(&self, conn: &mut rusqlite::Connection, sources: &Migrations) -> Result<Vec<String>, Error> {
        self.ensure_ledger(conn)?;
        let applied: HashSet<String> = self.applied_names(conn)?.into_iter().collect();
        let pending: Vec<(&String, &String)> = sources
            .iter()
            .filter(|(name, _)| !applied.contains(*name))
            .collect();
        debug!(
            table = %self.table,
            applied = applied.len(),
            pending = pending.len(),
            "Migration ledger loaded"
        );

        let mut ran = Vec::with_capacity(pending.len());
        for (name, body) in pending {
            self.apply(conn, name, body).map_err(|source| Error::Migration {
                name: name.clone(),
                source: Box::new(source),
            })?;
            info!(migration = %name, "Applied migration");
            ran.push(name.clone());
        }
        Ok(ran)
    }

    /// Ledger rows in name order.
    pub fn applied(&self, conn: &rusqlite::Connection) -> Result<Vec<MigrationRecord>, Error> {
        self.ensure_ledger(conn)?;
        let sql = format!(
            "SELECT name, CAST(applied_at AS TEXT) AS applied_at FROM {} ORDER BY name",
            quote_identifier(&self.table)
        );
        query(conn, &sql, [])
    }

    fn ensure_ledger(&self, conn: &rusqlite::Connection) -> Result<(), Error> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (name TEXT, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
            quote_identifier(&self.table)
        );
        exec(conn, &sql, [])?;
        Ok(())
    }

    fn applied_names(&self, conn: &rusqlite::Connection) -> Result<Vec<String>, Error> {
        let sql = format!("SELECT name FROM {}", quote_identifier(&self.table));
        query(conn, &sql, [])
    }

    fn apply(&self, conn: &mut rusqlite::Connection, name: &str, body: &str) -> Result<(), Error> {
        let tx = conn.transaction().map_err(|e| Error::engine("BEGIN", e))?;
        tx.execute_batch(body).map_err(|e| Error::engine(body, e))?;
        let sql = format!("INSERT INTO {} (name) VALUES (?1)", quote_identifier(&self.table));
        exec(&tx, &sql, [name])?;
        tx.commit().map_err(|e| Error::engine("COMMIT", e))
    }
}

/// Collect every `*.sql` file directly inside `dir`, keyed by file name.
pub fn read_migrations(dir: impl AsRef<Path>) -> Result<Migrations, Error> {
    let mut sources = Migrations::new();
    for entry in WalkDir::new(dir.as_ref()).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "sql") {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        sources.insert(name, std::fs::read_to_string(path)?);
    }
    debug!(dir = %dir.as_ref().display(), count = sources.len(), "Read migration sources");
    Ok(sources)
}
