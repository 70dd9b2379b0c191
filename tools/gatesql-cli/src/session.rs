//! Runs statements against an open database and prints their results.

use std::io::Write;
use std::time::Instant;

use tracing::debug;

use gatesql::{Access, Database, Handle, fetch};

use crate::errors::CliError;
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Table,
    Json,
}

pub struct Session {
    db: Database,
    access: Access,
    format: Format,
    debug: bool,
}

impl Session {
    pub fn new(db: Database, access: Access, format: Format, debug: bool) -> Self {
        Self {
            db,
            access,
            format,
            debug,
        }
    }

    fn handle(&self) -> Result<&Handle, CliError> {
        Ok(match self.access {
            Access::ReadWrite => self.db.read_write()?,
            Access::ReadOnly => self.db.read_only()?,
        })
    }

    /// Run one statement, writing its rows to `out` and diagnostics to stderr.
    pub fn execute(&self, sql: &str, out: &mut impl Write) -> Result<(), CliError> {
        let handle = self.handle()?;
        let start = Instant::now();

        if self.debug {
            let plan = fetch(handle, &format!("EXPLAIN QUERY PLAN {}", sql), [])?;
            eprint!("{}", with_newline(output::render_table(&plan)));
        }

        let result = fetch(handle, sql, [])?;
        let rendered = match self.format {
            Format::Table => with_newline(output::render_table(&result)),
            Format::Json => output::render_json(&result)?,
        };
        out.write_all(rendered.as_bytes())?;
        out.flush()?;

        let elapsed = start.elapsed();
        debug!(rows = result.len(), ?elapsed, "Statement finished");
        if self.debug {
            eprintln!(r#"{{"time": "{:?}"}}"#, elapsed);
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<(), CliError> {
        self.db.close()?;
        Ok(())
    }
}

fn with_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// The query behind `.schema TABLE`.
pub fn schema_query(table: &str) -> String {
    format!(
        "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info('{}')",
        table.replace('\'', "''")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatesql::{DatabaseConfig, Migrations};

    fn session(format: Format) -> Session {
        let mut migrations = Migrations::new();
        migrations.insert(
            "0001".to_string(),
            "CREATE TABLE kv (k TEXT, v TEXT); INSERT INTO kv VALUES ('a', '[1,2]');".to_string(),
        );
        let mut db = Database::new(DatabaseConfig::default());
        db.open(&migrations).unwrap();
        Session::new(db, Access::ReadWrite, format, false)
    }

    #[test]
    fn test_execute_table() {
        let session = session(Format::Table);
        let mut out = Vec::new();
        session.execute("SELECT k, v FROM kv", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains('k') && text.contains("[1,2]"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_execute_json() {
        let session = session(Format::Json);
        let mut out = Vec::new();
        session.execute("SELECT k, v FROM kv", &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, serde_json::json!({"k": "a", "v": [1, 2]}));
    }

    #[test]
    fn test_execute_statement_without_rows() {
        let session = session(Format::Table);
        let mut out = Vec::new();
        session.execute("INSERT INTO kv VALUES ('b', 'c')", &mut out).unwrap();
        assert!(out.is_empty());
        session.execute("SELECT count(*) AS n FROM kv", &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains('2'));
    }

    #[test]
    fn test_schema_query() {
        let session = session(Format::Table);
        let mut out = Vec::new();
        session.execute(&schema_query("kv"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("TEXT"));
        assert!(schema_query("o'k").contains("'o''k'"));
    }
}
