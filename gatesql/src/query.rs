//!
//! Query/Exec Facade
//!
//! Uniform entry points for anything holding an engine connection:
//!
//! - `fetch(conn, sql, params)` - run a query into an untyped `QueryResult`
//! - `query(conn, sql, params)` - run a query and materialize `Vec<T>`
//! - `query_into(conn, sql, &mut out, params)` - same, appending to `out`
//! - `exec(conn, sql, params)` - run a statement without a row result
//! - `insert(conn, table, &value, conflict)` - single-row insert from a
//!   record or mapping
//!
//! Engine failures are wrapped with the SQL text. The statement and its
//! row cursor are dropped before each function returns, on every path.
//!

use rusqlite::types::Value;
use rusqlite::{Params, ToSql};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::database::Access;
use crate::errors::Error;
use crate::materialize::{self, QueryResult};
use crate::shape::TargetShape;

/// A holder of an engine connection.
pub trait Connection {
    fn sqlite(&self) -> &rusqlite::Connection;

    fn access(&self) -> Access {
        Access::ReadWrite
    }
}

impl Connection for rusqlite::Connection {
    fn sqlite(&self) -> &rusqlite::Connection {
        self
    }
}

impl Connection for rusqlite::Transaction<'_> {
    fn sqlite(&self) -> &rusqlite::Connection {
        self
    }
}

/// Outcome of a statement without a row result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// What `insert` does when the row violates a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conflict {
    #[default]
    Abort,
    Ignore,
    Replace,
}

impl Conflict {
    fn clause(self) -> &'static str {
        match self {
            Conflict::Abort => "INSERT",
            Conflict::Ignore => "INSERT OR IGNORE",
            Conflict::Replace => "INSERT OR REPLACE",
        }
    }
}

pub fn fetch<C, P>(conn: &C, sql: &str, params: P) -> Result<QueryResult, Error>
where
    C: Connection + ?Sized,
    P: Params,
{
    fetch_rows(conn.sqlite(), sql, params).map_err(|e| Error::engine(sql, e))
}

fn fetch_rows<P: Params>(
    conn: &rusqlite::Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut result = QueryResult::new(columns);
    let mut rows = stmt.query(params)?;
    while let Some(row) = rows.next()? {
        let mut slots = Vec::with_capacity(width);
        for i in 0..width {
            slots.push(row.get::<_, Value>(i)?);
        }
        result.rows.push(slots);
    }
    Ok(result)
}

/// Run `sql` and materialize every row into `T`.
///
/// Record targets bind columns to fields by exact name. A field with no
/// matching column falls back to its `#[serde(default)]` value; without
/// one the row fails with a conversion error naming the missing field.
/// Columns with no matching field are skipped.
pub fn query<T, C, P>(conn: &C, sql: &str, params: P) -> Result<Vec<T>, Error>
where
    T: DeserializeOwned,
    C: Connection + ?Sized,
    P: Params,
{
    let mut out = Vec::new();
    query_into(conn, sql, &mut out, params)?;
    Ok(out)
}

pub fn query_into<T, C, P>(conn: &C, sql: &str, out: &mut Vec<T>, params: P) -> Result<(), Error>
where
    T: DeserializeOwned,
    C: Connection + ?Sized,
    P: Params,
{
    let shape = TargetShape::of::<T>()?;
    let result = fetch(conn, sql, params)?;
    materialize::materialize(&result, shape, out)
}

pub fn exec<C, P>(conn: &C, sql: &str, params: P) -> Result<ExecResult, Error>
where
    C: Connection + ?Sized,
    P: Params,
{
    require_write(conn, "exec")?;
    let db = conn.sqlite();
    let rows_affected = db.execute(sql, params).map_err(|e| Error::engine(sql, e))?;
    Ok(ExecResult {
        rows_affected,
        last_insert_id: db.last_insert_rowid(),
    })
}

/// Insert one row whose columns are the keys of `value`.
///
/// `table` is quoted as a single identifier, so a schema-qualified name
/// such as `main.users` is not split.
///
/// Records contribute their serialized fields, mappings their keys. Nested
/// objects and arrays are stored as JSON text. Column order follows the
/// value's own serialization order and carries no meaning.
pub fn insert<C, V>(conn: &C, table: &str, value: &V, conflict: Conflict) -> Result<ExecResult, Error>
where
    C: Connection + ?Sized,
    V: Serialize + ?Sized,
{
    require_write(conn, "insert")?;
    let fields = match serde_json::to_value(value) {
        Ok(JsonValue::Object(fields)) => fields,
        _ => {
            return Err(Error::Type {
                type_name: std::any::type_name::<V>(),
            });
        }
    };

    let table = quote_identifier(table);
    if fields.is_empty() {
        let sql = format!("{} INTO {} DEFAULT VALUES", conflict.clause(), table);
        return exec(conn, &sql, []);
    }

    let mut columns = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for (key, field) in fields {
        columns.push(quote_identifier(&key));
        values.push(json_to_sql(field));
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    let sql = format!(
        "{} INTO {} ({}) VALUES ({})",
        conflict.clause(),
        table,
        columns.join(", "),
        placeholders
    );
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
    exec(conn, &sql, params.as_slice())
}

fn json_to_sql(value: JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Integer(i64::from(b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Text(s),
        composite @ (JsonValue::Object(_) | JsonValue::Array(_)) => Value::Text(composite.to_string()),
    }
}

pub(crate) fn require_write<C: Connection + ?Sized>(conn: &C, operation: &'static str) -> Result<(), Error> {
    match conn.access() {
        Access::ReadWrite => Ok(()),
        Access::ReadOnly => Err(Error::Capability {
            operation,
            required: Access::ReadWrite,
        }),
    }
}

/// Quote an SQL identifier with double quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    fn memory() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT UNIQUE, meta TEXT);",
        )
        .unwrap();
        conn
    }

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    #[serde(default)]
    struct User {
        id: i64,
        name: String,
        meta: Option<serde_json::Value>,
    }

    #[test]
    fn test_query_wraps_engine_error_with_sql() {
        let conn = memory();
        let err = query::<i64, _, _>(&conn, "SELECT nope FROM users", []).unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
        assert!(err.to_string().starts_with("SELECT nope FROM users: "));
    }

    #[test]
    fn test_query_rejects_unusable_target_before_running() {
        let conn = memory();
        let err = query::<(), _, _>(&conn, "DROP TABLE users", []).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
        let count: Vec<i64> = query(&conn, "SELECT count(*) FROM sqlite_master WHERE name = 'users'", []).unwrap();
        assert_eq!(count, vec![1]);
    }

    #[test]
    fn test_query_with_positional_args() {
        let conn = memory();
        exec(&conn, "INSERT INTO users (id, name) VALUES (?1, ?2)", rusqlite::params![1, "ada"]).unwrap();
        exec(&conn, "INSERT INTO users (id, name) VALUES (?1, ?2)", rusqlite::params![2, "bob"]).unwrap();
        let names: Vec<String> =
            query(&conn, "SELECT name FROM users WHERE id > ? ORDER BY id", [0]).unwrap();
        assert_eq!(names, vec!["ada", "bob"]);
    }

    #[test]
    fn test_query_into_appends() {
        let conn = memory();
        let mut out = vec![0i64];
        query_into(&conn, "SELECT 1 UNION ALL SELECT 2", &mut out, []).unwrap();
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn test_exec_reports_affected_rows() {
        let conn = memory();
        let res = exec(&conn, "INSERT INTO users (name) VALUES ('a'), ('b')", []).unwrap();
        assert_eq!(res.rows_affected, 2);
        assert_eq!(res.last_insert_id, 2);
        let err = exec(&conn, "UPDATE nowhere SET x = 1", []).unwrap_err();
        assert!(err.to_string().starts_with("UPDATE nowhere SET x = 1: "));
    }

    #[test]
    fn test_insert_record_encodes_nested_json() {
        let conn = memory();
        let user = User {
            id: 1,
            name: "ada".to_string(),
            meta: Some(serde_json::json!({"langs": ["en", "fr"]})),
        };
        insert(&conn, "users", &user, Conflict::Abort).unwrap();
        let raw: Vec<String> = query(&conn, "SELECT meta FROM users", []).unwrap();
        assert_eq!(raw, vec![r#"{"langs":["en","fr"]}"#]);
        let back: Vec<User> = query(&conn, "SELECT * FROM users", []).unwrap();
        assert_eq!(back, vec![user]);
    }

    #[test]
    fn test_insert_mapping() {
        let conn = memory();
        let mut row = BTreeMap::new();
        row.insert("name", serde_json::json!("lin"));
        row.insert("id", serde_json::json!(9));
        let res = insert(&conn, "users", &row, Conflict::Abort).unwrap();
        assert_eq!(res.rows_affected, 1);
        let ids: Vec<i64> = query(&conn, "SELECT id FROM users WHERE name = 'lin'", []).unwrap();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn test_insert_conflict_policies() {
        let conn = memory();
        let first = User { id: 1, name: "ada".to_string(), meta: None };
        insert(&conn, "users", &first, Conflict::Abort).unwrap();

        let clash = User { id: 2, name: "ada".to_string(), meta: Some(serde_json::json!(1)) };
        let ignored = insert(&conn, "users", &clash, Conflict::Ignore).unwrap();
        assert_eq!(ignored.rows_affected, 0);
        let rows: Vec<User> = query(&conn, "SELECT * FROM users", []).unwrap();
        assert_eq!(rows, vec![first]);

        let err = insert(&conn, "users", &clash, Conflict::Abort).unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));

        insert(&conn, "users", &clash, Conflict::Replace).unwrap();
        let ids: Vec<i64> = query(&conn, "SELECT id FROM users", []).unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_insert_rejects_non_record() {
        let conn = memory();
        match insert(&conn, "users", &42i64, Conflict::Abort) {
            Err(Error::Type { type_name }) => assert_eq!(type_name, "i64"),
            other => panic!("Expected type error, got {:?}", other),
        }
        assert!(matches!(
            insert(&conn, "users", &vec![1, 2], Conflict::Abort),
            Err(Error::Type { .. })
        ));
    }

    #[test]
    fn test_insert_empty_record_uses_defaults() {
        let conn = memory();
        let empty: BTreeMap<String, i64> = BTreeMap::new();
        insert(&conn, "users", &empty, Conflict::Abort).unwrap();
        let count: Vec<i64> = query(&conn, "SELECT count(*) FROM users", []).unwrap();
        assert_eq!(count, vec![1]);
    }

    #[test]
    fn test_insert_quotes_table_name() {
        let conn = memory();
        conn.execute_batch(r#"CREATE TABLE "order items" (sku TEXT)"#).unwrap();
        let mut row = BTreeMap::new();
        row.insert("sku".to_string(), "a-1".to_string());
        insert(&conn, "order items", &row, Conflict::Abort).unwrap();
        let skus: Vec<String> = query(&conn, r#"SELECT sku FROM "order items""#, []).unwrap();
        assert_eq!(skus, vec!["a-1"]);

        let err = insert(&conn, "users; DROP TABLE users", &row, Conflict::Abort).unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
        let count: Vec<i64> = query(&conn, "SELECT count(*) FROM users", []).unwrap();
        assert_eq!(count, vec![0]);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("name"), "\"name\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
