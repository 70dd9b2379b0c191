///
/// Error types for every gatesql operation.
///
/// Engine failures always carry the SQL text that was rejected. Shape, type
/// and capability errors describe caller misuse and are raised before the
/// engine is touched. Conversion errors name the column and raw value that
/// could not be coerced into the requested element type.
///

use std::fmt;

use thiserror::Error;

use crate::database::Access;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{sql}: {source}")]
    Engine {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot materialize query results into {type_name}: {reason}")]
    Shape {
        type_name: &'static str,
        reason: String,
    },

    #[error("{0}")]
    Conversion(#[from] ConversionError),

    #[error("cannot insert {type_name}: expected a record or a mapping")]
    Type { type_name: &'static str },

    #[error("database is already open")]
    AlreadyOpen,

    #[error("database is not open")]
    NotOpen,

    #[error("{operation} requires a {required} connection")]
    Capability {
        operation: &'static str,
        required: Access,
    },

    #[error("migration '{name}' failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn engine(sql: &str, source: rusqlite::Error) -> Self {
        Error::Engine {
            sql: sql.to_string(),
            source,
        }
    }

    pub(crate) fn shape<T: ?Sized>(reason: impl Into<String>) -> Self {
        Error::Shape {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// True when the engine refused the statement through the authorizer.
    pub fn is_authorization_denied(&self) -> bool {
        match self {
            Error::Engine { source, .. } => matches!(
                source.sqlite_error_code(),
                Some(rusqlite::ErrorCode::AuthorizationForStatementDenied)
            ),
            Error::Migration { source, .. } => source.is_authorization_denied(),
            _ => false,
        }
    }
}

/// A scalar that could not be coerced into its destination.
///
/// Row-level failures (a missing record field, for instance) have no
/// column; failures while reading a single cell name both the column and
/// the raw value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionError {
    pub column: Option<String>,
    pub value: Option<String>,
    pub reason: String,
}

impl ConversionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            column: None,
            value: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn at(mut self, column: &str, value: String) -> Self {
        if self.column.is_none() {
            self.column = Some(column.to_string());
            self.value = Some(value);
        }
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.column, &self.value) {
            (Some(column), Some(value)) => write!(
                f,
                "cannot convert {} in column '{}': {}",
                value, column, self.reason
            ),
            (Some(column), None) => write!(f, "cannot convert column '{}': {}", column, self.reason),
            _ => write!(f, "cannot convert row: {}", self.reason),
        }
    }
}

impl std::error::Error for ConversionError {}

impl serde::de::Error for ConversionError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ConversionError::new(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::Shape {
            type_name: "()",
            reason: "unit has no fields".to_string(),
        };
        assert!(err.to_string().contains("cannot materialize"));
        assert!(err.to_string().contains("()"));

        let err = Error::Type { type_name: "i64" };
        assert!(err.to_string().contains("i64"));
        assert!(err.to_string().contains("record or a mapping"));

        let err = Error::Capability {
            operation: "exec",
            required: Access::ReadWrite,
        };
        assert!(err.to_string().contains("exec"));
        assert!(err.to_string().contains("read-write"));

        let err = Error::Migration {
            name: "0001_init.sql".to_string(),
            source: Box::new(Error::NotOpen),
        };
        assert!(err.to_string().contains("0001_init.sql"));
        assert!(err.to_string().contains("not open"));

        let err = Error::engine("SELECT nope", rusqlite::Error::InvalidQuery);
        assert!(err.to_string().starts_with("SELECT nope: "));
    }

    #[test]
    fn test_conversion_error_display() {
        let err = ConversionError::new("invalid type: string \"x\", expected i64")
            .at("age", "\"x\"".to_string());
        let msg = err.to_string();
        assert!(msg.contains("column 'age'"));
        assert!(msg.contains("\"x\""));
        assert!(msg.contains("expected i64"));

        let err = ConversionError::new("missing field `id`");
        assert_eq!(err.to_string(), "cannot convert row: missing field `id`");
    }

    #[test]
    fn test_conversion_error_keeps_innermost_column() {
        let err = ConversionError::new("bad")
            .at("inner", "1".to_string())
            .at("outer", "2".to_string());
        assert_eq!(err.column.as_deref(), Some("inner"));
        assert_eq!(err.value.as_deref(), Some("1"));
    }
}
