//!
//! Read-only statement authorizer.
//!
//! Installed on every read-only handle and consulted by the engine for each
//! action a statement is about to perform. Reads, selects, recursive CTEs
//! and function calls pass; a short list of introspection pragmas passes;
//! everything else is denied, including pragma writes and ATTACH.
//!

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};

/// Pragmas a read-only handle may run, with or without an argument.
const INTROSPECTION_PRAGMAS: &[&str] = &[
    "table_info",
    "table_xinfo",
    "table_list",
    "index_list",
    "index_info",
    "data_version",
];

/// Pragmas a read-only handle may only read (no argument).
const READ_ONLY_PRAGMAS: &[&str] = &["user_version"];

pub fn read_only(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Select
        | AuthAction::Read { .. }
        | AuthAction::Function { .. }
        | AuthAction::Recursive => Authorization::Allow,
        AuthAction::Pragma {
            pragma_name,
            pragma_value,
        } => pragma(pragma_name, pragma_value),
        _ => Authorization::Deny,
    }
}

fn pragma(name: &str, value: Option<&str>) -> Authorization {
    let listed = |list: &[&str]| list.iter().any(|p| p.eq_ignore_ascii_case(name));
    if listed(INTROSPECTION_PRAGMAS) || (value.is_none() && listed(READ_ONLY_PRAGMAS)) {
        Authorization::Allow
    } else {
        Authorization::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pragma_allow_list() {
        assert_eq!(pragma("table_info", Some("users")), Authorization::Allow);
        assert_eq!(pragma("TABLE_INFO", Some("users")), Authorization::Allow);
        assert_eq!(pragma("data_version", None), Authorization::Allow);
        assert_eq!(pragma("user_version", None), Authorization::Allow);
    }

    #[test]
    fn test_pragma_writes_denied() {
        assert_eq!(pragma("user_version", Some("3")), Authorization::Deny);
        assert_eq!(pragma("journal_mode", Some("WAL")), Authorization::Deny);
        assert_eq!(pragma("journal_mode", None), Authorization::Deny);
        assert_eq!(pragma("writable_schema", Some("1")), Authorization::Deny);
    }
}
