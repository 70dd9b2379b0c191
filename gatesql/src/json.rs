//!
//! Dynamic JSON value.
//!
//! `Json` wraps a `serde_json::Value` and, when serialized, re-reads every
//! string leaf that holds a complete JSON object or array as structure.
//! A text column storing `{"k":[1,2]}` therefore serializes as an object
//! instead of an escaped string, at any nesting depth. Strings that only
//! look like documents (`{oops}`) pass through unchanged.
//!

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::coerce::parse_json_document;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct Json(pub JsonValue);

impl Json {
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// The value with every embedded document expanded.
    pub fn expanded(&self) -> JsonValue {
        expand(&self.0)
    }
}

impl From<JsonValue> for Json {
    fn from(value: JsonValue) -> Self {
        Json(value)
    }
}

impl Serialize for Json {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.expanded().serialize(serializer)
    }
}

impl fmt::Display for Json {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expanded())
    }
}

fn expand(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => match parse_json_document(s.clone()) {
            JsonValue::String(s) => JsonValue::String(s),
            parsed => expand(&parsed),
        },
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(expand).collect()),
        JsonValue::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), expand(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expands_nested_documents() {
        let inner = json!({"tags": "[\"a\",\"b\"]"}).to_string();
        let value = Json(json!({"doc": inner, "n": 1}));
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"doc": {"tags": ["a", "b"]}, "n": 1})
        );
    }

    #[test]
    fn test_leaves_lookalikes_alone() {
        let value = Json(json!(["{oops}", "[1,2", "plain"]));
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"["{oops}","[1,2","plain"]"#
        );
    }

    #[test]
    fn test_deserialize_is_transparent() {
        let value: Json = serde_json::from_str(r#""{\"k\":1}""#).unwrap();
        assert_eq!(value.0, json!("{\"k\":1}"));
        assert_eq!(value.to_string(), r#"{"k":1}"#);
    }
}
