//!
//! Type Coercion Layer
//!
//! Converts an engine-native scalar into a caller-requested Rust type by
//! encoding the raw value as JSON and decoding that JSON into the target.
//! Numeric widening, string targets and nested structures therefore all
//! follow the target type's own `Deserialize` rules.
//!
//! ## Conversion semantics
//!
//! - NULL becomes `null`, INTEGER and REAL become JSON numbers, TEXT
//!   becomes a JSON string. A REAL with no fractional part that fits an
//!   `i64` is encoded as an integer, so `2.0 * 3` decodes into integer
//!   targets as well as float ones.
//! - BLOB becomes a base64 string. Bytes do not survive the round trip
//!   into anything but a string target.
//! - Non-finite REAL values cannot be encoded and are rejected.
//! - A TEXT value that is itself a complete JSON object or array is parsed
//!   before decoding when the target is untyped (`serde_json::Value`,
//!   `Json`) or composite (struct, map, sequence). String targets always
//!   receive the raw text; text that does not parse passes through as a
//!   plain string.
//!

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rusqlite::types::ValueRef;
use serde::de::{DeserializeOwned, Deserializer, Visitor};
use serde_json::Value as JsonValue;

use crate::errors::ConversionError;

/// Encode a raw engine scalar as JSON.
pub fn raw_to_json(value: ValueRef<'_>) -> Result<JsonValue, ConversionError> {
    match value {
        ValueRef::Null => Ok(JsonValue::Null),
        ValueRef::Integer(i) => Ok(JsonValue::from(i)),
        ValueRef::Real(f) if is_whole(f) => Ok(JsonValue::from(f as i64)),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .ok_or_else(|| ConversionError::new(format!("{} has no JSON encoding", f))),
        ValueRef::Text(bytes) => Ok(JsonValue::String(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        ValueRef::Blob(bytes) => Ok(JsonValue::String(STANDARD.encode(bytes))),
    }
}

fn is_whole(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Render a raw scalar for error messages.
pub fn describe(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

/// Coerce one raw scalar into `T`.
pub fn coerce<T: DeserializeOwned>(value: ValueRef<'_>, column: &str) -> Result<T, ConversionError> {
    let json = raw_to_json(value).map_err(|e| e.at(column, describe(value)))?;
    T::deserialize(Cell(json))
        .map_err(|e| ConversionError::new(e.to_string()).at(column, describe(value)))
}

/// True for strings whose first and last bytes delimit a JSON object or array.
pub fn looks_like_json_document(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2
        && matches!(
            (bytes[0], bytes[bytes.len() - 1]),
            (b'{', b'}') | (b'[', b']')
        )
}

/// Parse a string holding a complete JSON object or array, or give it back.
pub fn parse_json_document(s: String) -> JsonValue {
    if !looks_like_json_document(&s) {
        return JsonValue::String(s);
    }
    match serde_json::from_str::<JsonValue>(&s) {
        Ok(parsed @ (JsonValue::Object(_) | JsonValue::Array(_))) => parsed,
        _ => JsonValue::String(s),
    }
}

/// One scanned cell, already encoded as JSON, acting as a deserializer.
pub(crate) struct Cell(pub(crate) JsonValue);

impl Cell {
    fn unwrapped(self) -> JsonValue {
        match self.0 {
            JsonValue::String(s) => parse_json_document(s),
            other => other,
        }
    }
}

macro_rules! forward_raw {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                self.0.$method(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Cell {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.unwrapped().deserialize_any(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.unwrapped().deserialize_map(visitor)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.unwrapped().deserialize_seq(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.unwrapped().deserialize_tuple(len, visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.unwrapped().deserialize_tuple_struct(name, len, visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.unwrapped().deserialize_struct(name, fields, visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            JsonValue::Null => visitor.visit_none(),
            other => visitor.visit_some(Cell(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_unit_struct(name, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_enum(name, variants, visitor)
    }

    forward_raw! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_unit
        deserialize_identifier deserialize_ignored_any
    }
}
