//!
//! Target Shape
//!
//! The destination family for query rows, derived once from the element
//! type's `Deserialize` implementation:
//!
//! - `Record(fields)` for types deserialized as a struct. Columns bind to
//!   fields by exact, case-sensitive name; nothing else (no renaming by
//!   case convention) is attempted. Fields missing from the result take
//!   their `#[serde(default)]` value.
//! - `Mapping` for maps and untyped values (`serde_json::Value`,
//!   `HashMap<String, V>`, `IndexMap<String, V>`): one entry per column.
//! - `Scalar` for everything else: one value from the single column.
//!
//! `Option<T>`, `Box<T>` and newtype wrappers take the shape of `T`.
//!

use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};

use crate::errors::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    Record(&'static [&'static str]),
    Mapping,
    Scalar,
}

impl TargetShape {
    /// Inspect `T` without deserializing any data.
    pub fn of<T: DeserializeOwned>() -> Result<Self, Error> {
        let mut found = None;
        let _ = T::deserialize(Probe { found: &mut found });
        match found {
            Some(Probed::Shape(shape)) => Ok(shape),
            Some(Probed::Unusable(reason)) => Err(Error::shape::<T>(reason)),
            None => Err(Error::shape::<T>("its Deserialize impl never requests data")),
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, TargetShape::Record(_))
    }
}

enum Probed {
    Shape(TargetShape),
    Unusable(&'static str),
}

/// Raised by the probe as soon as the shape is known.
#[derive(Debug)]
struct Halt;

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("shape probe halted")
    }
}

impl std::error::Error for Halt {}

impl de::Error for Halt {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Halt
    }
}

struct Probe<'a> {
    found: &'a mut Option<Probed>,
}

impl Probe<'_> {
    fn record<T>(self, probed: Probed) -> Result<T, Halt> {
        *self.found = Some(probed);
        Err(Halt)
    }
}

macro_rules! probe_scalar {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Halt> {
                self.record(Probed::Shape(TargetShape::Scalar))
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Probe<'_> {
    type Error = Halt;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Halt> {
        self.record(Probed::Shape(TargetShape::Mapping))
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Halt> {
        self.record(Probed::Shape(TargetShape::Mapping))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Halt> {
        self.record(Probed::Shape(TargetShape::Record(fields)))
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Halt> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Halt> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Halt> {
        self.record(Probed::Unusable("unit values hold no column data"))
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Halt> {
        self.record(Probed::Unusable("unit structs hold no column data"))
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Halt> {
        self.record(Probed::Unusable("ignored values hold no column data"))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value, Halt> {
        self.record(Probed::Shape(TargetShape::Scalar))
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Halt> {
        self.record(Probed::Shape(TargetShape::Scalar))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Halt> {
        self.record(Probed::Shape(TargetShape::Scalar))
    }

    probe_scalar! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_bytes deserialize_byte_buf deserialize_seq
        deserialize_identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde::Deserialize;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct User {
        id: i64,
        name: String,
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct Wrapper(User);

    #[test]
    fn test_record_shape_lists_fields() {
        assert_eq!(
            TargetShape::of::<User>().unwrap(),
            TargetShape::Record(&["id", "name"])
        );
    }

    #[test]
    fn test_wrappers_take_inner_shape() {
        assert!(TargetShape::of::<Option<User>>().unwrap().is_record());
        assert!(TargetShape::of::<Box<User>>().unwrap().is_record());
        assert!(TargetShape::of::<Wrapper>().unwrap().is_record());
        assert_eq!(TargetShape::of::<Option<i64>>().unwrap(), TargetShape::Scalar);
    }

    #[test]
    fn test_mapping_shapes() {
        assert_eq!(TargetShape::of::<HashMap<String, i64>>().unwrap(), TargetShape::Mapping);
        assert_eq!(TargetShape::of::<BTreeMap<String, String>>().unwrap(), TargetShape::Mapping);
        assert_eq!(
            TargetShape::of::<IndexMap<String, serde_json::Value>>().unwrap(),
            TargetShape::Mapping
        );
        assert_eq!(TargetShape::of::<serde_json::Value>().unwrap(), TargetShape::Mapping);
    }

    #[test]
    fn test_scalar_shapes() {
        assert_eq!(TargetShape::of::<i64>().unwrap(), TargetShape::Scalar);
        assert_eq!(TargetShape::of::<String>().unwrap(), TargetShape::Scalar);
        assert_eq!(TargetShape::of::<f64>().unwrap(), TargetShape::Scalar);
        assert_eq!(TargetShape::of::<bool>().unwrap(), TargetShape::Scalar);
        assert_eq!(TargetShape::of::<Vec<i64>>().unwrap(), TargetShape::Scalar);
    }

    #[test]
    fn test_unit_is_rejected_with_type_name() {
        match TargetShape::of::<()>() {
            Err(Error::Shape { type_name, .. }) => assert_eq!(type_name, "()"),
            other => panic!("Expected shape error, got {:?}", other),
        }
    }
}
