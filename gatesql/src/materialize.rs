//!
//! Result Materializer
//!
//! Turns an untyped `QueryResult` into a sequence of caller-declared
//! elements. The binding between columns and the element is computed once
//! per result from its `TargetShape`, then every row is decoded by passing
//! each scanned cell through the coercion layer.
//!
//! - Record: each column binds to the same-named field or is discarded.
//!   When a column name repeats, the last occurrence wins.
//! - Mapping: every column becomes an entry; repeated names overwrite
//!   earlier entries in column order.
//! - Scalar: the result must have exactly one column.
//!
//! Rows are appended in the order the engine returned them.
//!

use rusqlite::types::{Value, ValueRef};
use serde::de::value::StrDeserializer;
use serde::de::{
    DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, Visitor,
};
use serde::forward_to_deserialize_any;

use crate::coerce::{self, Cell};
use crate::errors::{ConversionError, Error};
use crate::shape::TargetShape;

/// Column names paired with rows of untyped scalars aligned to them.
///
/// A row whose width differs from `columns` fails materialization with a
/// shape error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Decode every row into a fresh vector of `T`.
    pub fn materialize<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        let mut out = Vec::with_capacity(self.rows.len());
        materialize(self, TargetShape::of::<T>()?, &mut out)?;
        Ok(out)
    }
}

/// Append one `T` per row of `result` to `out`.
pub fn materialize<T: DeserializeOwned>(
    result: &QueryResult,
    shape: TargetShape,
    out: &mut Vec<T>,
) -> Result<(), Error> {
    let binding = Binding::new::<T>(&result.columns, shape)?;
    out.reserve(result.rows.len());
    for (n, row) in result.rows.iter().enumerate() {
        if row.len() != result.columns.len() {
            return Err(Error::shape::<T>(format!(
                "row {} has {} values for {} columns",
                n,
                row.len(),
                result.columns.len()
            )));
        }
        out.push(binding.decode(&result.columns, row)?);
    }
    Ok(())
}

enum Binding {
    /// Indices of the columns that feed the element, in column order.
    Columns(Vec<usize>),
    Scalar,
}

impl Binding {
    fn new<T>(columns: &[String], shape: TargetShape) -> Result<Self, Error> {
        match shape {
            TargetShape::Record(fields) => {
                let bound = columns
                    .iter()
                    .enumerate()
                    .filter(|(i, name)| {
                        fields.contains(&name.as_str())
                            && !columns[i + 1..].iter().any(|later| later == *name)
                    })
                    .map(|(i, _)| i)
                    .collect();
                Ok(Binding::Columns(bound))
            }
            TargetShape::Mapping => Ok(Binding::Columns((0..columns.len()).collect())),
            TargetShape::Scalar if columns.len() == 1 => Ok(Binding::Scalar),
            TargetShape::Scalar => Err(Error::shape::<T>(format!(
                "a scalar element needs exactly one column, the query returned {}",
                columns.len()
            ))),
        }
    }

    fn decode<T: DeserializeOwned>(&self, columns: &[String], row: &[Value]) -> Result<T, Error> {
        match self {
            Binding::Scalar => Ok(coerce::coerce(ValueRef::from(&row[0]), &columns[0])?),
            Binding::Columns(indices) => Ok(T::deserialize(RowDeserializer {
                columns,
                row,
                indices,
            })?),
        }
    }
}

/// Presents the bound cells of one row as a map keyed by column name.
struct RowDeserializer<'a> {
    columns: &'a [String],
    row: &'a [Value],
    indices: &'a [usize],
}

impl<'de> Deserializer<'de> for RowDeserializer<'_> {
    type Error = ConversionError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(RowAccess {
            columns: self.columns,
            row: self.row,
            indices: self.indices.iter(),
            pending: None,
        })
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct enum
        identifier ignored_any
    }
}

struct RowAccess<'a> {
    columns: &'a [String],
    row: &'a [Value],
    indices: std::slice::Iter<'a, usize>,
    pending: Option<usize>,
}

impl<'de> MapAccess<'de> for RowAccess<'_> {
    type Error = ConversionError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.indices.next() {
            Some(&index) => {
                self.pending = Some(index);
                let key: StrDeserializer<'_, ConversionError> =
                    self.columns[index].as_str().into_deserializer();
                seed.deserialize(key).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let index = self
            .pending
            .take()
            .ok_or_else(|| ConversionError::new("value requested before key"))?;
        let column = &self.columns[index];
        let raw = ValueRef::from(&self.row[index]);
        let json = coerce::raw_to_json(raw).map_err(|e| e.at(column, coerce::describe(raw)))?;
        seed.deserialize(Cell(json))
            .map_err(|e| ConversionError::new(e.to_string()).at(column, coerce::describe(raw)))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.indices.len())
    }
}
