//! Fetched rows and column metadata.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::types::TypeCode;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

/// One entry of a cursor's `description`.
///
/// DB-API describes a column with a 7-tuple; only the name and type code
/// are ever known for this engine, the remaining five slots are always
/// empty and are not represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    /// Best-effort classification; `None` when nothing could be inferred.
    pub type_code: Option<TypeCode>,
}

/// Column metadata shared across all rows in a result set.
///
/// This struct is wrapped in `Arc` so all rows from the same query share
/// the same column information.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column names in order
    names: Vec<String>,
    /// Name -> index mapping; the first column wins on duplicates
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column names.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get the name of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Get all column names.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a query.
///
/// Rows behave like tuples: positional access is primary, with name-based
/// lookup through the shared column metadata.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a typed value by column index.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!(
                    "index {} out of bounds (row has {} columns)",
                    index,
                    self.len()
                ),
                column: None,
            })
        })?;
        T::from_value(value)
    }

    /// Get a typed value by column name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Consume the row, keeping only its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

/// Rows compare by value, like tuples.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl PartialEq<Vec<Value>> for Row {
    fn eq(&self, other: &Vec<Value>) -> bool {
        &self.values == other
    }
}

/// Trait for converting from a `Value` to a typed value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

macro_rules! narrow_int_from_value {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                let v = value
                    .as_i64()
                    .ok_or_else(|| mismatch(stringify!($ty), value))?;
                <$ty>::try_from(v).map_err(|_| {
                    Error::Type(TypeError {
                        expected: stringify!($ty),
                        actual: format!("value {} out of range", v),
                        column: None,
                    })
                })
            }
        }
    )*};
}

narrow_int_from_value!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Custom(c) => c
                .downcast_ref::<serde_json::Value>()
                .cloned()
                .ok_or_else(|| mismatch("JSON", value)),
            Value::Text(s) => Ok(serde_json::from_str(s)?),
            _ => Err(mismatch("JSON", value)),
        }
    }
}
