//! Dynamic SQL values.

use crate::error::{Error, TypeError};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A dynamically-typed value crossing the engine boundary.
///
/// The first five variants mirror the engine's storage classes. `Custom`
/// carries any other host value; it must be adapted to one of the
/// primitives before it can be bound, and it is what converters produce
/// when they build richer values from column bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Real(f64),

    /// UTF-8 text
    Text(String),

    /// Binary data
    Blob(Vec<u8>),

    /// Host value with no direct engine representation
    #[serde(skip)]
    Custom(CustomValue),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for the five engine storage classes.
    pub const fn is_primitive(&self) -> bool {
        !matches!(self, Value::Custom(_))
    }

    /// Get the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
            Value::Custom(c) => c.type_name(),
        }
    }

    /// The Rust type this value stands for, used to key adapters.
    pub fn host_type_id(&self) -> TypeId {
        match self {
            Value::Null => TypeId::of::<()>(),
            Value::Integer(_) => TypeId::of::<i64>(),
            Value::Real(_) => TypeId::of::<f64>(),
            Value::Text(_) => TypeId::of::<String>(),
            Value::Blob(_) => TypeId::of::<Vec<u8>>(),
            Value::Custom(c) => c.host_type_id(),
        }
    }

    /// View the underlying host value as `Any`, for adapter downcasts.
    pub fn as_any(&self) -> &dyn Any {
        match self {
            Value::Null => &(),
            Value::Integer(v) => v,
            Value::Real(v) => v,
            Value::Text(v) => v,
            Value::Blob(v) => v,
            Value::Custom(c) => c.as_any(),
        }
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Downcast a custom value to a concrete host type.
    pub fn as_custom<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(c) => c.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Custom(c) => write!(f, "<{}>", c.type_name()),
        }
    }
}

/// Capability for host types that know how to turn themselves into an
/// engine primitive when no adapter is registered for them.
pub trait Conform: Any + Send + Sync {
    /// Produce the primitive to bind in place of `self`.
    fn conform(&self) -> Value;
}

type ConformFn = fn(&(dyn Any + Send + Sync)) -> Option<Value>;

fn conform_thunk<T: Conform>(value: &(dyn Any + Send + Sync)) -> Option<Value> {
    value.downcast_ref::<T>().map(Conform::conform)
}

/// A host value with no direct engine representation.
///
/// Clones share the underlying value.
#[derive(Clone)]
pub struct CustomValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    conform: Option<ConformFn>,
}

impl CustomValue {
    /// Wrap a host value. Binding it requires a registered adapter.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            conform: None,
        }
    }

    /// Wrap a host value that can conform itself to a primitive.
    pub fn conforming<T: Conform>(value: T) -> Self {
        Self {
            conform: Some(conform_thunk::<T>),
            ..Self::new(value)
        }
    }

    pub fn host_type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn as_any(&self) -> &dyn Any {
        &*self.inner
    }

    /// Ask the value to conform itself, if it has that capability.
    pub fn conform(&self) -> Option<Value> {
        self.conform.and_then(|f| f(&*self.inner))
    }

    /// Whether both handles share the same underlying value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_name", &self.type_name)
            .field("conforms", &self.conform.is_some())
            .finish()
    }
}

// Conversion implementations

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl TryFrom<u64> for Value {
    type Error = Error;

    /// Fails when the value does not fit in the engine's 64-bit signed integer.
    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Value::Integer).map_err(|_| {
            Error::Type(TypeError {
                expected: "i64",
                actual: format!("u64 value {v} exceeds i64::MAX"),
                column: None,
            })
        })
    }
}

impl TryFrom<usize> for Value {
    type Error = Error;

    fn try_from(v: usize) -> Result<Self, Self::Error> {
        Value::try_from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<CustomValue> for Value {
    fn from(v: CustomValue) -> Self {
        Value::Custom(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Conform for Point {
        fn conform(&self) -> Value {
            Value::Text(format!("{},{}", self.x, self.y))
        }
    }

    #[test]
    fn primitive_conversions() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(7_i32), Value::Integer(7));
        assert_eq!(Value::from(2.5_f64), Value::Real(2.5));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(vec![1_u8, 2]), Value::Blob(vec![1, 2]));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn u64_overflow_is_rejected() {
        assert_eq!(Value::try_from(5_u64).unwrap(), Value::Integer(5));
        let err = Value::try_from(u64::MAX).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn custom_values_downcast_and_conform() {
        let plain = Value::from(CustomValue::new(Point { x: 1, y: 2 }));
        assert!(!plain.is_primitive());
        assert_eq!(plain.as_custom::<Point>(), Some(&Point { x: 1, y: 2 }));
        assert_eq!(plain.host_type_id(), TypeId::of::<Point>());
        match &plain {
            Value::Custom(c) => assert!(c.conform().is_none()),
            _ => unreachable!(),
        }

        let conforming = CustomValue::conforming(Point { x: 3, y: 4 });
        assert_eq!(conforming.conform(), Some(Value::Text("3,4".to_string())));
    }

    #[test]
    fn custom_equality_is_identity() {
        let a = CustomValue::new(1_u128);
        let b = a.clone();
        let c = CustomValue::new(1_u128);
        assert_eq!(Value::Custom(a.clone()), Value::Custom(b));
        assert_ne!(Value::Custom(a), Value::Custom(c));
    }

    #[test]
    fn host_type_ids_of_primitives() {
        assert_eq!(Value::Integer(1).host_type_id(), TypeId::of::<i64>());
        assert_eq!(
            Value::Text(String::new()).host_type_id(),
            TypeId::of::<String>()
        );
        assert_eq!(
            Value::Integer(9).as_any().downcast_ref::<i64>(),
            Some(&9)
        );
    }

    #[test]
    fn serde_roundtrip_of_primitives() {
        let v = Value::Text("hi".to_string());
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
