//! Converter and adapter tables.
//!
//! Converters turn raw column bytes into host values and are keyed by an
//! uppercase type name. Adapters turn host values into engine primitives
//! and are keyed by the host value's Rust type. Both tables follow
//! last-registration-wins.
//!
//! A `Registry` is plain data: build one at startup, hand it to every
//! connection that should share it, and each connection keeps its own copy
//! for later registrations.

use crate::Result;
use crate::error::{Error, InterfaceErrorKind};
use crate::value::{CustomValue, Value};
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `bytes -> value` function applied while materializing a column.
pub type Converter = Arc<dyn Fn(&[u8]) -> Result<Value> + Send + Sync>;

/// `value -> primitive` function applied while binding a parameter.
pub type Adapter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Registry {
    converters: HashMap<String, Converter>,
    adapters: HashMap<TypeId, (&'static str, Adapter)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the JSON adapter and the `JSON` converter.
    pub fn with_json() -> Self {
        let mut registry = Self::new();
        registry.register_converter("json", json_converter);
        registry.register_adapter::<serde_json::Value, _>(json_adapter);
        registry
    }

    /// Register a converter under `name`, case-insensitively.
    pub fn register_converter<F>(&mut self, name: &str, converter: F)
    where
        F: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        let key = name.to_ascii_uppercase();
        tracing::trace!(name = %key, "Registering converter");
        self.converters.insert(key, Arc::new(converter));
    }

    /// Look up a converter by type name, case-insensitively.
    pub fn converter(&self, name: &str) -> Option<Converter> {
        self.converters.get(&name.to_ascii_uppercase()).cloned()
    }

    pub fn converter_names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }

    /// Register an adapter for values of host type `T`.
    ///
    /// `T` may be one of the primitive stand-ins (`i64`, `f64`, `String`,
    /// `Vec<u8>`) as well as any type carried in a [`CustomValue`].
    pub fn register_adapter<T, F>(&mut self, adapter: F)
    where
        T: Any,
        F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let wrapped: Adapter = Arc::new(move |value: &Value| {
            let host = value.as_any().downcast_ref::<T>().ok_or_else(|| {
                Error::interface(
                    InterfaceErrorKind::Adapter,
                    format!("adapter for {type_name} received {}", value.type_name()),
                )
            })?;
            adapter(host)
        });
        tracing::trace!(host_type = type_name, "Registering adapter");
        self.adapters
            .insert(TypeId::of::<T>(), (type_name, wrapped));
    }

    pub fn adapter_for(&self, value: &Value) -> Option<Adapter> {
        self.adapters
            .get(&value.host_type_id())
            .map(|(_, adapter)| Arc::clone(adapter))
    }

    /// Map a parameter to an engine primitive.
    ///
    /// A registered adapter is applied exactly once and its output must
    /// already be a primitive. Without an adapter, custom values may
    /// conform themselves; anything else is unsupported.
    pub fn adapt<'v>(&self, value: &'v Value) -> Result<Cow<'v, Value>> {
        if let Some(adapter) = self.adapter_for(value) {
            let adapted = adapter(value)?;
            if !adapted.is_primitive() {
                return Err(Error::interface(
                    InterfaceErrorKind::Adapter,
                    format!(
                        "adapter for {} returned non-primitive {}",
                        value.type_name(),
                        adapted.type_name()
                    ),
                ));
            }
            return Ok(Cow::Owned(adapted));
        }

        match value {
            Value::Custom(custom) => match custom.conform() {
                Some(conformed) if conformed.is_primitive() => Ok(Cow::Owned(conformed)),
                _ => Err(Error::interface(
                    InterfaceErrorKind::UnsupportedType,
                    format!("unsupported parameter type {}", custom.type_name()),
                )),
            },
            primitive => Ok(Cow::Borrowed(primitive)),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut converters: Vec<_> = self.converters.keys().collect();
        converters.sort();
        let mut adapters: Vec<_> = self.adapters.values().map(|(name, _)| *name).collect();
        adapters.sort_unstable();
        f.debug_struct("Registry")
            .field("converters", &converters)
            .field("adapters", &adapters)
            .finish()
    }
}

/// Parse column bytes as JSON into a `serde_json::Value` host value.
pub fn json_converter(bytes: &[u8]) -> Result<Value> {
    let doc: serde_json::Value = serde_json::from_slice(bytes)?;
    Ok(Value::Custom(CustomValue::new(doc)))
}

/// Store a `serde_json::Value` as its compact text form.
pub fn json_adapter(doc: &serde_json::Value) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(doc)?))
}
