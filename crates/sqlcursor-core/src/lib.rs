//! Core types for the sqlcursor binding.
//!
//! This crate holds everything that does not touch the engine:
//!
//! - `Value` and `CustomValue` for parameters and column results
//! - `Row` and `ColumnInfo` for fetched rows
//! - `Error`, the DB-API style error taxonomy
//! - `TypeFamily` and `TypeCode`, the declared-type classifier
//! - `Registry`, the converter and adapter tables
//! - `Params`, positional or named parameter sets

pub mod error;
pub mod params;
pub mod registry;
pub mod row;
pub mod types;
pub mod value;

pub use error::{
    DatabaseError, DatabaseErrorKind, Error, InterfaceError, InterfaceErrorKind, Result, TypeError,
};
pub use params::Params;
pub use registry::{Adapter, Converter, Registry};
pub use row::{ColumnDescription, ColumnInfo, FromValue, Row};
pub use types::{TypeCode, TypeFamily};
pub use value::{Conform, CustomValue, Value};
