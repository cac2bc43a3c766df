//! sqlcursor - DB-API style access to embedded SQLite.
//!
//! sqlcursor wraps the SQLite engine in the connect / cursor / execute /
//! fetch / commit shape familiar from DB-API drivers:
//!
//! - One prepared statement per `execute`, with typed positional or named
//!   parameters
//! - Implicit transactions around INSERT, UPDATE and DELETE
//! - Pluggable adapters (host value to SQL) and converters (SQL to host
//!   value) owned by each connection
//! - User-defined scalar functions and aggregates
//! - Incremental BLOB streams
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlcursor::prelude::*;
//!
//! let conn = sqlcursor::connect(":memory:")?;
//! let mut cur = conn.cursor()?;
//! cur.execute("CREATE TABLE t(a INTEGER, b TEXT)", ())?;
//! cur.execute("INSERT INTO t VALUES (?, ?)", (1, "x"))?;
//! assert_eq!(cur.rowcount(), Some(1));
//! conn.commit()?;
//!
//! let rows = cur.execute("SELECT a, b FROM t", ())?.fetchall()?;
//! assert_eq!(rows[0], vec![Value::Integer(1), Value::Text("x".into())]);
//! ```
//!
//! # Converters
//!
//! With `DetectTypes::DECLTYPES` a column declared `point` is fetched
//! through the converter registered as `"point"` (names are
//! case-insensitive); with `DetectTypes::COLNAMES` a column aliased
//! `"p [point]"` is too. A converter that fails yields NULL for that one
//! value and the fetch carries on.

pub use sqlcursor_core::{
    Adapter, ColumnDescription, ColumnInfo, Conform, Converter, CustomValue, DatabaseError,
    DatabaseErrorKind, Error, FromValue, InterfaceError, InterfaceErrorKind, Params, Registry,
    Result, Row, TypeCode, TypeError, TypeFamily, Value, named_params, params,
};

pub use sqlcursor_core::registry::{json_adapter, json_converter};

pub use sqlcursor_sqlite::{
    Aggregate, Blob, BusyHandler, ConnectConfig, Connection, Cursor, DetectTypes,
    FunctionFlags, OpenFlags, StepState, Whence, sqlite_version, sqlite_version_number,
};

/// Open a connection to the database at `path` with default settings.
///
/// `":memory:"` opens a private in-memory database.
pub fn connect(path: &str) -> Result<Connection> {
    connect_with(&ConnectConfig::new(path))
}

/// Open a connection with explicit settings.
pub fn connect_with(config: &ConnectConfig) -> Result<Connection> {
    let conn = Connection::open(config)?;
    tracing::debug!(
        path = %config.path,
        detect_types = ?config.detect_types,
        sqlite = sqlite_version(),
        "Connected"
    );
    Ok(conn)
}

/// A registry preloaded with the JSON adapter and converter: bind
/// `serde_json::Value` parameters as TEXT and read columns typed `json`
/// back as `serde_json::Value`.
pub fn json_registry() -> Registry {
    Registry::with_json()
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Aggregate, ConnectConfig, Connection, Cursor, DetectTypes, Error, Params, Result, Row,
        Value, connect, connect_with, named_params, params,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_memory() {
        let conn = connect(":memory:").unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(!conn.is_closed());
    }
}
