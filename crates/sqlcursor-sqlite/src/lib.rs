//! SQLite binding for sqlcursor.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate drives an embedded SQLite engine through hand-declared FFI
//! entry points and exposes a DB-API shaped surface on top of it:
//! connections, cursors, user functions and aggregates, and incremental
//! BLOB streams.
//!
//! # Features
//!
//! - One statement per `execute`, with an opt-in multi-statement mode
//! - Implicit transactions for INSERT, UPDATE and DELETE
//! - Positional and named parameters, adapted through a per-connection registry
//! - Converters keyed by declared column type or `[type]` column-name hints
//! - Busy handling by exponential backoff or a user callback
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlcursor_sqlite::{ConnectConfig, Connection, DetectTypes};
//! use sqlcursor_core::Value;
//!
//! let conn = Connection::open(&ConnectConfig::memory().detect_types(DetectTypes::DECLTYPES))?;
//! conn.register_converter("point", |raw| {
//!     let text = String::from_utf8_lossy(raw);
//!     Ok(Value::Text(format!("({text})")))
//! })?;
//!
//! let mut cur = conn.cursor()?;
//! cur.execute("CREATE TABLE t(p point)", ())?;
//! cur.execute("INSERT INTO t VALUES (?)", ("1,2",))?;
//! let rows = cur.execute("SELECT p FROM t", ())?.fetchall()?;
//! assert_eq!(rows[0][0], Value::Text("(1,2)".into()));
//! ```
//!
//! # Type Mapping
//!
//! | Rust Type | SQLite Type |
//! |-----------|-------------|
//! | `bool` | INTEGER (0/1) |
//! | `i8`, `i16`, `i32` | INTEGER |
//! | `i64` | INTEGER |
//! | `f32`, `f64` | REAL |
//! | `String` | TEXT |
//! | `Vec<u8>` | BLOB |
//! | `Option<T>` | NULL or T |
//! | `serde_json::Value` | TEXT (with the JSON adapter) |
//!
//! # Thread Safety
//!
//! Connections are opened in serialized mode and are `Send` and `Sync`.
//! By default every object refuses use from any thread but the one that
//! opened its connection; `ConnectConfig::check_same_thread(false)` lifts
//! that check.

// Links the bundled engine; the entry points are declared in `ffi`.
use libsqlite3_sys as _;

pub mod blob;
pub mod busy;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod ffi;
pub mod functions;
pub mod statement;
pub mod types;

pub use blob::{Blob, Whence};
pub use busy::{BusyHandler, BusyPolicy};
pub use connection::{ConnectConfig, Connection, DetectTypes, OpenFlags};
pub use cursor::{Cursor, StepState};
pub use functions::{Aggregate, FunctionFlags};
pub use statement::StatementKind;

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }

    #[test]
    fn test_sqlite_version_number() {
        let num = sqlite_version_number();
        assert!(
            num >= 3_035_000,
            "Expected SQLite 3.35 or newer, got {}",
            num
        );
    }
}
