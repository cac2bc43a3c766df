//! Translation of engine result codes into the error taxonomy.
//!
//! Every failing engine call goes through [`from_code`] or [`from_db`] at
//! the point of failure.

use crate::ffi;
use sqlcursor_core::error::{DatabaseError, DatabaseErrorKind};
use sqlcursor_core::Error;
use std::ffi::{CStr, c_int};

pub const CLOSED_DATABASE: &str = "Cannot operate on a closed database.";
pub const CLOSED_CURSOR: &str = "Cannot operate on a closed cursor.";
pub const CLOSED_BLOB: &str = "Cannot operate on a closed blob.";
pub const MODIFIED_BLOB: &str = "Cannot operate on modified blob";
pub const WRONG_THREAD: &str =
    "SQLite objects created in a thread can only be used in that same thread.";

/// Map a (possibly extended) result code to its `DatabaseError` subclass.
pub fn kind_for_code(code: c_int) -> DatabaseErrorKind {
    match code & 0xff {
        ffi::SQLITE_INTERNAL | ffi::SQLITE_NOTFOUND | ffi::SQLITE_EMPTY => {
            DatabaseErrorKind::Internal
        }
        ffi::SQLITE_ERROR
        | ffi::SQLITE_PERM
        | ffi::SQLITE_ABORT
        | ffi::SQLITE_BUSY
        | ffi::SQLITE_LOCKED
        | ffi::SQLITE_READONLY
        | ffi::SQLITE_INTERRUPT
        | ffi::SQLITE_IOERR
        | ffi::SQLITE_FULL
        | ffi::SQLITE_CANTOPEN
        | ffi::SQLITE_PROTOCOL
        | ffi::SQLITE_SCHEMA => DatabaseErrorKind::Operational,
        ffi::SQLITE_TOOBIG => DatabaseErrorKind::Data,
        ffi::SQLITE_CONSTRAINT | ffi::SQLITE_MISMATCH => DatabaseErrorKind::Integrity,
        ffi::SQLITE_MISUSE | ffi::SQLITE_RANGE => DatabaseErrorKind::Programming,
        _ => DatabaseErrorKind::Database,
    }
}

/// Build an error from a result code and an explicit message.
pub fn from_code(code: c_int, message: impl Into<String>) -> Error {
    Error::Database(DatabaseError {
        kind: kind_for_code(code),
        code: Some(code & 0xff),
        extended_code: Some(code),
        message: message.into(),
        sql: None,
        source: None,
    })
}

/// Build an error from a result code, taking the message from the
/// connection's error slot when there is one.
///
/// # Safety
/// `db` must be null or a live connection handle.
pub unsafe fn from_db(db: *mut ffi::sqlite3, code: c_int) -> Error {
    if db.is_null() {
        return from_code(code, ffi::error_string(code));
    }
    // SAFETY: caller guarantees `db` is live; errmsg returns a string owned
    // by the connection which is copied immediately.
    let (message, extended) = unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        let message = if ptr.is_null() {
            ffi::error_string(code).to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        };
        (message, ffi::sqlite3_extended_errcode(db))
    };
    // A stale errcode from an earlier call must not override the code that
    // actually failed.
    let code = if extended & 0xff == code & 0xff {
        extended
    } else {
        code
    };
    from_code(code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_table() {
        assert_eq!(kind_for_code(ffi::SQLITE_ERROR), DatabaseErrorKind::Operational);
        assert_eq!(kind_for_code(ffi::SQLITE_BUSY), DatabaseErrorKind::Operational);
        assert_eq!(kind_for_code(ffi::SQLITE_LOCKED), DatabaseErrorKind::Operational);
        assert_eq!(kind_for_code(ffi::SQLITE_IOERR), DatabaseErrorKind::Operational);
        assert_eq!(kind_for_code(ffi::SQLITE_INTERNAL), DatabaseErrorKind::Internal);
        assert_eq!(kind_for_code(ffi::SQLITE_NOTFOUND), DatabaseErrorKind::Internal);
        assert_eq!(kind_for_code(ffi::SQLITE_EMPTY), DatabaseErrorKind::Internal);
        assert_eq!(kind_for_code(ffi::SQLITE_TOOBIG), DatabaseErrorKind::Data);
        assert_eq!(kind_for_code(ffi::SQLITE_CONSTRAINT), DatabaseErrorKind::Integrity);
        assert_eq!(kind_for_code(ffi::SQLITE_MISMATCH), DatabaseErrorKind::Integrity);
        assert_eq!(kind_for_code(ffi::SQLITE_MISUSE), DatabaseErrorKind::Programming);
        assert_eq!(kind_for_code(ffi::SQLITE_CORRUPT), DatabaseErrorKind::Database);
        assert_eq!(kind_for_code(ffi::SQLITE_NOMEM), DatabaseErrorKind::Database);
    }

    #[test]
    fn unlisted_codes_are_plain_database_errors() {
        // NOLFS, AUTH, FORMAT, NOTADB, NOTICE, WARNING
        for code in [22, 23, 24, 26, 27, 28] {
            assert_eq!(kind_for_code(code), DatabaseErrorKind::Database, "code {code}");
        }
        assert_eq!(kind_for_code(ffi::SQLITE_RANGE), DatabaseErrorKind::Programming);
    }

    #[test]
    fn extended_codes_use_primary_for_kind() {
        // SQLITE_CONSTRAINT_UNIQUE
        let err = from_code(2067, "UNIQUE constraint failed: t.a");
        assert!(err.is_integrity());
        assert_eq!(err.code(), Some(ffi::SQLITE_CONSTRAINT));
        assert_eq!(err.extended_code(), Some(2067));
    }

    #[test]
    fn null_handle_uses_static_text() {
        let err = unsafe { from_db(std::ptr::null_mut(), ffi::SQLITE_BUSY) };
        assert!(err.is_operational());
        assert_eq!(err.message(), "database is locked");
    }
}
