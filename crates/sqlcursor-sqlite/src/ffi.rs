//! Low-level FFI bindings to libsqlite3.
//!
//! These bindings are written by hand and cover only the entry points the
//! binding calls. The library itself is compiled and linked by
//! `libsqlite3-sys` with its `bundled` feature.

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use std::ffi::{c_char, c_double, c_int, c_void};

/// Opaque sqlite3 database connection handle.
#[repr(C)]
pub struct sqlite3 {
    _private: [u8; 0],
}

/// Opaque sqlite3_stmt prepared statement handle.
#[repr(C)]
pub struct sqlite3_stmt {
    _private: [u8; 0],
}

/// Opaque incremental blob I/O handle.
#[repr(C)]
pub struct sqlite3_blob {
    _private: [u8; 0],
}

/// Opaque user-function call context.
#[repr(C)]
pub struct sqlite3_context {
    _private: [u8; 0],
}

/// Opaque protected or unprotected value passed to user functions.
#[repr(C)]
pub struct sqlite3_value {
    _private: [u8; 0],
}

// SQLite result codes
pub const SQLITE_OK: c_int = 0;
pub const SQLITE_ERROR: c_int = 1;
pub const SQLITE_INTERNAL: c_int = 2;
pub const SQLITE_PERM: c_int = 3;
pub const SQLITE_ABORT: c_int = 4;
pub const SQLITE_BUSY: c_int = 5;
pub const SQLITE_LOCKED: c_int = 6;
pub const SQLITE_NOMEM: c_int = 7;
pub const SQLITE_READONLY: c_int = 8;
pub const SQLITE_INTERRUPT: c_int = 9;
pub const SQLITE_IOERR: c_int = 10;
pub const SQLITE_CORRUPT: c_int = 11;
pub const SQLITE_NOTFOUND: c_int = 12;
pub const SQLITE_FULL: c_int = 13;
pub const SQLITE_CANTOPEN: c_int = 14;
pub const SQLITE_PROTOCOL: c_int = 15;
pub const SQLITE_EMPTY: c_int = 16;
pub const SQLITE_SCHEMA: c_int = 17;
pub const SQLITE_TOOBIG: c_int = 18;
pub const SQLITE_CONSTRAINT: c_int = 19;
pub const SQLITE_MISMATCH: c_int = 20;
pub const SQLITE_MISUSE: c_int = 21;
pub const SQLITE_RANGE: c_int = 25;
pub const SQLITE_ROW: c_int = 100;
pub const SQLITE_DONE: c_int = 101;

// sqlite3_open_v2 flags
pub const SQLITE_OPEN_READONLY: c_int = 0x00000001;
pub const SQLITE_OPEN_READWRITE: c_int = 0x00000002;
pub const SQLITE_OPEN_CREATE: c_int = 0x00000004;
pub const SQLITE_OPEN_URI: c_int = 0x00000040;
pub const SQLITE_OPEN_FULLMUTEX: c_int = 0x00010000;
pub const SQLITE_OPEN_SHAREDCACHE: c_int = 0x00020000;
pub const SQLITE_OPEN_PRIVATECACHE: c_int = 0x00040000;

// Fundamental data types
pub const SQLITE_INTEGER: c_int = 1;
pub const SQLITE_FLOAT: c_int = 2;
pub const SQLITE_TEXT: c_int = 3;
pub const SQLITE_BLOB: c_int = 4;
pub const SQLITE_NULL: c_int = 5;

// Text encodings and function flags for sqlite3_create_function_v2
pub const SQLITE_UTF8: c_int = 1;
pub const SQLITE_DETERMINISTIC: c_int = 0x0000_0800;

// Type alias for destructor callback
pub type sqlite3_destructor_type = Option<unsafe extern "C" fn(*mut c_void)>;

/// Scalar function and aggregate step callback.
pub type sqlite3_func_callback =
    Option<unsafe extern "C" fn(*mut sqlite3_context, c_int, *mut *mut sqlite3_value)>;

/// Aggregate finalizer callback.
pub type sqlite3_final_callback = Option<unsafe extern "C" fn(*mut sqlite3_context)>;

/// The `SQLITE_TRANSIENT` destructor: SQLite copies the buffer before returning.
pub fn sqlite_transient() -> sqlite3_destructor_type {
    // SAFETY: SQLite compares against the all-ones sentinel and never calls it.
    Some(unsafe { std::mem::transmute::<isize, unsafe extern "C" fn(*mut c_void)>(-1_isize) })
}

unsafe extern "C" {
    // Connection management
    pub fn sqlite3_open_v2(
        filename: *const c_char,
        ppDb: *mut *mut sqlite3,
        flags: c_int,
        zVfs: *const c_char,
    ) -> c_int;

    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;

    // Error handling
    pub fn sqlite3_errmsg(db: *mut sqlite3) -> *const c_char;
    pub fn sqlite3_extended_errcode(db: *mut sqlite3) -> c_int;
    pub fn sqlite3_errstr(errcode: c_int) -> *const c_char;
    pub fn sqlite3_extended_result_codes(db: *mut sqlite3, onoff: c_int) -> c_int;

    // Statement preparation
    pub fn sqlite3_prepare_v2(
        db: *mut sqlite3,
        zSql: *const c_char,
        nByte: c_int,
        ppStmt: *mut *mut sqlite3_stmt,
        pzTail: *mut *const c_char,
    ) -> c_int;

    pub fn sqlite3_finalize(pStmt: *mut sqlite3_stmt) -> c_int;
    pub fn sqlite3_reset(pStmt: *mut sqlite3_stmt) -> c_int;
    pub fn sqlite3_clear_bindings(pStmt: *mut sqlite3_stmt) -> c_int;

    // Parameter binding
    pub fn sqlite3_bind_null(pStmt: *mut sqlite3_stmt, index: c_int) -> c_int;

    pub fn sqlite3_bind_int(pStmt: *mut sqlite3_stmt, index: c_int, value: c_int) -> c_int;

    pub fn sqlite3_bind_int64(pStmt: *mut sqlite3_stmt, index: c_int, value: i64) -> c_int;

    pub fn sqlite3_bind_double(pStmt: *mut sqlite3_stmt, index: c_int, value: c_double) -> c_int;

    pub fn sqlite3_bind_text(
        pStmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_char,
        nBytes: c_int,
        destructor: sqlite3_destructor_type,
    ) -> c_int;

    pub fn sqlite3_bind_blob(
        pStmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_void,
        nBytes: c_int,
        destructor: sqlite3_destructor_type,
    ) -> c_int;

    pub fn sqlite3_bind_parameter_count(pStmt: *mut sqlite3_stmt) -> c_int;
    pub fn sqlite3_bind_parameter_name(pStmt: *mut sqlite3_stmt, index: c_int) -> *const c_char;

    // Stepping through results
    pub fn sqlite3_step(pStmt: *mut sqlite3_stmt) -> c_int;

    // Result column information
    pub fn sqlite3_column_count(pStmt: *mut sqlite3_stmt) -> c_int;
    pub fn sqlite3_column_name(pStmt: *mut sqlite3_stmt, index: c_int) -> *const c_char;
    pub fn sqlite3_column_type(pStmt: *mut sqlite3_stmt, index: c_int) -> c_int;
    pub fn sqlite3_column_decltype(pStmt: *mut sqlite3_stmt, index: c_int) -> *const c_char;
    pub fn sqlite3_data_count(pStmt: *mut sqlite3_stmt) -> c_int;

    // Result column values
    pub fn sqlite3_column_int64(pStmt: *mut sqlite3_stmt, index: c_int) -> i64;
    pub fn sqlite3_column_double(pStmt: *mut sqlite3_stmt, index: c_int) -> c_double;
    pub fn sqlite3_column_text(pStmt: *mut sqlite3_stmt, index: c_int) -> *const c_char;
    pub fn sqlite3_column_blob(pStmt: *mut sqlite3_stmt, index: c_int) -> *const c_void;
    pub fn sqlite3_column_bytes(pStmt: *mut sqlite3_stmt, index: c_int) -> c_int;

    // Execution helpers
    pub fn sqlite3_exec(
        db: *mut sqlite3,
        sql: *const c_char,
        callback: Option<
            unsafe extern "C" fn(*mut c_void, c_int, *mut *mut c_char, *mut *mut c_char) -> c_int,
        >,
        arg: *mut c_void,
        errmsg: *mut *mut c_char,
    ) -> c_int;

    pub fn sqlite3_free(ptr: *mut c_void);

    // Metadata
    pub fn sqlite3_changes(db: *mut sqlite3) -> c_int;
    pub fn sqlite3_total_changes(db: *mut sqlite3) -> c_int;
    pub fn sqlite3_last_insert_rowid(db: *mut sqlite3) -> i64;

    pub fn sqlite3_get_autocommit(db: *mut sqlite3) -> c_int;

    // User-defined functions
    pub fn sqlite3_create_function_v2(
        db: *mut sqlite3,
        zFunctionName: *const c_char,
        nArg: c_int,
        eTextRep: c_int,
        pApp: *mut c_void,
        xFunc: sqlite3_func_callback,
        xStep: sqlite3_func_callback,
        xFinal: sqlite3_final_callback,
        xDestroy: sqlite3_destructor_type,
    ) -> c_int;
    pub fn sqlite3_user_data(ctx: *mut sqlite3_context) -> *mut c_void;
    pub fn sqlite3_aggregate_context(ctx: *mut sqlite3_context, nBytes: c_int) -> *mut c_void;

    pub fn sqlite3_value_type(value: *mut sqlite3_value) -> c_int;
    pub fn sqlite3_value_int64(value: *mut sqlite3_value) -> i64;
    pub fn sqlite3_value_double(value: *mut sqlite3_value) -> c_double;
    pub fn sqlite3_value_text(value: *mut sqlite3_value) -> *const c_char;
    pub fn sqlite3_value_blob(value: *mut sqlite3_value) -> *const c_void;
    pub fn sqlite3_value_bytes(value: *mut sqlite3_value) -> c_int;

    pub fn sqlite3_result_null(ctx: *mut sqlite3_context);
    pub fn sqlite3_result_int64(ctx: *mut sqlite3_context, value: i64);
    pub fn sqlite3_result_double(ctx: *mut sqlite3_context, value: c_double);
    pub fn sqlite3_result_text(
        ctx: *mut sqlite3_context,
        value: *const c_char,
        nBytes: c_int,
        destructor: sqlite3_destructor_type,
    );
    pub fn sqlite3_result_blob(
        ctx: *mut sqlite3_context,
        value: *const c_void,
        nBytes: c_int,
        destructor: sqlite3_destructor_type,
    );
    pub fn sqlite3_result_error(ctx: *mut sqlite3_context, msg: *const c_char, nBytes: c_int);

    // Incremental blob I/O
    pub fn sqlite3_blob_open(
        db: *mut sqlite3,
        zDb: *const c_char,
        zTable: *const c_char,
        zColumn: *const c_char,
        iRow: i64,
        flags: c_int,
        ppBlob: *mut *mut sqlite3_blob,
    ) -> c_int;
    pub fn sqlite3_blob_close(blob: *mut sqlite3_blob) -> c_int;
    pub fn sqlite3_blob_bytes(blob: *mut sqlite3_blob) -> c_int;
    pub fn sqlite3_blob_read(
        blob: *mut sqlite3_blob,
        z: *mut c_void,
        n: c_int,
        iOffset: c_int,
    ) -> c_int;
    pub fn sqlite3_blob_write(
        blob: *mut sqlite3_blob,
        z: *const c_void,
        n: c_int,
        iOffset: c_int,
    ) -> c_int;

    // Version info
    pub fn sqlite3_libversion() -> *const c_char;
    pub fn sqlite3_libversion_number() -> c_int;
}

/// Get the SQLite library version as a string.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        std::ffi::CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Get the SQLite library version as a number.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe {
        let ptr = sqlite3_errstr(code);
        std::ffi::CStr::from_ptr(ptr)
            .to_str()
            .unwrap_or("unknown error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let v = version();
        assert!(!v.is_empty());
        // SQLite version should start with 3.
        assert!(v.starts_with('3'));
    }

    #[test]
    fn test_version_number() {
        let v = version_number();
        // SQLite 3.x.x version numbers are in the form 3XXYYZZ
        // e.g., 3.45.0 = 3045000
        assert!(v >= 3_000_000);
    }

    #[test]
    fn test_error_string() {
        assert_eq!(error_string(SQLITE_OK), "not an error");
        assert_eq!(error_string(SQLITE_ERROR), "SQL logic error");
        assert_eq!(error_string(SQLITE_BUSY), "database is locked");
        assert_eq!(error_string(SQLITE_CONSTRAINT), "constraint failed");
    }

    #[test]
    fn test_transient_is_sentinel() {
        let destructor = sqlite_transient().expect("transient destructor is set");
        assert_eq!(destructor as usize, usize::MAX);
    }
}
