//! Value marshalling between the engine and `Value`.
//!
//! SQLite has five storage classes and every conversion here maps one of
//! them to the matching `Value` variant or back:
//!
//! | Storage class | Value |
//! |---------------|-------|
//! | NULL | `Value::Null` |
//! | INTEGER | `Value::Integer` |
//! | REAL | `Value::Real` |
//! | TEXT | `Value::Text` |
//! | BLOB | `Value::Blob` |
//!
//! Custom host values never reach this module; they are adapted first.

use crate::ffi;
use sqlcursor_core::Value;
use std::ffi::{CStr, c_char, c_int};

/// Length as the engine's byte count, or `None` when it does not fit.
fn byte_len(len: usize) -> Option<c_int> {
    c_int::try_from(len).ok()
}

/// Bind a primitive Value to a prepared statement parameter.
///
/// Integers that fit in 32 bits take the narrow binding, others the 64-bit
/// one. Returns `SQLITE_MISMATCH` for custom values and `SQLITE_TOOBIG` for
/// buffers the engine cannot address.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: caller guarantees `stmt` and `index`; buffers are copied by
    // SQLite before the call returns (SQLITE_TRANSIENT).
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),

            Value::Integer(v) => match i32::try_from(*v) {
                Ok(narrow) => ffi::sqlite3_bind_int(stmt, index, narrow),
                Err(_) => ffi::sqlite3_bind_int64(stmt, index, *v),
            },

            Value::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),

            Value::Text(s) => match byte_len(s.len()) {
                Some(len) => ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    s.as_ptr().cast::<c_char>(),
                    len,
                    ffi::sqlite_transient(),
                ),
                None => ffi::SQLITE_TOOBIG,
            },

            Value::Blob(b) => match byte_len(b.len()) {
                Some(len) => ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    b.as_ptr().cast(),
                    len,
                    ffi::sqlite_transient(),
                ),
                None => ffi::SQLITE_TOOBIG,
            },

            Value::Custom(_) => ffi::SQLITE_MISMATCH,
        }
    }
}

/// Read a column value from a result row by its storage class.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees a current row and a valid column index.
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, index)),

            ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, index)),

            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                Value::Text(String::from_utf8_lossy(raw_slice(ptr.cast(), len)).into_owned())
            }

            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                Value::Blob(raw_slice(ptr.cast(), len).to_vec())
            }

            _ => Value::Null,
        }
    }
}

/// Whether the current row holds NULL in this column.
///
/// # Safety
/// Same as [`read_column`].
pub unsafe fn column_is_null(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> bool {
    // SAFETY: forwarded from caller
    unsafe { ffi::sqlite3_column_type(stmt, index) == ffi::SQLITE_NULL }
}

/// Read a column as raw bytes, whatever its storage class, for converters.
///
/// # Safety
/// Same as [`read_column`].
pub unsafe fn column_bytes(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Vec<u8> {
    // SAFETY: forwarded from caller; the blob pointer is valid until the
    // next step/reset/finalize and is copied immediately.
    unsafe {
        let ptr = ffi::sqlite3_column_blob(stmt, index);
        let len = ffi::sqlite3_column_bytes(stmt, index);
        raw_slice(ptr.cast(), len).to_vec()
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from caller
    unsafe { owned_str(ffi::sqlite3_column_name(stmt, index)) }
}

/// Get the declared type of a result column, if it maps to a table column.
///
/// # Safety
/// Same as [`column_name`].
pub unsafe fn column_decltype(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from caller
    unsafe { owned_str(ffi::sqlite3_column_decltype(stmt, index)) }
}

/// Name of a bound parameter, including its prefix character.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 1-based parameter index
pub unsafe fn parameter_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from caller
    unsafe { owned_str(ffi::sqlite3_bind_parameter_name(stmt, index)) }
}

/// Convert a user-function argument to a `Value`. No converters apply.
///
/// # Safety
/// `value` must be a valid argument pointer for the current callback.
pub unsafe fn read_argument(value: *mut ffi::sqlite3_value) -> Value {
    // SAFETY: forwarded from caller
    unsafe {
        match ffi::sqlite3_value_type(value) {
            ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_value_int64(value)),
            ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_value_double(value)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_value_text(value);
                let len = ffi::sqlite3_value_bytes(value);
                Value::Text(String::from_utf8_lossy(raw_slice(ptr.cast(), len)).into_owned())
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_value_blob(value);
                let len = ffi::sqlite3_value_bytes(value);
                Value::Blob(raw_slice(ptr.cast(), len).to_vec())
            }
            _ => Value::Null,
        }
    }
}

/// Hand a primitive result back to the engine.
///
/// # Safety
/// `ctx` must be the context of the running callback.
pub unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &Value) {
    // SAFETY: forwarded from caller; buffers are copied (SQLITE_TRANSIENT).
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_result_null(ctx),
            Value::Integer(v) => ffi::sqlite3_result_int64(ctx, *v),
            Value::Real(v) => ffi::sqlite3_result_double(ctx, *v),
            Value::Text(s) => match byte_len(s.len()) {
                Some(len) => ffi::sqlite3_result_text(
                    ctx,
                    s.as_ptr().cast::<c_char>(),
                    len,
                    ffi::sqlite_transient(),
                ),
                None => set_error(ctx, "string or blob too big"),
            },
            Value::Blob(b) => match byte_len(b.len()) {
                Some(len) => {
                    ffi::sqlite3_result_blob(ctx, b.as_ptr().cast(), len, ffi::sqlite_transient());
                }
                None => set_error(ctx, "string or blob too big"),
            },
            Value::Custom(c) => set_error(
                ctx,
                &format!("user-defined function returned unsupported type {}", c.type_name()),
            ),
        }
    }
}

/// Report an error from a callback.
///
/// # Safety
/// `ctx` must be the context of the running callback.
pub unsafe fn set_error(ctx: *mut ffi::sqlite3_context, message: &str) {
    let len = byte_len(message.len()).unwrap_or(c_int::MAX);
    // SAFETY: the message is copied by SQLite before returning
    unsafe { ffi::sqlite3_result_error(ctx, message.as_ptr().cast::<c_char>(), len) }
}

/// # Safety
/// `ptr` must be null or point to at least `len` readable bytes.
unsafe fn raw_slice<'a>(ptr: *const u8, len: c_int) -> &'a [u8] {
    if ptr.is_null() || len <= 0 {
        &[]
    } else {
        // SAFETY: forwarded from caller
        unsafe { std::slice::from_raw_parts(ptr, len as usize) }
    }
}

/// # Safety
/// `ptr` must be null or a valid NUL-terminated string.
unsafe fn owned_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: forwarded from caller
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    /// Prepare `SELECT ?` against a scratch database and round-trip one value.
    fn round_trip(value: &Value) -> Value {
        let path = CString::new(":memory:").unwrap();
        let sql = CString::new("SELECT ?").unwrap();
        unsafe {
            let mut db = ptr::null_mut();
            let rc = ffi::sqlite3_open_v2(
                path.as_ptr(),
                &mut db,
                ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
                ptr::null(),
            );
            assert_eq!(rc, ffi::SQLITE_OK);
            let mut stmt = ptr::null_mut();
            let rc = ffi::sqlite3_prepare_v2(db, sql.as_ptr(), -1, &mut stmt, ptr::null_mut());
            assert_eq!(rc, ffi::SQLITE_OK);
            assert_eq!(bind_value(stmt, 1, value), ffi::SQLITE_OK);
            assert_eq!(ffi::sqlite3_step(stmt), ffi::SQLITE_ROW);
            let out = read_column(stmt, 0);
            ffi::sqlite3_finalize(stmt);
            ffi::sqlite3_close_v2(db);
            out
        }
    }

    #[test]
    fn primitives_round_trip() {
        for value in [
            Value::Null,
            Value::Integer(0),
            Value::Integer(-7),
            Value::Integer(i64::from(i32::MAX) + 1),
            Value::Integer(i64::MIN),
            Value::Real(3.25),
            Value::Text(String::new()),
            Value::Text("héllo".to_string()),
            Value::Blob(vec![]),
            Value::Blob(vec![0, 1, 255]),
        ] {
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test]
    fn custom_values_do_not_bind() {
        let custom = Value::Custom(sqlcursor_core::CustomValue::new(1_u8));
        let path = CString::new(":memory:").unwrap();
        let sql = CString::new("SELECT ?").unwrap();
        unsafe {
            let mut db = ptr::null_mut();
            ffi::sqlite3_open_v2(
                path.as_ptr(),
                &mut db,
                ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
                ptr::null(),
            );
            let mut stmt = ptr::null_mut();
            ffi::sqlite3_prepare_v2(db, sql.as_ptr(), -1, &mut stmt, ptr::null_mut());
            assert_eq!(bind_value(stmt, 1, &custom), ffi::SQLITE_MISMATCH);
            ffi::sqlite3_finalize(stmt);
            ffi::sqlite3_close_v2(db);
        }
    }
}
