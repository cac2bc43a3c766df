//! Prepared statement wrapper.
//!
//! A `Statement` is unprepared (null handle), prepared-and-idle, or
//! prepared-and-stepping (`in_use`). Binding a statement that is stepping
//! finalizes and re-prepares it first, so a handle is never reused mid-step
//! with stale bindings.

#![allow(clippy::cast_possible_truncation)] // c_int counts and indexes
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::error::{self, from_db};
use crate::ffi;
use crate::types;
use sqlcursor_core::error::InterfaceErrorKind;
use sqlcursor_core::{Error, Params, Registry, Result, Value};
use std::ffi::{c_char, c_int};
use std::ptr;

/// Leading-keyword classification used for implicit transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    /// Classify by the first keyword, skipping whitespace and comments.
    /// `REPLACE` counts as an insert.
    pub fn classify(sql: &str) -> Self {
        let body = skip_blank(sql);
        let keyword: String = body
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" => StatementKind::Select,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    /// INSERT, UPDATE or DELETE.
    pub fn is_dml(self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }
}

/// Skip leading whitespace, `--` line comments and `/* */` block comments.
pub fn skip_blank(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        if let Some(comment) = trimmed.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
        } else if let Some(comment) = trimmed.strip_prefix("/*") {
            rest = comment.find("*/").map_or("", |end| &comment[end + 2..]);
        } else {
            return trimmed;
        }
    }
}

/// True when `tail` holds nothing but whitespace, comments and semicolons.
pub fn is_blank_tail(tail: &str) -> bool {
    let mut rest = tail;
    loop {
        let body = skip_blank(rest);
        match body.strip_prefix(';') {
            Some(after) => rest = after,
            None => return body.is_empty(),
        }
    }
}

pub struct Statement {
    db: *mut ffi::sqlite3,
    handle: *mut ffi::sqlite3_stmt,
    sql: String,
    in_use: bool,
}

// SAFETY: connections are opened in serialized mode, so the engine handles
// may be touched from any thread; cross-thread misuse is rejected by the
// owning connection's thread check.
unsafe impl Send for Statement {}

impl Statement {
    /// Prepare the first statement in `sql`.
    ///
    /// Returns the statement and the unconsumed tail. Text consisting only
    /// of whitespace or comments yields an unprepared statement.
    ///
    /// # Safety
    /// `db` must be a live connection handle.
    pub unsafe fn prepare(db: *mut ffi::sqlite3, sql: &str) -> Result<(Statement, String)> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| error::from_code(ffi::SQLITE_TOOBIG, "SQL statement too long"))?;
        let mut handle = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        let start = sql.as_ptr().cast::<c_char>();

        // SAFETY: `sql` outlives the call and `len` bounds the read.
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, start, len, &mut handle, &mut tail) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is live per the caller contract
            return Err(unsafe { from_db(db, rc) }.with_sql(sql));
        }

        let consumed = if tail.is_null() {
            sql.len()
        } else {
            // SAFETY: SQLite sets the tail inside the input buffer.
            (unsafe { tail.offset_from(start) }) as usize
        };
        let (head, rest) = sql.split_at(consumed.min(sql.len()));
        tracing::trace!(sql = %head, prepared = !handle.is_null(), "Prepared statement");

        Ok((
            Statement {
                db,
                handle,
                sql: head.to_string(),
                in_use: false,
            },
            rest.to_string(),
        ))
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_prepared(&self) -> bool {
        !self.handle.is_null()
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub fn parameter_count(&self) -> usize {
        if self.handle.is_null() {
            return 0;
        }
        // SAFETY: handle is a live statement
        unsafe { ffi::sqlite3_bind_parameter_count(self.handle) as usize }
    }

    pub fn column_count(&self) -> usize {
        if self.handle.is_null() {
            return 0;
        }
        // SAFETY: handle is a live statement
        unsafe { ffi::sqlite3_column_count(self.handle) as usize }
    }

    /// Bind one parameter set, adapting each value through `registry`.
    pub fn bind(&mut self, params: &Params, registry: &Registry) -> Result<()> {
        if self.in_use {
            self.reprepare()?;
        }
        let expected = self.parameter_count();

        match params {
            Params::Named(_) => {
                for index in 1..=expected {
                    // SAFETY: index is within 1..=parameter_count
                    let name = unsafe { types::parameter_name(self.handle, index as c_int) };
                    let Some(name) = name.filter(|n| !n.starts_with('?')) else {
                        return Err(Error::programming(format!(
                            "Binding {index} has no name, but you supplied a dictionary \
                             (which has only names)."
                        )));
                    };
                    let value = params.get_named(&name).ok_or_else(|| {
                        Error::programming(format!(
                            "You did not supply a value for binding parameter {name}."
                        ))
                    })?;
                    self.bind_one(index, value, registry)?;
                }
            }
            Params::Positional(values) => {
                check_arity(expected, values.len())?;
                for (i, value) in values.iter().enumerate() {
                    self.bind_one(i + 1, value, registry)?;
                }
            }
            Params::None => check_arity(expected, 0)?,
        }
        Ok(())
    }

    fn bind_one(&mut self, index: usize, value: &Value, registry: &Registry) -> Result<()> {
        let adapted = registry.adapt(value).map_err(|e| match e {
            Error::Interface(mut ie) => {
                ie.message = format!("Error binding parameter {index}: {}", ie.message);
                Error::Interface(ie)
            }
            other => other,
        })?;
        // SAFETY: handle is live and index within bounds
        let rc = unsafe { types::bind_value(self.handle, index as c_int, &adapted) };
        match rc {
            ffi::SQLITE_OK => Ok(()),
            ffi::SQLITE_MISMATCH => Err(Error::interface(
                InterfaceErrorKind::UnsupportedType,
                format!("Error binding parameter {index} - probably unsupported type."),
            )),
            // SAFETY: db is live while the statement is
            rc => Err(unsafe { from_db(self.db, rc) }.with_sql(&self.sql)),
        }
    }

    /// Advance once. Callers drive this through the busy policy.
    pub fn step(&mut self) -> c_int {
        if self.handle.is_null() {
            return ffi::SQLITE_DONE;
        }
        self.in_use = true;
        // SAFETY: handle is a live statement
        unsafe { ffi::sqlite3_step(self.handle) }
    }

    /// Translate a failing step result into an error for this statement.
    pub fn step_error(&self, rc: c_int) -> Error {
        // SAFETY: db is live while the statement is
        unsafe { from_db(self.db, rc) }.with_sql(&self.sql)
    }

    /// Clear bindings and rewind, keeping the handle.
    pub fn reset(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        self.in_use = false;
        // SAFETY: handle is a live statement
        let rc = unsafe {
            let rc = ffi::sqlite3_reset(self.handle);
            ffi::sqlite3_clear_bindings(self.handle);
            rc
        };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.step_error(rc))
        }
    }

    /// Release the handle. Finalizing a finalized statement succeeds.
    pub fn finalize(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let handle = std::mem::replace(&mut self.handle, ptr::null_mut());
        self.in_use = false;
        // SAFETY: handle was live and is not used again
        let rc = unsafe { ffi::sqlite3_finalize(handle) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.step_error(rc))
        }
    }

    fn reprepare(&mut self) -> Result<()> {
        tracing::trace!(sql = %self.sql, "Re-preparing statement still in use");
        // The previous step's outcome was already reported.
        let _ = self.finalize();
        // SAFETY: db outlives its statements (close_v2 defers teardown)
        let (fresh, _) = unsafe { Statement::prepare(self.db, &self.sql) }?;
        *self = fresh;
        Ok(())
    }

    /// Number of columns in the current row.
    pub fn data_count(&self) -> usize {
        if self.handle.is_null() {
            return 0;
        }
        // SAFETY: handle is a live statement
        unsafe { ffi::sqlite3_data_count(self.handle) as usize }
    }

    pub fn column_name(&self, index: usize) -> Option<String> {
        if index >= self.column_count() {
            return None;
        }
        // SAFETY: index checked against column_count
        unsafe { types::column_name(self.handle, index as c_int) }
    }

    pub fn column_decltype(&self, index: usize) -> Option<String> {
        if index >= self.column_count() {
            return None;
        }
        // SAFETY: index checked against column_count
        unsafe { types::column_decltype(self.handle, index as c_int) }
    }

    /// Read a column of the current row by storage class.
    pub fn read_column(&self, index: usize) -> Value {
        if index >= self.data_count() {
            return Value::Null;
        }
        // SAFETY: a row is current (data_count > index)
        unsafe { types::read_column(self.handle, index as c_int) }
    }

    /// Raw bytes of a column of the current row, or `None` for NULL.
    pub fn column_bytes(&self, index: usize) -> Option<Vec<u8>> {
        if index >= self.data_count() {
            return None;
        }
        // SAFETY: a row is current (data_count > index)
        unsafe {
            if types::column_is_null(self.handle, index as c_int) {
                None
            } else {
                Some(types::column_bytes(self.handle, index as c_int))
            }
        }
    }
}

fn check_arity(expected: usize, supplied: usize) -> Result<()> {
    if expected == supplied {
        Ok(())
    } else {
        Err(Error::programming(format!(
            "Incorrect number of bindings supplied. The current statement uses {expected}, \
             and there are {supplied} supplied."
        )))
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::trace!(error = %e, "Finalize on drop reported an error");
        }
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("prepared", &self.is_prepared())
            .field("in_use", &self.in_use)
            .finish()
    }
}
