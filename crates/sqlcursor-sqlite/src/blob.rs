//! Incremental I/O on a single BLOB cell.
//!
//! A [`Blob`] is a fixed-length byte stream with its own position. It
//! cannot grow. Changing the row underneath it (through any statement)
//! invalidates it; later reads and writes fail with a "modified blob"
//! OperationalError.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::connection::{Connection, ConnectionInner};
use crate::error::{self, CLOSED_BLOB, CLOSED_DATABASE, MODIFIED_BLOB, from_db};
use crate::ffi;
use sqlcursor_core::error::{DatabaseErrorKind, InterfaceErrorKind};
use sqlcursor_core::{Error, Result};
use std::ffi::{CString, c_int};
use std::io;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Reference point for [`Blob::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Engine handle shared with the owning connection so closing the
/// connection can close every open blob.
pub(crate) struct BlobState {
    handle: *mut ffi::sqlite3_blob,
}

// SAFETY: the handle belongs to a serialized-mode connection and is only
// touched under this state's mutex.
unsafe impl Send for BlobState {}

impl BlobState {
    /// Close the engine handle if still open. Returns the engine's code.
    pub(crate) fn close(state: &Mutex<BlobState>) -> c_int {
        let handle = {
            let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut guard.handle, ptr::null_mut())
        };
        if handle.is_null() {
            return ffi::SQLITE_OK;
        }
        // SAFETY: handle was open and is no longer reachable
        unsafe { ffi::sqlite3_blob_close(handle) }
    }
}

/// An open BLOB cell.
///
/// The blob does not keep its connection alive. Once every
/// [`Connection`] handle is gone the blob behaves as if the database was
/// closed.
pub struct Blob {
    conn: Weak<ConnectionInner>,
    state: Arc<Mutex<BlobState>>,
    offset: usize,
    length: usize,
}

impl Connection {
    /// Open the BLOB in `table.column` of row `row` in the main database.
    pub fn open_blob(&self, table: &str, column: &str, row: i64, readonly: bool) -> Result<Blob> {
        let db = self.check()?;
        let c_db = CString::new("main").map_err(|_| {
            Error::interface(InterfaceErrorKind::Other, "database name contains null byte")
        })?;
        let c_table = CString::new(table).map_err(|_| {
            Error::interface(InterfaceErrorKind::Other, "table name contains null byte")
        })?;
        let c_column = CString::new(column).map_err(|_| {
            Error::interface(InterfaceErrorKind::Other, "column name contains null byte")
        })?;

        let mut handle: *mut ffi::sqlite3_blob = ptr::null_mut();
        // SAFETY: db is live and all strings are NUL-terminated
        let rc = unsafe {
            ffi::sqlite3_blob_open(
                db,
                c_db.as_ptr(),
                c_table.as_ptr(),
                c_column.as_ptr(),
                row,
                c_int::from(!readonly),
                &mut handle,
            )
        };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is live; a failed open leaves handle null
            return Err(unsafe { from_db(db, rc) });
        }

        // SAFETY: handle was just opened
        let length = unsafe { ffi::sqlite3_blob_bytes(handle) }.max(0) as usize;
        let state = Arc::new(Mutex::new(BlobState { handle }));
        self.inner.track_blob(&state);
        tracing::debug!(table, column, row, readonly, length, "Opened blob");

        Ok(Blob {
            conn: self.downgrade(),
            state,
            offset: 0,
            length,
        })
    }
}

impl Blob {
    fn connection(&self) -> Result<Arc<ConnectionInner>> {
        self.conn
            .upgrade()
            .ok_or_else(|| Error::programming(CLOSED_DATABASE))
    }

    /// Connection check first, then the blob's own state.
    fn handle(&self) -> Result<MutexGuard<'_, BlobState>> {
        self.connection()?.check()?;
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.handle.is_null() {
            return Err(Error::programming(CLOSED_BLOB));
        }
        Ok(guard)
    }

    /// Size of the cell in bytes. Fixed for the blob's lifetime.
    pub fn len(&self) -> Result<usize> {
        drop(self.handle()?);
        Ok(self.length)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Current position.
    pub fn tell(&self) -> Result<usize> {
        drop(self.handle()?);
        Ok(self.offset)
    }

    fn remaining(&self) -> usize {
        self.length - self.offset
    }

    /// Read up to `len` bytes (everything left when `None`) from the
    /// current position.
    pub fn read(&mut self, len: Option<usize>) -> Result<Vec<u8>> {
        let want = len.unwrap_or(usize::MAX).min(self.remaining());
        let mut buf = vec![0_u8; want];
        let n = self.read_into(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let guard = self.handle()?;
        let n = buf.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        // SAFETY: handle is open; buf has room for n bytes and
        // offset + n <= length.
        let rc = unsafe {
            ffi::sqlite3_blob_read(
                guard.handle,
                buf.as_mut_ptr().cast(),
                n as c_int,
                self.offset as c_int,
            )
        };
        drop(guard);
        self.check_rc(rc)?;
        self.offset += n;
        Ok(n)
    }

    /// Write `data` at the current position. The blob cannot grow.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            drop(self.handle()?);
            return Err(Error::database(
                DatabaseErrorKind::Data,
                "data longer than blob length",
            ));
        }
        self.write_from(data).map(|_| ())
    }

    fn write_from(&mut self, data: &[u8]) -> Result<usize> {
        let guard = self.handle()?;
        let n = data.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        // SAFETY: handle is open and offset + n <= length
        let rc = unsafe {
            ffi::sqlite3_blob_write(
                guard.handle,
                data.as_ptr().cast(),
                n as c_int,
                self.offset as c_int,
            )
        };
        drop(guard);
        self.check_rc(rc)?;
        self.offset += n;
        Ok(n)
    }

    fn check_rc(&self, rc: c_int) -> Result<()> {
        match rc {
            ffi::SQLITE_OK => Ok(()),
            rc if rc & 0xff == ffi::SQLITE_ABORT => Err(error::from_code(rc, MODIFIED_BLOB)),
            rc => {
                let db = self.connection()?.check()?;
                // SAFETY: db is live
                Err(unsafe { from_db(db, rc) })
            }
        }
    }

    /// Move the position. Targets outside `0..=len()` are rejected.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<()> {
        drop(self.handle()?);
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.offset,
            Whence::End => self.length,
        };
        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .and_then(|t| usize::try_from(t).ok())
            .filter(|&t| t <= self.length)
            .ok_or_else(|| Error::interface(InterfaceErrorKind::Range, "offset out of blob range"))?;
        self.offset = target;
        Ok(())
    }

    /// Close the blob. Closing again, or after the connection closed, is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.upgrade() else {
            return Ok(());
        };
        conn.check_thread()?;
        if conn.is_closed() {
            return Ok(());
        }
        let rc = BlobState::close(&self.state);
        conn.untrack_blob(&self.state);
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(error::from_code(rc, ffi::error_string(rc)))
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle
            .is_null()
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        BlobState::close(&self.state);
        if let Some(conn) = self.conn.upgrade() {
            conn.untrack_blob(&self.state);
        }
    }
}

impl io::Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::other)
    }
}

impl io::Write for Blob {
    /// Short writes at the end of the cell; `write_all` turns them into
    /// `WriteZero`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_from(buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for Blob {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                Whence::Start,
            ),
            io::SeekFrom::Current(n) => (n, Whence::Current),
            io::SeekFrom::End(n) => (n, Whence::End),
        };
        Blob::seek(self, offset, whence).map_err(io::Error::other)?;
        Ok(self.offset as u64)
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("closed", &self.is_closed())
            .finish()
    }
}
