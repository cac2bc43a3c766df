//! SQLite connection implementation.
//!
//! A [`Connection`] is a cheap, clonable handle to one engine connection.
//! Cursors derived from it keep it alive; blobs do not. The engine handle
//! is closed exactly once, by [`Connection::close`] or when the last handle
//! goes away.
//!
//! ```rust,ignore
//! use sqlcursor_sqlite::{ConnectConfig, Connection};
//!
//! let conn = Connection::open(&ConnectConfig::memory())?;
//! let mut cur = conn.cursor()?;
//! cur.execute("CREATE TABLE t(a INTEGER, b TEXT)", ())?;
//! cur.execute("INSERT INTO t VALUES (?, ?)", (1, "x"))?;
//! conn.commit()?;
//! ```

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::blob::BlobState;
use crate::busy::{BusyHandler, BusyPolicy};
use crate::cursor::Cursor;
use crate::error::{self, CLOSED_DATABASE, WRONG_THREAD, from_db};
use crate::ffi;
use crate::statement::Statement;
use sqlcursor_core::error::InterfaceErrorKind;
use sqlcursor_core::{Error, Params, Registry, Result, Value};
use std::any::Any;
use std::ffi::{CStr, CString, c_int};
use std::ops::BitOr;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Which sources of column type names drive converter lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DetectTypes(u8);

impl DetectTypes {
    /// Engine-primitive typing only.
    pub const NONE: DetectTypes = DetectTypes(0);
    /// Use the declared type of the source table column.
    pub const DECLTYPES: DetectTypes = DetectTypes(1);
    /// Use a `[type]` hint in the result column name.
    pub const COLNAMES: DetectTypes = DetectTypes(2);

    pub const fn contains(self, other: DetectTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DetectTypes {
    type Output = DetectTypes;

    fn bitor(self, rhs: DetectTypes) -> DetectTypes {
        DetectTypes(self.0 | rhs.0)
    }
}

/// Configuration for opening connections.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// How long to keep retrying when the database is locked.
    pub timeout: Duration,
    pub detect_types: DetectTypes,
    /// Reject use from any thread but the one that opened the connection.
    pub check_same_thread: bool,
    /// Let `execute` run every statement in a multi-statement string.
    pub allow_multiple_statements: bool,
    /// Converters and adapters the connection starts with.
    pub registry: Registry,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Serialized threading mode is always requested: cursors and blobs may
    /// be moved between threads when the thread check is disabled.
    fn to_sqlite_flags(self) -> c_int {
        let mut flags = ffi::SQLITE_OPEN_FULLMUTEX;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self::new(":memory:")
    }
}

impl ConnectConfig {
    /// Config for a database at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            timeout: Duration::from_secs(5),
            detect_types: DetectTypes::NONE,
            check_same_thread: true,
            allow_multiple_statements: false,
            registry: Registry::new(),
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the busy timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn detect_types(mut self, detect_types: DetectTypes) -> Self {
        self.detect_types = detect_types;
        self
    }

    pub fn check_same_thread(mut self, check: bool) -> Self {
        self.check_same_thread = check;
        self
    }

    /// Compatibility mode: run every statement of a multi-statement string.
    pub fn allow_multiple_statements(mut self, allow: bool) -> Self {
        self.allow_multiple_statements = allow;
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }
}

/// Converter/adapter table shared with function trampolines.
///
/// Readers take a cheap snapshot; writers copy on write.
pub(crate) type SharedRegistry = Arc<RwLock<Arc<Registry>>>;

/// Mutable connection state, protected by a mutex.
struct State {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
    timeout: Duration,
    busy_handler: Option<BusyHandler>,
    blobs: Vec<Weak<Mutex<BlobState>>>,
}

pub(crate) struct ConnectionInner {
    state: Mutex<State>,
    registry: SharedRegistry,
    path: String,
    owner: ThreadId,
    check_same_thread: bool,
    detect_types: DetectTypes,
    allow_multiple_statements: bool,
}

// SAFETY: the engine connection is opened in serialized mode and all Rust
// side state is behind mutexes.
unsafe impl Send for ConnectionInner {}
unsafe impl Sync for ConnectionInner {}

impl ConnectionInner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn check_thread(&self) -> Result<()> {
        if self.check_same_thread && thread::current().id() != self.owner {
            return Err(Error::programming(WRONG_THREAD));
        }
        Ok(())
    }

    /// Thread and liveness check; returns the live engine handle.
    pub(crate) fn check(&self) -> Result<*mut ffi::sqlite3> {
        self.check_thread()?;
        let db = self.state().db;
        if db.is_null() {
            return Err(Error::programming(CLOSED_DATABASE));
        }
        Ok(db)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state().db.is_null()
    }

    pub(crate) fn track_blob(&self, blob: &Arc<Mutex<BlobState>>) {
        let mut state = self.state();
        state.blobs.retain(|b| b.strong_count() > 0);
        state.blobs.push(Arc::downgrade(blob));
    }

    pub(crate) fn untrack_blob(&self, blob: &Arc<Mutex<BlobState>>) {
        let target = Arc::downgrade(blob);
        self.state()
            .blobs
            .retain(|b| b.strong_count() > 0 && !b.ptr_eq(&target));
    }

    fn close_handle(&self) -> Result<()> {
        let (db, blobs) = {
            let mut state = self.state();
            let db = std::mem::replace(&mut state.db, ptr::null_mut());
            state.in_transaction = false;
            (db, std::mem::take(&mut state.blobs))
        };
        if db.is_null() {
            return Ok(());
        }
        for blob in blobs.iter().filter_map(Weak::upgrade) {
            BlobState::close(&blob);
        }
        // SAFETY: db is live and no longer reachable through `state`;
        // close_v2 defers teardown until outstanding statements finalize.
        let rc = unsafe { ffi::sqlite3_close_v2(db) };
        if rc == ffi::SQLITE_OK {
            tracing::debug!(path = %self.path, "Closed connection");
            Ok(())
        } else {
            Err(error::from_code(rc, ffi::error_string(rc)))
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Err(e) = self.close_handle() {
            tracing::warn!(error = %e, "Closing connection on drop failed");
        }
    }
}

/// A connection to a SQLite database.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &ConnectConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::interface(
                InterfaceErrorKind::Other,
                "Invalid path: contains null byte",
            )
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            // SAFETY: db is null or a handle that must be released
            let err = unsafe {
                let err = from_db(db, rc);
                if !db.is_null() {
                    ffi::sqlite3_close_v2(db);
                }
                err
            };
            let mut err = match err {
                Error::Database(mut e) => {
                    e.message = format!("unable to open database file: {}", e.message);
                    e
                }
                other => return Err(other),
            };
            err.kind = sqlcursor_core::DatabaseErrorKind::Operational;
            return Err(Error::Database(err));
        }

        // SAFETY: db is valid
        unsafe { ffi::sqlite3_extended_result_codes(db, 1) };

        tracing::debug!(path = %config.path, flags, "Opened connection");

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                state: Mutex::new(State {
                    db,
                    in_transaction: false,
                    timeout: config.timeout,
                    busy_handler: None,
                    blobs: Vec::new(),
                }),
                registry: Arc::new(RwLock::new(Arc::new(config.registry.clone()))),
                path: config.path.clone(),
                owner: thread::current().id(),
                check_same_thread: config.check_same_thread,
                detect_types: config.detect_types,
                allow_multiple_statements: config.allow_multiple_statements,
            }),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&ConnectConfig::memory())
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn detect_types(&self) -> DetectTypes {
        self.inner.detect_types
    }

    pub(crate) fn allows_multiple_statements(&self) -> bool {
        self.inner.allow_multiple_statements
    }

    pub(crate) fn check(&self) -> Result<*mut ffi::sqlite3> {
        self.inner.check()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Create a cursor on this connection.
    pub fn cursor(&self) -> Result<Cursor> {
        self.check()?;
        Ok(Cursor::new(self.clone()))
    }

    /// Create a cursor and hand it to `factory`, returning its product.
    pub fn cursor_with<T>(&self, factory: impl FnOnce(Cursor) -> T) -> Result<T> {
        self.cursor().map(factory)
    }

    /// Shortcut: create a cursor and execute one statement on it.
    pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<Cursor> {
        let mut cursor = self.cursor()?;
        cursor.execute(sql, params)?;
        Ok(cursor)
    }

    /// Shortcut: create a cursor and run `executemany` on it.
    pub fn executemany<I, P>(&self, sql: &str, param_sets: I) -> Result<Cursor>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let mut cursor = self.cursor()?;
        cursor.executemany(sql, param_sets)?;
        Ok(cursor)
    }

    /// Commit any pending transaction, then run a whole script of
    /// statements without parameters. No busy retry is applied.
    #[tracing::instrument(level = "debug", skip(self, sql))]
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        self.commit()?;
        let db = self.check()?;
        let c_sql = CString::new(sql).map_err(|_| {
            Error::interface(InterfaceErrorKind::Other, "SQL contains null byte")
        })?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc =
            unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };
        self.sync_transaction_state(db);

        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid string allocated by SQLite
                let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
                unsafe { ffi::sqlite3_free(errmsg.cast()) };
                msg
            };
            // SAFETY: db is live
            let code = unsafe { ffi::sqlite3_extended_errcode(db) };
            let code = if code & 0xff == rc & 0xff { code } else { rc };
            return Err(error::from_code(code, msg).with_sql(sql));
        }
        Ok(())
    }

    /// Whether a transaction opened through this connection is pending.
    pub fn in_transaction(&self) -> bool {
        self.inner.state().in_transaction
    }

    /// Open a transaction with a literal `BEGIN`.
    pub fn begin(&self) -> Result<()> {
        let db = self.check()?;
        self.run_control(db, "BEGIN")?;
        self.inner.state().in_transaction = true;
        tracing::debug!("Transaction started");
        Ok(())
    }

    /// Commit the pending transaction; a no-op when none is open.
    pub fn commit(&self) -> Result<()> {
        let db = self.check()?;
        if !self.in_transaction() {
            return Ok(());
        }
        self.run_control(db, "COMMIT")?;
        self.inner.state().in_transaction = false;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    /// Roll back the pending transaction; a no-op when none is open.
    pub fn rollback(&self) -> Result<()> {
        let db = self.check()?;
        if !self.in_transaction() {
            return Ok(());
        }
        self.run_control(db, "ROLLBACK")?;
        self.inner.state().in_transaction = false;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }

    fn run_control(&self, db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
        // SAFETY: db was returned by a successful check
        let (mut stmt, _) = unsafe { Statement::prepare(db, sql) }?;
        let rc = self.busy_policy().step_with_retry(|| stmt.step());
        if rc != ffi::SQLITE_DONE {
            let err = stmt.step_error(rc);
            self.sync_transaction_state(db);
            return Err(err);
        }
        stmt.finalize()
    }

    /// Re-read the engine's autocommit flag after arbitrary SQL ran.
    pub(crate) fn sync_transaction_state(&self, db: *mut ffi::sqlite3) {
        // SAFETY: db is live for the caller
        let autocommit = unsafe { ffi::sqlite3_get_autocommit(db) } != 0;
        self.inner.state().in_transaction = !autocommit;
    }

    /// Close the connection. Closing twice is a no-op; every derived
    /// cursor and blob fails afterwards.
    pub fn close(&self) -> Result<()> {
        self.inner.check_thread()?;
        self.inner.close_handle()
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> Result<i64> {
        let db = self.check()?;
        // SAFETY: db is valid
        Ok(i64::from(unsafe { ffi::sqlite3_changes(db) }))
    }

    /// Rows changed since the connection was opened.
    pub fn total_changes(&self) -> Result<i64> {
        let db = self.check()?;
        // SAFETY: db is valid
        Ok(i64::from(unsafe { ffi::sqlite3_total_changes(db) }))
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let db = self.check()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }

    pub fn timeout(&self) -> Duration {
        self.inner.state().timeout
    }

    /// Set the busy timeout used when no busy handler is registered.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.check()?;
        self.inner.state().timeout = timeout;
        Ok(())
    }

    /// Install a busy callback. It receives the retry count and returns
    /// whether to try again; it replaces the timeout-based backoff.
    pub fn set_busy_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(u32) -> bool + Send + Sync + 'static,
    {
        self.check()?;
        self.inner.state().busy_handler = Some(Arc::new(handler));
        Ok(())
    }

    /// Remove the busy callback, returning to timeout-based backoff.
    pub fn clear_busy_handler(&self) -> Result<()> {
        self.check()?;
        self.inner.state().busy_handler = None;
        Ok(())
    }

    pub(crate) fn busy_policy(&self) -> BusyPolicy {
        let state = self.inner.state();
        match &state.busy_handler {
            Some(handler) => BusyPolicy::Handler(Arc::clone(handler)),
            None => BusyPolicy::Backoff {
                timeout: state.timeout,
            },
        }
    }

    /// Register a converter for columns typed `name` (case-insensitive).
    pub fn register_converter<F>(&self, name: &str, converter: F) -> Result<()>
    where
        F: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.check()?;
        self.update_registry(|r| r.register_converter(name, converter));
        Ok(())
    }

    /// Register an adapter for parameters of host type `T`.
    pub fn register_adapter<T, F>(&self, adapter: F) -> Result<()>
    where
        T: Any,
        F: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        self.check()?;
        self.update_registry(|r| r.register_adapter::<T, F>(adapter));
        Ok(())
    }

    fn update_registry(&self, f: impl FnOnce(&mut Registry)) {
        let mut guard = self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard));
    }

    /// Snapshot of the current converter/adapter table.
    pub fn registry(&self) -> Arc<Registry> {
        registry_snapshot(&self.inner.registry)
    }

    pub(crate) fn shared_registry(&self) -> SharedRegistry {
        Arc::clone(&self.inner.registry)
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnectionInner> {
        Arc::downgrade(&self.inner)
    }
}

pub(crate) fn registry_snapshot(shared: &SharedRegistry) -> Arc<Registry> {
    Arc::clone(&shared.read().unwrap_or_else(PoisonError::into_inner))
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = Connection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
        assert!(!conn.is_closed());
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_execute_script() {
        let conn = Connection::open_memory().unwrap();
        conn.execute_script(
            "CREATE TABLE t(a INTEGER); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);",
        )
        .unwrap();
        let mut cur = conn.execute("SELECT count(*) FROM t", ()).unwrap();
        assert_eq!(cur.fetchone().unwrap().unwrap()[0], Value::Integer(2));

        let err = conn.execute_script("CREATE TABLE t(a)").unwrap_err();
        assert!(err.is_operational());
        assert!(err.message().contains("already exists"));
    }

    #[test]
    fn test_transaction() {
        let conn = Connection::open_memory().unwrap();
        conn.execute("CREATE TABLE t(a INTEGER)", ()).unwrap();

        conn.execute("INSERT INTO t VALUES (1)", ()).unwrap();
        assert!(conn.in_transaction());
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());

        conn.execute("INSERT INTO t VALUES (2)", ()).unwrap();
        conn.commit().unwrap();
        assert!(!conn.in_transaction());

        let rows = conn.execute("SELECT a FROM t", ()).unwrap().fetchall().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Integer(2));
    }

    #[test]
    fn commit_and_rollback_without_transaction_are_noops() {
        let conn = Connection::open_memory().unwrap();
        conn.commit().unwrap();
        conn.rollback().unwrap();
        conn.begin().unwrap();
        assert!(conn.in_transaction());
        conn.commit().unwrap();
        conn.commit().unwrap();
    }

    #[test]
    fn test_insert_rowid_and_changes() {
        let conn = Connection::open_memory().unwrap();
        conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, a)", ())
            .unwrap();
        conn.execute("INSERT INTO t(a) VALUES (1)", ()).unwrap();
        conn.execute("INSERT INTO t(a) VALUES (2)", ()).unwrap();
        assert_eq!(conn.last_insert_rowid().unwrap(), 2);
        conn.execute("UPDATE t SET a = 0", ()).unwrap();
        assert_eq!(conn.changes().unwrap(), 2);
        assert_eq!(conn.total_changes().unwrap(), 4);
    }

    #[test]
    fn close_is_once_and_fails_fast_afterwards() {
        let conn = Connection::open_memory().unwrap();
        let mut cur = conn.cursor().unwrap();
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(conn.is_closed());
        assert!(conn.cursor().unwrap_err().is_programming());
        assert!(conn.commit().unwrap_err().is_programming());
        let err = cur.execute("SELECT 1", ()).unwrap_err();
        assert!(err.is_programming());
        assert_eq!(err.message(), CLOSED_DATABASE);
    }

    #[test]
    fn other_threads_are_rejected() {
        let conn = Connection::open_memory().unwrap();
        let moved = conn.clone();
        let err = thread::spawn(move || moved.cursor().map(|_| ()))
            .join()
            .unwrap()
            .unwrap_err();
        assert!(err.is_programming());
        assert_eq!(err.message(), WRONG_THREAD);
    }

    #[test]
    fn thread_check_can_be_disabled() {
        let conn = Connection::open(&ConnectConfig::memory().check_same_thread(false)).unwrap();
        conn.execute("CREATE TABLE t(a)", ()).unwrap();
        let moved = conn.clone();
        thread::spawn(move || {
            moved.execute("INSERT INTO t VALUES (1)", ()).unwrap();
            moved.commit().unwrap();
        })
        .join()
        .unwrap();
        let rows = conn.execute("SELECT a FROM t", ()).unwrap().fetchall().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn open_failure_is_database_error() {
        let config = ConnectConfig::new("/nonexistent-dir/sub/db.sqlite").flags(OpenFlags::read_write());
        let err = Connection::open(&config).unwrap_err();
        assert!(err.is_database_error());
        assert!(err.is_operational());

        let err = Connection::open(&ConnectConfig::new("bad\0path")).unwrap_err();
        assert!(err.is_interface_error());
    }

    #[test]
    fn test_open_flags() {
        let flags = OpenFlags::read_only().to_sqlite_flags();
        assert_ne!(flags & ffi::SQLITE_OPEN_READONLY, 0);
        assert_eq!(flags & ffi::SQLITE_OPEN_CREATE, 0);
        assert_ne!(flags & ffi::SQLITE_OPEN_FULLMUTEX, 0);

        let flags = OpenFlags::default().to_sqlite_flags();
        assert_ne!(flags & ffi::SQLITE_OPEN_READWRITE, 0);
        assert_ne!(flags & ffi::SQLITE_OPEN_CREATE, 0);
    }

    #[test]
    fn detect_types_flags() {
        let both = DetectTypes::DECLTYPES | DetectTypes::COLNAMES;
        assert!(both.contains(DetectTypes::DECLTYPES));
        assert!(both.contains(DetectTypes::COLNAMES));
        assert!(!DetectTypes::DECLTYPES.contains(DetectTypes::COLNAMES));
        assert!(DetectTypes::NONE.is_empty());
    }

    #[test]
    fn registrations_are_per_connection() {
        let shared = {
            let mut r = Registry::new();
            r.register_converter("a", |_| Ok(Value::Null));
            r
        };
        let one = Connection::open(&ConnectConfig::memory().registry(shared.clone())).unwrap();
        let two = Connection::open(&ConnectConfig::memory().registry(shared)).unwrap();
        one.register_converter("b", |_| Ok(Value::Null)).unwrap();
        assert!(one.registry().converter("B").is_some());
        assert!(two.registry().converter("B").is_none());
        assert!(two.registry().converter("A").is_some());
    }

    #[test]
    fn busy_handler_replaces_timeout() {
        let conn = Connection::open_memory().unwrap();
        conn.set_timeout(Duration::from_millis(250)).unwrap();
        assert!(matches!(
            conn.busy_policy(),
            BusyPolicy::Backoff { timeout } if timeout == Duration::from_millis(250)
        ));
        conn.set_busy_handler(|_| false).unwrap();
        assert!(matches!(conn.busy_policy(), BusyPolicy::Handler(_)));
        conn.clear_busy_handler().unwrap();
        assert!(matches!(conn.busy_policy(), BusyPolicy::Backoff { .. }));
    }
}
