//! Cursors: one statement's execute/fetch lifecycle.
//!
//! A cursor owns at most one prepared statement at a time. `execute`
//! replaces it, binds one parameter set and steps once; fetches then
//! continue stepping. The last step result is cached so fetching past the
//! end keeps returning nothing until the next `execute`.

use crate::connection::{Connection, DetectTypes};
use crate::error::CLOSED_CURSOR;
use crate::ffi;
use crate::statement::{Statement, StatementKind, is_blank_tail};
use sqlcursor_core::types::{TypeFamily, column_type_hint, declared_type_name};
use sqlcursor_core::{
    ColumnDescription, ColumnInfo, Converter, Error, Params, Registry, Result, Row, TypeCode,
    Value,
};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

const ONE_STATEMENT: &str = "You can only execute one statement at a time.";
const EXECUTEMANY_DML: &str = "executemany() can only execute DML statements.";

/// Cached outcome of the most recent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Nothing is known yet; the next fetch must step.
    Unknown,
    /// A row is current and has not been handed out.
    Row,
    /// The statement is exhausted.
    Done,
}

/// Per-query execution and iteration context bound to one connection.
pub struct Cursor {
    conn: Connection,
    statement: Option<Statement>,
    kind: StatementKind,
    step: StepState,
    description: Option<Vec<ColumnDescription>>,
    columns: Option<Arc<ColumnInfo>>,
    declared_codes: Vec<Option<TypeCode>>,
    rowcount: Option<i64>,
    lastrowid: Option<i64>,
    arraysize: usize,
    cast_map: Vec<Option<Converter>>,
    expected_types: HashMap<String, String>,
    conversion_failures: u64,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn,
            statement: None,
            kind: StatementKind::Other,
            step: StepState::Done,
            description: None,
            columns: None,
            declared_codes: Vec::new(),
            rowcount: None,
            lastrowid: None,
            arraysize: 1,
            cast_map: Vec::new(),
            expected_types: HashMap::new(),
            conversion_failures: 0,
            closed: false,
        }
    }

    fn check(&self) -> Result<()> {
        self.conn.check()?;
        if self.closed {
            return Err(Error::programming(CLOSED_CURSOR));
        }
        Ok(())
    }

    fn reset_results(&mut self) {
        // Dropping the statement finalizes it.
        self.statement = None;
        self.kind = StatementKind::Other;
        self.step = StepState::Unknown;
        self.description = None;
        self.columns = None;
        self.declared_codes.clear();
        self.rowcount = None;
        self.lastrowid = None;
        self.cast_map.clear();
    }

    /// Execute one statement with one parameter set.
    ///
    /// INSERT, UPDATE and DELETE open a transaction first when none is
    /// pending. Text after the first statement is rejected unless the
    /// connection allows multiple statements.
    #[tracing::instrument(level = "debug", skip(self, params))]
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<&mut Self> {
        self.check()?;
        let params = params.into();
        let overrides = std::mem::take(&mut self.expected_types);
        self.reset_results();

        let db = self.conn.check()?;
        let registry = self.conn.registry();

        // SAFETY: db was returned by a successful check
        let (mut stmt, mut tail) = unsafe { Statement::prepare(db, sql) }?;
        while !is_blank_tail(&tail) {
            if !self.conn.allows_multiple_statements() {
                return Err(Error::programming(ONE_STATEMENT));
            }
            self.run_leading(stmt)?;
            // SAFETY: as above; the connection is still open
            (stmt, tail) = unsafe { Statement::prepare(db, &tail) }?;
        }

        self.kind = StatementKind::classify(stmt.sql());
        if self.kind.is_dml() && !self.conn.in_transaction() {
            self.conn.begin()?;
        }

        stmt.bind(&params, &registry)?;
        self.build_cast_map(&stmt, &registry, &overrides);
        self.statement = Some(stmt);

        self.advance()?;

        if self.kind.is_dml() {
            self.rowcount = Some(self.conn.changes()?);
            if self.kind == StatementKind::Insert {
                self.lastrowid = Some(self.conn.last_insert_rowid()?);
            }
        }
        Ok(self)
    }

    /// Run a leading statement of a multi-statement string to completion.
    fn run_leading(&mut self, mut stmt: Statement) -> Result<()> {
        if stmt.parameter_count() > 0 {
            return Err(Error::programming(
                "Only the last statement of a multi-statement execute may take parameters.",
            ));
        }
        if StatementKind::classify(stmt.sql()).is_dml() && !self.conn.in_transaction() {
            self.conn.begin()?;
        }
        tracing::trace!(sql = %stmt.sql(), "Running leading statement");
        let policy = self.conn.busy_policy();
        let db = self.conn.check()?;
        loop {
            match policy.step_with_retry(|| stmt.step()) {
                ffi::SQLITE_ROW => {}
                ffi::SQLITE_DONE => break,
                rc => {
                    let err = stmt.step_error(rc);
                    self.conn.sync_transaction_state(db);
                    return Err(err);
                }
            }
        }
        self.conn.sync_transaction_state(db);
        stmt.finalize()
    }

    /// Execute one statement once per parameter set.
    ///
    /// The statement must not produce rows: a SELECT is rejected before
    /// anything runs, and any other statement fails on the first set that
    /// yields a row. For INSERT, UPDATE and DELETE `rowcount` ends up as
    /// the total number of changed rows; on failure it reflects the sets
    /// processed before the failing one and the statement is released.
    #[tracing::instrument(level = "debug", skip(self, param_sets))]
    pub fn executemany<I, P>(&mut self, sql: &str, param_sets: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.check()?;
        self.expected_types.clear();
        self.reset_results();

        let db = self.conn.check()?;
        let registry = self.conn.registry();

        // SAFETY: db was returned by a successful check
        let (mut stmt, tail) = unsafe { Statement::prepare(db, sql) }?;
        if !is_blank_tail(&tail) {
            return Err(Error::programming(ONE_STATEMENT));
        }
        self.kind = StatementKind::classify(stmt.sql());
        if self.kind == StatementKind::Select {
            return Err(Error::programming(EXECUTEMANY_DML));
        }
        if self.kind.is_dml() && !self.conn.in_transaction() {
            self.conn.begin()?;
        }

        let policy = self.conn.busy_policy();
        let mut total: i64 = 0;
        for params in param_sets {
            let outcome = stmt.bind(&params.into(), &registry).and_then(|()| {
                match policy.step_with_retry(|| stmt.step()) {
                    ffi::SQLITE_DONE => Ok(()),
                    ffi::SQLITE_ROW => Err(Error::programming(EXECUTEMANY_DML)),
                    rc => Err(stmt.step_error(rc)),
                }
            });
            if let Err(e) = outcome {
                self.rowcount = self.kind.is_dml().then_some(total);
                self.step = StepState::Done;
                if let Err(finalize_err) = stmt.finalize() {
                    tracing::trace!(
                        error = %finalize_err,
                        "Finalize after executemany failure reported an error"
                    );
                }
                self.conn.sync_transaction_state(db);
                return Err(e);
            }
            // Only DML leaves a fresh change count behind.
            if self.kind.is_dml() {
                total += self.conn.changes()?;
            }
            stmt.reset()?;
        }

        self.conn.sync_transaction_state(db);
        self.rowcount = self.kind.is_dml().then_some(total);
        if self.kind == StatementKind::Insert {
            self.lastrowid = Some(self.conn.last_insert_rowid()?);
        }
        self.step = StepState::Done;
        self.statement = Some(stmt);
        Ok(self)
    }

    /// Resolve a converter per result column.
    ///
    /// Precedence: per-query override, then a `[type]` column-name hint,
    /// then the declared type (exact leading word, then its family).
    fn build_cast_map(
        &mut self,
        stmt: &Statement,
        registry: &Registry,
        overrides: &HashMap<String, String>,
    ) {
        let detect = self.conn.detect_types();
        let advanced = !detect.is_empty() || !overrides.is_empty();
        let count = stmt.column_count();

        let mut names = Vec::with_capacity(count);
        self.cast_map = Vec::with_capacity(count);
        self.declared_codes = Vec::with_capacity(count);

        for i in 0..count {
            let raw_name = stmt.column_name(i).unwrap_or_default();
            let hint = if detect.contains(DetectTypes::COLNAMES) {
                column_type_hint(&raw_name)
            } else {
                None
            };
            let decltype = stmt.column_decltype(i);
            let family = decltype.as_deref().and_then(TypeFamily::classify);
            self.declared_codes.push(family.map(TypeFamily::type_code));

            let converter = if !advanced {
                None
            } else if let Some(type_name) = overrides.get(&raw_name) {
                registry.converter(type_name)
            } else if let Some((_, type_name)) = &hint {
                registry.converter(type_name)
            } else if detect.contains(DetectTypes::DECLTYPES) {
                decltype.as_deref().and_then(|decl| {
                    declared_type_name(decl)
                        .and_then(|word| registry.converter(&word))
                        .or_else(|| family.and_then(|f| registry.converter(f.canonical_name())))
                })
            } else {
                None
            };
            self.cast_map.push(converter);
            names.push(hint.map_or(raw_name, |(display, _)| display));
        }

        self.columns = Some(Arc::new(ColumnInfo::new(names)));
    }

    /// Step once, caching the outcome. Exhaustion rewinds the statement;
    /// an engine error releases it.
    fn advance(&mut self) -> Result<()> {
        let Some(stmt) = self.statement.as_mut() else {
            self.step = StepState::Done;
            return Ok(());
        };
        let rc = self.conn.busy_policy().step_with_retry(|| stmt.step());
        let db = self.conn.check()?;
        self.conn.sync_transaction_state(db);
        match rc {
            ffi::SQLITE_ROW => {
                self.step = StepState::Row;
                if self.description.is_none() {
                    self.describe();
                }
                Ok(())
            }
            ffi::SQLITE_DONE => {
                self.step = StepState::Done;
                stmt.reset()
            }
            rc => {
                let err = stmt.step_error(rc);
                self.step = StepState::Done;
                self.statement = None;
                Err(err)
            }
        }
    }

    /// Fill `description` from column metadata and the current row.
    fn describe(&mut self) {
        let (Some(stmt), Some(columns)) = (self.statement.as_ref(), self.columns.as_ref()) else {
            return;
        };
        let description = columns
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnDescription {
                name: name.clone(),
                type_code: self
                    .declared_codes
                    .get(i)
                    .copied()
                    .flatten()
                    .or_else(|| TypeCode::from_value(&stmt.read_column(i))),
            })
            .collect();
        self.description = Some(description);
    }

    /// Build a row from the current engine row.
    fn materialize(&mut self) -> Row {
        let columns = self
            .columns
            .clone()
            .unwrap_or_else(|| Arc::new(ColumnInfo::new(Vec::new())));
        let Some(stmt) = self.statement.as_ref() else {
            return Row::with_columns(columns, Vec::new());
        };

        let mut values = Vec::with_capacity(stmt.data_count());
        for i in 0..stmt.data_count() {
            let Some(convert) = self.cast_map.get(i).and_then(Option::as_ref) else {
                values.push(stmt.read_column(i));
                continue;
            };
            let Some(bytes) = stmt.column_bytes(i) else {
                values.push(Value::Null);
                continue;
            };
            let value = match catch_unwind(AssertUnwindSafe(|| convert(&bytes))) {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    tracing::warn!(column = i, error = %e, "Converter failed; using NULL");
                    self.conversion_failures += 1;
                    Value::Null
                }
                Err(_) => {
                    tracing::warn!(column = i, "Converter panicked; using NULL");
                    self.conversion_failures += 1;
                    Value::Null
                }
            };
            values.push(value);
        }
        Row::with_columns(columns, values)
    }

    /// Next row, or `None` once the result set is exhausted.
    pub fn fetchone(&mut self) -> Result<Option<Row>> {
        self.check()?;
        if self.step == StepState::Unknown {
            self.advance()?;
        }
        match self.step {
            StepState::Row => {
                let row = self.materialize();
                self.step = StepState::Unknown;
                Ok(Some(row))
            }
            StepState::Done | StepState::Unknown => Ok(None),
        }
    }

    /// Up to `size` rows (default `arraysize`), fewer once exhausted.
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        let size = size.unwrap_or(self.arraysize);
        let mut rows = Vec::with_capacity(size.min(1024));
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Every remaining row.
    pub fn fetchall(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Release the statement. Later operations fail; closing again is a
    /// no-op.
    pub fn close(&mut self) -> Result<()> {
        self.conn.inner.check_thread()?;
        if let Some(mut stmt) = self.statement.take() {
            stmt.finalize()?;
        }
        self.step = StepState::Done;
        self.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Column descriptions of the current result, set on its first row.
    pub fn description(&self) -> Option<&[ColumnDescription]> {
        self.description.as_deref()
    }

    /// Rows changed by the last INSERT, UPDATE or DELETE; `None` after
    /// anything else.
    pub fn rowcount(&self) -> Option<i64> {
        self.rowcount
    }

    /// Rowid of the last INSERT; `None` after anything else.
    pub fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    pub fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size;
    }

    /// Accepted for DB-API compatibility; has no effect.
    pub fn setinputsizes(&mut self, _sizes: &[usize]) {}

    /// Accepted for DB-API compatibility; has no effect.
    pub fn setoutputsize(&mut self, _size: usize, _column: Option<usize>) {}

    /// Force converter type names for columns of the next `execute`,
    /// keyed by result column name.
    pub fn expect_types<I, K, V>(&mut self, types: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.expected_types = types
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Converter failures replaced by NULL over this cursor's lifetime.
    pub fn conversion_failures(&self) -> u64 {
        self.conversion_failures
    }

    pub fn step_state(&self) -> StepState {
        self.step
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetchone().transpose()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("statement", &self.statement)
            .field("step", &self.step)
            .field("rowcount", &self.rowcount)
            .field("lastrowid", &self.lastrowid)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
