//! Error types for sqlcursor operations.
//!
//! The taxonomy follows the DB-API hierarchy:
//!
//! ```text
//! Error
//!  ├── InterfaceError
//!  └── DatabaseError
//!       ├── InternalError
//!       ├── OperationalError
//!       ├── ProgrammingError
//!       ├── IntegrityError
//!       ├── DataError
//!       └── NotSupportedError
//! ```
//!
//! `Error::Database` carries a [`DatabaseErrorKind`] selecting the subclass;
//! the `is_*` predicates answer "is this an instance of" questions the way an
//! exception hierarchy would.

use std::fmt;

/// The primary error type for all sqlcursor operations.
#[derive(Debug)]
pub enum Error {
    /// Binding or API misuse that never reached the engine
    Interface(InterfaceError),
    /// Problems raised by, or detected alongside, the engine
    Database(DatabaseError),
    /// Typed extraction from a fetched value failed
    Type(TypeError),
    /// Error raised by user code (converters, adapters, functions)
    Custom(String),
}

#[derive(Debug)]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    /// A parameter has no primitive mapping and no adapter
    UnsupportedType,
    /// An adapter returned something the engine cannot bind
    Adapter,
    /// An offset or length outside the permitted range
    Range,
    /// Anything else
    Other,
}

#[derive(Debug)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    /// Primary engine result code, when the error came from the engine
    pub code: Option<i32>,
    /// Extended engine result code
    pub extended_code: Option<i32>,
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Subclass of `DatabaseError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Plain `DatabaseError` with no more specific subclass
    Database,
    /// Engine internal error, not-found or empty-result inconsistency
    Internal,
    /// Locking, permission, I/O, interrupt, protocol, abort
    Operational,
    /// Misuse: wrong thread, closed resource, bad parameters, engine misuse code
    Programming,
    /// Constraint or type-mismatch violation
    Integrity,
    /// Value too large
    Data,
    /// Reserved for capability gaps
    NotSupported,
}

impl DatabaseErrorKind {
    /// The DB-API class name for this kind.
    pub const fn class_name(self) -> &'static str {
        match self {
            DatabaseErrorKind::Database => "DatabaseError",
            DatabaseErrorKind::Internal => "InternalError",
            DatabaseErrorKind::Operational => "OperationalError",
            DatabaseErrorKind::Programming => "ProgrammingError",
            DatabaseErrorKind::Integrity => "IntegrityError",
            DatabaseErrorKind::Data => "DataError",
            DatabaseErrorKind::NotSupported => "NotSupportedError",
        }
    }
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build an `InterfaceError`.
    pub fn interface(kind: InterfaceErrorKind, message: impl Into<String>) -> Self {
        Error::Interface(InterfaceError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Build a `DatabaseError` of the given kind with no engine code attached.
    pub fn database(kind: DatabaseErrorKind, message: impl Into<String>) -> Self {
        Error::Database(DatabaseError {
            kind,
            code: None,
            extended_code: None,
            message: message.into(),
            sql: None,
            source: None,
        })
    }

    /// Shorthand for a `ProgrammingError`.
    pub fn programming(message: impl Into<String>) -> Self {
        Self::database(DatabaseErrorKind::Programming, message)
    }

    /// Shorthand for an `OperationalError`.
    pub fn operational(message: impl Into<String>) -> Self {
        Self::database(DatabaseErrorKind::Operational, message)
    }

    /// Error raised from user code.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// Attach the SQL text that was being executed.
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        if let Error::Database(e) = &mut self {
            e.sql = Some(sql.into());
        }
        self
    }

    /// The `DatabaseError` subclass, if this is a database error.
    pub fn database_kind(&self) -> Option<DatabaseErrorKind> {
        match self {
            Error::Database(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_interface_error(&self) -> bool {
        matches!(self, Error::Interface(_))
    }

    /// True for `DatabaseError` and every one of its subclasses.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::Database(_))
    }

    pub fn is_internal(&self) -> bool {
        self.database_kind() == Some(DatabaseErrorKind::Internal)
    }

    pub fn is_operational(&self) -> bool {
        self.database_kind() == Some(DatabaseErrorKind::Operational)
    }

    pub fn is_programming(&self) -> bool {
        self.database_kind() == Some(DatabaseErrorKind::Programming)
    }

    pub fn is_integrity(&self) -> bool {
        self.database_kind() == Some(DatabaseErrorKind::Integrity)
    }

    pub fn is_data_error(&self) -> bool {
        self.database_kind() == Some(DatabaseErrorKind::Data)
    }

    pub fn is_not_supported(&self) -> bool {
        self.database_kind() == Some(DatabaseErrorKind::NotSupported)
    }

    /// Primary engine result code, if the engine produced this error.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::Database(e) => e.code,
            _ => None,
        }
    }

    /// Extended engine result code, if the engine produced this error.
    pub fn extended_code(&self) -> Option<i32> {
        match self {
            Error::Database(e) => e.extended_code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Database(e) => e.sql.as_deref(),
            _ => None,
        }
    }

    /// The bare message, without the class prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Interface(e) => e.message.clone(),
            Error::Database(e) => e.message.clone(),
            Error::Type(e) => e.to_string(),
            Error::Custom(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Interface(e) => write!(f, "InterfaceError: {}", e.message),
            Error::Database(e) => write!(f, "{}: {}", e.kind.class_name(), e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Interface(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Database(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<InterfaceError> for Error {
    fn from(err: InterfaceError) -> Self {
        Error::Interface(err)
    }
}

impl From<DatabaseError> for Error {
    fn from(err: DatabaseError) -> Self {
        Error::Database(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Custom(format!("JSON error: {err}"))
    }
}

/// Result type alias for sqlcursor operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_predicates() {
        let err = Error::operational("database is locked");
        assert!(err.is_database_error());
        assert!(err.is_operational());
        assert!(!err.is_programming());
        assert!(!err.is_interface_error());

        let err = Error::interface(InterfaceErrorKind::UnsupportedType, "nope");
        assert!(err.is_interface_error());
        assert!(!err.is_database_error());
        assert_eq!(err.database_kind(), None);
    }

    #[test]
    fn display_uses_class_name() {
        let err = Error::programming("You can only execute one statement at a time.");
        assert_eq!(
            err.to_string(),
            "ProgrammingError: You can only execute one statement at a time."
        );
        assert_eq!(
            err.message(),
            "You can only execute one statement at a time."
        );
    }

    #[test]
    fn with_sql_only_touches_database_errors() {
        let err = Error::database(DatabaseErrorKind::Integrity, "UNIQUE constraint failed")
            .with_sql("INSERT INTO t VALUES (1)");
        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (1)"));
        assert!(err.is_integrity());

        let err = Error::custom("boom").with_sql("SELECT 1");
        assert_eq!(err.sql(), None);
    }

    #[test]
    fn engine_codes_are_exposed() {
        let err = Error::Database(DatabaseError {
            kind: DatabaseErrorKind::Operational,
            code: Some(5),
            extended_code: Some(517),
            message: "database is locked".to_string(),
            sql: None,
            source: None,
        });
        assert_eq!(err.code(), Some(5));
        assert_eq!(err.extended_code(), Some(517));
        assert_eq!(
            DatabaseErrorKind::NotSupported.class_name(),
            "NotSupportedError"
        );
    }
}
