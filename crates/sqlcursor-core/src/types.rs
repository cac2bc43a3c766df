//! Declared-type classification.
//!
//! Column declared types are free-form strings (`VARCHAR(20)`, `BIGINT`,
//! `INTERVAL DAY`). They are classified by case-insensitive substring
//! matching against an ordered table; the first family whose pattern
//! occurs in the declared type wins.

use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Families a declared column type can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFamily {
    Interval,
    Integer,
    Float,
    Text,
    Unicode,
    Binary,
    Timestamp,
    Date,
    Time,
}

/// Ordered `(patterns, family)` table. `INTERVAL` precedes `INT`, and
/// `TIMESTAMP` precedes both `DATE` and `TIME`.
const FAMILIES: &[(&[&str], TypeFamily)] = &[
    (&["INTERVAL"], TypeFamily::Interval),
    (&["INT"], TypeFamily::Integer),
    (
        &["FLOAT", "NUMERIC", "NUMBER", "DECIMAL", "REAL", "DOUBLE"],
        TypeFamily::Float,
    ),
    (&["CHAR", "TEXT"], TypeFamily::Text),
    (&["UNICODE"], TypeFamily::Unicode),
    (&["BINARY", "BLOB"], TypeFamily::Binary),
    (&["TIMESTAMP"], TypeFamily::Timestamp),
    (&["DATE"], TypeFamily::Date),
    (&["TIME"], TypeFamily::Time),
];

impl TypeFamily {
    /// Classify a declared type string, or `None` if no family matches.
    pub fn classify(decltype: &str) -> Option<Self> {
        let upper = decltype.to_ascii_uppercase();
        FAMILIES
            .iter()
            .find(|(patterns, _)| patterns.iter().any(|p| upper.contains(p)))
            .map(|(_, family)| *family)
    }

    /// Name under which a converter for the whole family is registered.
    pub const fn canonical_name(self) -> &'static str {
        match self {
            TypeFamily::Interval => "INTERVAL",
            TypeFamily::Integer => "INTEGER",
            TypeFamily::Float => "FLOAT",
            TypeFamily::Text => "TEXT",
            TypeFamily::Unicode => "UNICODE",
            TypeFamily::Binary => "BINARY",
            TypeFamily::Timestamp => "TIMESTAMP",
            TypeFamily::Date => "DATE",
            TypeFamily::Time => "TIME",
        }
    }

    pub const fn type_code(self) -> TypeCode {
        match self {
            TypeFamily::Integer | TypeFamily::Float => TypeCode::Number,
            TypeFamily::Text | TypeFamily::Unicode => TypeCode::String,
            TypeFamily::Binary => TypeCode::Binary,
            TypeFamily::Interval
            | TypeFamily::Timestamp
            | TypeFamily::Date
            | TypeFamily::Time => TypeCode::DateTime,
        }
    }
}

/// DB-API type objects reported in `description`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCode {
    String,
    Binary,
    Number,
    DateTime,
}

impl TypeCode {
    /// Row ids compare equal to numbers.
    pub const ROWID: TypeCode = TypeCode::Number;

    /// Classify by a fetched value's storage class.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(_) | Value::Real(_) => Some(TypeCode::Number),
            Value::Text(_) => Some(TypeCode::String),
            Value::Blob(_) => Some(TypeCode::Binary),
            Value::Null | Value::Custom(_) => None,
        }
    }
}

/// Leading word of a declared type, uppercased: `"point(2)"` gives `"POINT"`.
pub fn declared_type_name(decltype: &str) -> Option<String> {
    let word = decltype
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()?;
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}

static COLUMN_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\s*\[([^\]]+)\]\s*$").expect("column hint pattern is valid")
});

/// Split a column name carrying a type hint, `"p [point]"`, into the
/// display name and the uppercased type name.
pub fn column_type_hint(column_name: &str) -> Option<(String, String)> {
    let caps = COLUMN_HINT.captures(column_name)?;
    let type_name = caps.get(2)?.as_str().trim();
    if type_name.is_empty() {
        return None;
    }
    Some((caps[1].to_string(), type_name.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_checked_before_int() {
        assert_eq!(
            TypeFamily::classify("interval day to second"),
            Some(TypeFamily::Interval)
        );
        assert_eq!(TypeFamily::classify("BIGINT"), Some(TypeFamily::Integer));
        assert_eq!(TypeFamily::classify("integer"), Some(TypeFamily::Integer));
    }

    #[test]
    fn families_in_order() {
        assert_eq!(TypeFamily::classify("NUMERIC(10,2)"), Some(TypeFamily::Float));
        assert_eq!(TypeFamily::classify("double precision"), Some(TypeFamily::Float));
        assert_eq!(TypeFamily::classify("VARCHAR(20)"), Some(TypeFamily::Text));
        assert_eq!(TypeFamily::classify("unicode"), Some(TypeFamily::Unicode));
        assert_eq!(TypeFamily::classify("varbinary"), Some(TypeFamily::Binary));
        assert_eq!(TypeFamily::classify("blob"), Some(TypeFamily::Binary));
        assert_eq!(TypeFamily::classify("timestamp"), Some(TypeFamily::Timestamp));
        assert_eq!(TypeFamily::classify("DATE"), Some(TypeFamily::Date));
        assert_eq!(TypeFamily::classify("DATETIME"), Some(TypeFamily::Date));
        assert_eq!(TypeFamily::classify("time"), Some(TypeFamily::Time));
    }

    #[test]
    fn first_match_wins_on_substrings() {
        // "POINT" contains "INT"
        assert_eq!(TypeFamily::classify("POINT"), Some(TypeFamily::Integer));
        // "CHARACTER VARYING" hits CHAR before anything else
        assert_eq!(TypeFamily::classify("character varying"), Some(TypeFamily::Text));
    }

    #[test]
    fn unknown_types_do_not_classify() {
        assert_eq!(TypeFamily::classify("GEOMETRY"), None);
        assert_eq!(TypeFamily::classify(""), None);
    }

    #[test]
    fn type_codes() {
        assert_eq!(TypeFamily::Float.type_code(), TypeCode::Number);
        assert_eq!(TypeFamily::Interval.type_code(), TypeCode::DateTime);
        assert_eq!(TypeCode::ROWID, TypeCode::Number);
        assert_eq!(
            TypeCode::from_value(&Value::Blob(vec![])),
            Some(TypeCode::Binary)
        );
        assert_eq!(TypeCode::from_value(&Value::Null), None);
    }

    #[test]
    fn declared_type_names() {
        assert_eq!(declared_type_name("point"), Some("POINT".to_string()));
        assert_eq!(declared_type_name("varchar(20)"), Some("VARCHAR".to_string()));
        assert_eq!(declared_type_name("  double precision"), Some("DOUBLE".to_string()));
        assert_eq!(declared_type_name(""), None);
    }

    #[test]
    fn column_hints() {
        assert_eq!(
            column_type_hint("p [point]"),
            Some(("p".to_string(), "POINT".to_string()))
        );
        assert_eq!(
            column_type_hint("count(*) [Integer]"),
            Some(("count(*)".to_string(), "INTEGER".to_string()))
        );
        assert_eq!(column_type_hint("plain"), None);
        assert_eq!(column_type_hint("x []"), None);
    }
}
