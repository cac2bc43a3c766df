use sqlcursor::prelude::*;
use sqlcursor::{Conform, CustomValue, FromValue, Registry, TypeCode, json_registry};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

impl Conform for Point {
    fn conform(&self) -> Value {
        Value::Text(format!("{},{}", self.x, self.y))
    }
}

fn parse_point(raw: &[u8]) -> sqlcursor::Result<Value> {
    let text = std::str::from_utf8(raw).map_err(|e| Error::custom(e.to_string()))?;
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| Error::custom(format!("not a point: {text}")))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| Error::custom(e.to_string()))
    };
    Ok(Value::Custom(CustomValue::new(Point {
        x: parse(x)?,
        y: parse(y)?,
    })))
}

fn memory_with(detect: DetectTypes) -> Connection {
    connect_with(&ConnectConfig::memory().detect_types(detect)).unwrap()
}

#[test]
fn insert_commit_select() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(a INTEGER, b TEXT)", ()).unwrap();
    cur.execute("INSERT INTO t VALUES (?, ?)", (1, "x")).unwrap();
    assert_eq!(cur.rowcount(), Some(1));
    conn.commit().unwrap();

    let rows = cur.execute("SELECT a,b FROM t", ()).unwrap().fetchall().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], vec![Value::Integer(1), Value::Text("x".into())]);
    assert_eq!(rows[0].get_named::<String>("b").unwrap(), "x");
}

#[test]
fn executemany_counts_rows() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(a INTEGER, b TEXT)", ()).unwrap();
    cur.executemany(
        "INSERT INTO t VALUES (?, ?)",
        [(1, "a"), (2, "b"), (3, "c")],
    )
    .unwrap();
    assert_eq!(cur.rowcount(), Some(3));

    let count = cur
        .execute("SELECT count(*) FROM t", ())
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(count[0], Value::Integer(3));
}

#[test]
fn point_converter_by_declared_type() {
    let conn = memory_with(DetectTypes::DECLTYPES);
    conn.register_converter("POINT", parse_point).unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(p point)", ()).unwrap();
    cur.execute("INSERT INTO t VALUES (?)", ("1,2",)).unwrap();

    let row = cur
        .execute("SELECT p FROM t", ())
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(row[0].as_custom::<Point>(), Some(&Point { x: 1.0, y: 2.0 }));
    assert_ne!(row[0], Value::Text("1,2".into()));
}

#[test]
fn point_round_trip_through_conform_and_colname_hint() {
    let conn = memory_with(DetectTypes::COLNAMES);
    conn.register_converter("point", parse_point).unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(p)", ()).unwrap();
    let point = Point { x: 4.0, y: -1.5 };
    cur.execute(
        "INSERT INTO t VALUES (?)",
        (CustomValue::conforming(point.clone()),),
    )
    .unwrap();

    let row = cur
        .execute("SELECT p AS \"p [point]\", p FROM t", ())
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(row[0].as_custom::<Point>(), Some(&point));
    assert_eq!(row[1], Value::Text("4,-1.5".into()));
    assert_eq!(cur.description().unwrap()[0].name, "p");
}

#[test]
fn registered_adapter_beats_conform() {
    let conn = connect(":memory:").unwrap();
    conn.register_adapter::<Point, _>(|p| Ok(Value::Text(format!("({};{})", p.x, p.y))))
        .unwrap();
    let row = conn
        .execute(
            "SELECT ?",
            (CustomValue::conforming(Point { x: 1.0, y: 2.0 }),),
        )
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Text("(1;2)".into()));
}

#[test]
fn unsupported_parameter_is_interface_error() {
    let conn = connect(":memory:").unwrap();
    let err = conn
        .execute("SELECT ?", (CustomValue::new(Point { x: 0.0, y: 0.0 }),))
        .unwrap_err();
    assert!(err.is_interface_error());
    assert!(!err.is_database_error());
}

#[test]
fn primitives_round_trip_without_converters() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(v)", ()).unwrap();
    let values = vec![
        Value::Null,
        Value::Integer(0),
        Value::Integer(i64::MAX),
        Value::Integer(i64::MIN),
        Value::Real(-0.25),
        Value::Real(1e300),
        Value::Text(String::new()),
        Value::Text("snowman \u{2603}".into()),
        Value::Blob(vec![]),
        Value::Blob((0..=255).collect()),
    ];
    for value in &values {
        cur.execute("INSERT INTO t VALUES (?)", params![value.clone()])
            .unwrap();
    }
    let fetched: Vec<Value> = cur
        .execute("SELECT v FROM t ORDER BY rowid", ())
        .unwrap()
        .fetchall()
        .unwrap()
        .into_iter()
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(fetched, values);
}

#[test]
fn null_ignores_declared_type() {
    let conn = memory_with(DetectTypes::DECLTYPES);
    conn.register_converter("INTEGER", |_| Ok(Value::Text("converted".into())))
        .unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(a INTEGER)", ()).unwrap();
    cur.execute("INSERT INTO t VALUES (NULL)", ()).unwrap();
    cur.execute("INSERT INTO t VALUES (1)", ()).unwrap();
    let values: Vec<Value> = cur
        .execute("SELECT a FROM t ORDER BY rowid", ())
        .unwrap()
        .map(|row| row.unwrap()[0].clone())
        .collect();
    assert_eq!(values, [Value::Null, Value::Text("converted".into())]);
}

#[test]
fn unknown_declared_type_passes_through() {
    let conn = memory_with(DetectTypes::DECLTYPES | DetectTypes::COLNAMES);
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(a WIDGET, b)", ()).unwrap();
    cur.execute("INSERT INTO t VALUES ('w', 2)", ()).unwrap();
    let row = cur
        .execute("SELECT a, b AS \"b [nothing]\" FROM t", ())
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Text("w".into()));
    assert_eq!(row[1], Value::Integer(2));
    assert_eq!(cur.conversion_failures(), 0);
}

#[test]
fn binding_arity_is_checked() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    for placeholders in 0..3_usize {
        let sql = if placeholders == 0 {
            "SELECT 1".to_string()
        } else {
            format!("SELECT {}", vec!["?"; placeholders].join(", "))
        };
        for supplied in 0..5_usize {
            let params = Params::Positional(vec![Value::Integer(7); supplied]);
            let result = cur.execute(&sql, params);
            if supplied == placeholders {
                result.unwrap();
            } else {
                let err = result.unwrap_err();
                assert!(err.is_programming());
                assert_eq!(
                    err.message(),
                    format!(
                        "Incorrect number of bindings supplied. The current statement uses \
                         {placeholders}, and there are {supplied} supplied."
                    )
                );
            }
        }
    }
}

#[test]
fn named_parameters() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    let row = cur
        .execute(
            "SELECT :name || '!', @n * 2",
            named_params! { "name" => "hi", ":n" => 21 },
        )
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(row[0], Value::Text("hi!".into()));
    assert_eq!(row[1], Value::Integer(42));

    let mut map = HashMap::new();
    map.insert("other".to_string(), Value::Integer(1));
    let err = cur.execute("SELECT :name", map).unwrap_err();
    assert!(err.is_programming());
    assert_eq!(
        err.message(),
        "You did not supply a value for binding parameter :name."
    );
}

#[test]
fn exhausted_cursor_stays_exhausted() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("SELECT 1", ()).unwrap();
    assert!(cur.fetchone().unwrap().is_some());
    for _ in 0..5 {
        assert!(cur.fetchone().unwrap().is_none());
    }
    assert!(cur.fetchall().unwrap().is_empty());

    cur.execute("SELECT 2", ()).unwrap();
    assert_eq!(cur.fetchone().unwrap().unwrap()[0], Value::Integer(2));
}

#[test]
fn rowcount_and_lastrowid_reset_per_execute() {
    let conn = connect(":memory:").unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v)", ()).unwrap();
    assert_eq!((cur.rowcount(), cur.lastrowid()), (None, None));

    cur.execute("INSERT INTO t(v) VALUES ('a')", ()).unwrap();
    cur.execute("INSERT INTO t(v) VALUES ('b')", ()).unwrap();
    assert_eq!((cur.rowcount(), cur.lastrowid()), (Some(1), Some(2)));

    cur.execute("SELECT * FROM t", ()).unwrap();
    assert_eq!((cur.rowcount(), cur.lastrowid()), (None, None));

    cur.execute("DELETE FROM t", ()).unwrap();
    assert_eq!((cur.rowcount(), cur.lastrowid()), (Some(2), None));
}

#[test]
fn implicit_transactions_follow_dml() {
    let conn = connect(":memory:").unwrap();
    conn.execute("CREATE TABLE t(a)", ()).unwrap();
    assert!(!conn.in_transaction());

    conn.execute("SELECT * FROM t", ()).unwrap();
    assert!(!conn.in_transaction());

    conn.execute("INSERT INTO t VALUES (1)", ()).unwrap();
    assert!(conn.in_transaction());
    conn.rollback().unwrap();

    let count = conn
        .execute("SELECT count(*) FROM t", ())
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(count.get_as::<i64>(0).unwrap(), 0);
}

#[test]
fn integrity_errors_carry_engine_text() {
    let conn = connect(":memory:").unwrap();
    conn.execute("CREATE TABLE t(a UNIQUE)", ()).unwrap();
    conn.execute("INSERT INTO t VALUES (1)", ()).unwrap();
    let err = conn.execute("INSERT INTO t VALUES (1)", ()).unwrap_err();
    assert!(err.is_integrity());
    assert!(err.is_database_error());
    assert!(err.message().contains("UNIQUE constraint failed"));
    assert!(err.to_string().starts_with("IntegrityError"));
}

#[test]
fn json_values_round_trip() {
    let conn = connect_with(
        &ConnectConfig::memory()
            .detect_types(DetectTypes::DECLTYPES)
            .registry(json_registry()),
    )
    .unwrap();
    let mut cur = conn.cursor().unwrap();
    cur.execute("CREATE TABLE docs(body json)", ()).unwrap();
    let doc = serde_json::json!({"tags": ["a", "b"], "n": 3});
    cur.execute("INSERT INTO docs VALUES (?)", (CustomValue::new(doc.clone()),))
        .unwrap();

    let row = cur
        .execute("SELECT body, body AS raw_text FROM docs", ())
        .unwrap()
        .fetchone()
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::Value::from_value(&row[0]).unwrap(), doc);
    assert_eq!(row.get_named::<serde_json::Value>("raw_text").unwrap(), doc);
}

#[test]
fn description_reports_type_codes() {
    let conn = memory_with(DetectTypes::DECLTYPES);
    let mut cur = conn.cursor().unwrap();
    cur.execute(
        "CREATE TABLE t(i BIGINT, f DOUBLE, s VARCHAR(10), b BLOB, d TIMESTAMP, x)",
        (),
    )
    .unwrap();
    cur.execute(
        "INSERT INTO t VALUES (1, 1.5, 's', x'00', '2024-01-01 00:00:00', 'free')",
        (),
    )
    .unwrap();
    cur.execute("SELECT * FROM t", ()).unwrap();
    let codes: Vec<_> = cur
        .description()
        .unwrap()
        .iter()
        .map(|d| d.type_code)
        .collect();
    assert_eq!(
        codes,
        [
            Some(TypeCode::Number),
            Some(TypeCode::Number),
            Some(TypeCode::String),
            Some(TypeCode::Binary),
            Some(TypeCode::DateTime),
            Some(TypeCode::String),
        ]
    );
}

#[test]
fn registries_are_isolated_per_connection() {
    let mut shared = Registry::new();
    shared.register_converter("point", parse_point);
    let config = ConnectConfig::memory()
        .detect_types(DetectTypes::DECLTYPES)
        .registry(shared);
    let first = connect_with(&config).unwrap();
    let second = connect_with(&config).unwrap();
    second
        .register_converter("point", |_| Ok(Value::Text("second".into())))
        .unwrap();

    for conn in [&first, &second] {
        conn.execute("CREATE TABLE t(p point)", ()).unwrap();
        conn.execute("INSERT INTO t VALUES ('0,0')", ()).unwrap();
    }
    let read = |conn: &Connection| {
        conn.execute("SELECT p FROM t", ())
            .unwrap()
            .fetchone()
            .unwrap()
            .unwrap()[0]
            .clone()
    };
    assert!(read(&first).as_custom::<Point>().is_some());
    assert_eq!(read(&second), Value::Text("second".into()));
}
