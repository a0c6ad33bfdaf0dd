//! Integration tests for the tablemap-sqlite crate.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::types::Value;
use tablemap_core::{MappingError, Record, RecordDef, SqlEnum, StorageType};
use tablemap_db::{Database, DatabaseConfig, DatabaseError};
use tablemap_sqlite::{MapError, Mapper};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
struct Department {
    id: i64,
    name: String,
    employees: Vec<Employee>,
}

impl Record for Department {
    const NAME: &'static str = "Department";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |d| d.id, |d, v| d.id = v).primary_key();
        def.field("Name", |d| d.name.clone(), |d, v| d.name = v);
        def.children("Employees", |d| &mut d.employees);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Employee {
    id: i64,
    name: String,
    department_id: i64,
}

impl Record for Employee {
    const NAME: &'static str = "Employee";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |e| e.id, |e, v| e.id = v).primary_key();
        def.field("Name", |e| e.name.clone(), |e, v| e.name = v);
        def.field("DepartmentID", |e| e.department_id, |e, v| e.department_id = v)
            .parent_key::<Department>();
    }
}

fn employee(name: &str) -> Employee {
    Employee {
        name: name.into(),
        ..Default::default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum Level {
    #[default]
    Low,
    High,
}

impl SqlEnum for Level {
    const TYPE_NAME: &'static str = "Level";

    fn variant_name(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::High => "High",
        }
    }

    fn from_variant_name(name: &str) -> Option<Self> {
        match name {
            "Low" => Some(Self::Low),
            "High" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Sample {
    id: i64,
    text: String,
    count: i32,
    ratio: f64,
    flag: bool,
    level: Level,
    at: Option<DateTime<Utc>>,
    at_ticks: Option<DateTime<Utc>>,
    note: Option<String>,
    city: String,
    tags: Vec<String>,
}

impl Record for Sample {
    const NAME: &'static str = "Sample";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |s| s.id, |s, v| s.id = v).primary_key();
        def.field("Text", |s| s.text.clone(), |s, v| s.text = v);
        def.field("Count", |s| s.count, |s, v| s.count = v);
        def.field("Ratio", |s| s.ratio, |s, v| s.ratio = v);
        def.field("Flag", |s| s.flag, |s, v| s.flag = v);
        def.enumeration("Level", |s| s.level, |s, v| s.level = v);
        def.field("At", |s| s.at, |s, v| s.at = v);
        def.field("AtTicks", |s| s.at_ticks, |s, v| s.at_ticks = v)
            .storage(StorageType::Integer);
        def.field("Note", |s| s.note.clone(), |s, v| s.note = v);
        def.field("City", |s| s.city.clone(), |s, v| s.city = v)
            .index_table_named("Cities");
        def.array("Tags", |s| s.tags.clone(), |s, v| s.tags = v);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Note {
    id: i64,
    text: String,
}

impl Record for Note {
    const NAME: &'static str = "Note";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |n| n.id, |n, v| n.id = v).primary_key();
        def.field("Text", |n| n.text.clone(), |n, v| n.text = v);
    }
}

fn note(id: i64, text: &str) -> Note {
    Note {
        id,
        text: text.into(),
    }
}

fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap() + Duration::nanoseconds(123_456_700)
}

fn memory_mapper() -> Mapper {
    Mapper::open(DatabaseConfig::in_memory()).unwrap()
}

fn count_rows(mapper: &mut Mapper, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM \"{table}\"");
    match mapper.database_mut().query_scalar(&sql, &[]).unwrap() {
        Some(Value::Integer(count)) => count,
        other => panic!("unexpected count {other:?}"),
    }
}

fn read_all<T: Record>(mapper: &mut Mapper, filter: Option<&str>) -> Vec<T> {
    mapper.read::<T>(filter, None).unwrap().unwrap()
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn test_round_trip_all_types() {
    let mut mapper = memory_mapper();
    let mut samples = vec![Sample {
        id: 0,
        text: "hello".into(),
        count: -42,
        ratio: 0.625,
        flag: true,
        level: Level::High,
        at: Some(timestamp()),
        at_ticks: Some(timestamp()),
        note: None,
        city: "Oslo".into(),
        tags: vec!["a".into(), "b".into(), "c".into()],
    }];
    mapper.write(&mut samples, None).unwrap();
    assert_ne!(samples[0].id, 0);

    let read = read_all::<Sample>(&mut mapper, Some(&format!("ID = {}", samples[0].id)));
    assert_eq!(read, samples);
}

#[test]
fn test_storage_representations() {
    let mut mapper = memory_mapper();
    let mut samples = vec![Sample {
        level: Level::High,
        at_ticks: Some(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()),
        ..Default::default()
    }];
    mapper.write(&mut samples, None).unwrap();

    let row = mapper
        .database_mut()
        .query("SELECT \"Level\", \"AtTicks\", \"At\" FROM \"Sample\"", &[])
        .unwrap();
    assert_eq!(row.rows[0][0], Value::Text("High".into()));
    assert_eq!(row.rows[0][1], Value::Integer(621_355_968_000_000_000));
    assert_eq!(row.rows[0][2], Value::Null);
}

// =============================================================================
// Keys and upserts
// =============================================================================

#[test]
fn test_idempotent_upsert() {
    let mut mapper = memory_mapper();
    let mut notes = vec![note(1, "a"), note(2, "b"), note(3, "c")];
    mapper.write(&mut notes, None).unwrap();
    notes[1].text = "changed".into();
    mapper.write(&mut notes, None).unwrap();

    assert_eq!(count_rows(&mut mapper, "Note"), 3);
    let read = read_all::<Note>(&mut mapper, Some("ID = 2"));
    assert_eq!(read, vec![note(2, "changed")]);
}

#[test]
fn test_auto_key_uniqueness() {
    let mut mapper = memory_mapper();
    let mut notes: Vec<Note> = (0..5).map(|i| note(0, &format!("n{i}"))).collect();
    mapper.write(&mut notes, None).unwrap();

    let mut ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
    assert!(ids.iter().all(|id| *id != 0));
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);

    for written in &notes {
        let read = read_all::<Note>(&mut mapper, Some(&format!("ID = {}", written.id)));
        assert_eq!(read, vec![written.clone()]);
    }
}

#[test]
fn test_where_id_equals_one() {
    let mut mapper = memory_mapper();
    let mut notes = vec![note(0, "a"), note(0, "b"), note(0, "c")];
    mapper.write(&mut notes, None).unwrap();

    let read = read_all::<Note>(&mut mapper, Some("WHERE ID == 1"));
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].id, 1);
    assert_eq!(read[0].text, "a");
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tag {
    id: i64,
    code: String,
    label: String,
}

impl Record for Tag {
    const NAME: &'static str = "Tag";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |t| t.id, |t, v| t.id = v).primary_key();
        def.field("Code", |t| t.code.clone(), |t, v| t.code = v).unique();
        def.field("Label", |t| t.label.clone(), |t, v| t.label = v);
    }
}

#[test]
fn test_auto_key_collision_reuses_existing_row() {
    let mut mapper = memory_mapper();
    let mut first = vec![Tag {
        id: 0,
        code: "x".into(),
        label: "first".into(),
    }];
    mapper.write(&mut first, None).unwrap();

    let mut second = vec![Tag {
        id: 0,
        code: "x".into(),
        label: "second".into(),
    }];
    mapper.write(&mut second, None).unwrap();

    assert_eq!(second[0].id, first[0].id);
    assert_eq!(count_rows(&mut mapper, "Tag"), 1);
    let read = read_all::<Tag>(&mut mapper, None);
    assert_eq!(read[0].label, "second");
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Badge {
    code: String,
    label: String,
}

impl Record for Badge {
    const NAME: &'static str = "Badge";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("Code", |b| b.code.clone(), |b, v| b.code = v).unique();
        def.field("Label", |b| b.label.clone(), |b, v| b.label = v);
    }
}

fn badge(code: &str, label: &str) -> Badge {
    Badge {
        code: code.into(),
        label: label.into(),
    }
}

#[test]
fn test_keyless_round_trip() {
    let mut mapper = memory_mapper();
    let mut badges = vec![badge("x", "first"), badge("y", "second")];
    mapper.write(&mut badges, None).unwrap();

    let read = read_all::<Badge>(&mut mapper, Some("ORDER BY Code"));
    assert_eq!(read, badges);
}

#[test]
fn test_keyless_rewrite_replaces_unique_row() {
    let mut mapper = memory_mapper();
    mapper.write(&mut [badge("x", "a")], None).unwrap();
    mapper.write(&mut [badge("x", "b")], None).unwrap();

    assert_eq!(count_rows(&mut mapper, "Badge"), 1);
    assert_eq!(read_all::<Badge>(&mut mapper, None), vec![badge("x", "b")]);
}

#[test]
fn test_read_follows_live_column_order() {
    let mut mapper = memory_mapper();
    mapper
        .database_mut()
        .execute_batch(
            "CREATE TABLE \"Note\" (\"Text\" TEXT, \"Legacy\" INTEGER, \"ID\" INTEGER PRIMARY KEY); \
             INSERT INTO \"Note\" VALUES ('one', 9, 1), ('two', 8, 2);",
        )
        .unwrap();

    let read = read_all::<Note>(&mut mapper, Some("ORDER BY ID"));
    assert_eq!(read, vec![note(1, "one"), note(2, "two")]);
}

// =============================================================================
// Parent / child
// =============================================================================

#[test]
fn test_department_scenario() {
    let mut mapper = memory_mapper();
    let mut departments = vec![Department {
        name: "Eng".into(),
        employees: vec![employee("Ada"), employee("Lin")],
        ..Default::default()
    }];
    mapper.write(&mut departments, None).unwrap();

    let read = read_all::<Department>(&mut mapper, None);
    assert_eq!(read.len(), 1);
    let department = &read[0];
    assert_eq!(department.name, "Eng");
    assert_ne!(department.id, 0);
    assert_eq!(department.employees.len(), 2);
    for employee in &department.employees {
        assert_eq!(employee.department_id, department.id);
        assert_ne!(employee.id, 0);
    }
    assert_ne!(department.employees[0].id, department.employees[1].id);

    // Keys were written back into the caller's instances too.
    assert_eq!(departments[0].id, department.id);
    assert_eq!(departments[0].employees[1].department_id, department.id);
}

#[test]
fn test_rewrite_replaces_stale_children() {
    let mut mapper = memory_mapper();
    let mut departments = vec![Department {
        name: "Ops".into(),
        employees: vec![employee("A"), employee("B"), employee("C")],
        ..Default::default()
    }];
    mapper.write(&mut departments, None).unwrap();
    assert_eq!(read_all::<Department>(&mut mapper, None)[0].employees.len(), 3);

    departments[0].employees = vec![employee("D")];
    mapper.write(&mut departments, None).unwrap();

    let read = read_all::<Department>(&mut mapper, None);
    assert_eq!(read[0].employees.len(), 1);
    assert_eq!(read[0].employees[0].name, "D");
    assert_eq!(count_rows(&mut mapper, "Employees"), 1);
}

#[test]
fn test_children_of_different_parents_stay_separate() {
    let mut mapper = memory_mapper();
    let mut departments = vec![
        Department {
            name: "One".into(),
            employees: vec![employee("a1"), employee("a2")],
            ..Default::default()
        },
        Department {
            name: "Two".into(),
            employees: vec![employee("b1")],
            ..Default::default()
        },
    ];
    mapper.write(&mut departments, None).unwrap();

    let two = read_all::<Department>(&mut mapper, Some("Name = 'Two'"));
    assert_eq!(two[0].employees, departments[1].employees);
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Account {
    id: i64,
    settings: Option<Settings>,
}

impl Record for Account {
    const NAME: &'static str = "Account";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |a| a.id, |a, v| a.id = v).primary_key();
        def.child("Settings", |a| &mut a.settings);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Settings {
    id: i64,
    account_id: i64,
    theme: String,
}

impl Record for Settings {
    const NAME: &'static str = "Settings";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |s| s.id, |s, v| s.id = v).primary_key();
        def.field("AccountID", |s| s.account_id, |s, v| s.account_id = v)
            .parent_key::<Account>();
        def.field("Theme", |s| s.theme.clone(), |s, v| s.theme = v);
    }
}

#[test]
fn test_single_child_round_trip() {
    let mut mapper = memory_mapper();
    let mut accounts = vec![
        Account {
            id: 10,
            settings: Some(Settings {
                theme: "dark".into(),
                ..Default::default()
            }),
        },
        Account {
            id: 11,
            settings: None,
        },
    ];
    mapper.write(&mut accounts, None).unwrap();

    let read = read_all::<Account>(&mut mapper, Some("ORDER BY ID"));
    assert_eq!(read.len(), 2);
    let settings = read[0].settings.as_ref().unwrap();
    assert_eq!(settings.theme, "dark");
    assert_eq!(settings.account_id, 10);
    assert_eq!(read[1].settings, None);
}

// =============================================================================
// Schema validation
// =============================================================================

#[test]
fn test_extra_columns_are_tolerated() {
    let mut mapper = memory_mapper();
    mapper
        .database_mut()
        .execute_batch(
            "CREATE TABLE \"Note\" (\"ID\" INTEGER PRIMARY KEY, \"text\" TEXT, \"Legacy\" TEXT); \
             INSERT INTO \"Note\" VALUES (1, 'kept', 'ignored');",
        )
        .unwrap();

    let read = read_all::<Note>(&mut mapper, None);
    assert_eq!(read, vec![note(1, "kept")]);

    let mut more = vec![note(0, "new")];
    mapper.write(&mut more, None).unwrap();
    assert_eq!(count_rows(&mut mapper, "Note"), 2);
}

#[test]
fn test_missing_column_is_rejected() {
    let mut mapper = memory_mapper();
    mapper
        .database_mut()
        .execute_batch("CREATE TABLE \"Note\" (\"ID\" INTEGER PRIMARY KEY)")
        .unwrap();

    match mapper.read::<Note>(None, None) {
        Err(MapError::Mapping(MappingError::Format(msg))) => assert!(msg.contains("Text")),
        other => panic!("expected format error, got {other:?}"),
    }
}

#[test]
fn test_incompatible_column_type_is_rejected() {
    let mut mapper = memory_mapper();
    mapper
        .database_mut()
        .execute_batch("CREATE TABLE \"Note\" (\"ID\" INTEGER PRIMARY KEY, \"Text\" REAL)")
        .unwrap();

    match mapper.read::<Note>(None, None) {
        Err(MapError::Mapping(MappingError::Format(msg))) => {
            assert!(msg.contains("Note.Text"));
            assert!(msg.contains("REAL"));
        }
        other => panic!("expected format error, got {other:?}"),
    }
}

#[test]
fn test_missing_primary_key_is_rejected() {
    let mut mapper = memory_mapper();
    mapper
        .database_mut()
        .execute_batch("CREATE TABLE \"Note\" (\"ID\" INTEGER, \"Text\" TEXT)")
        .unwrap();

    let err = mapper.read::<Note>(None, None).unwrap_err();
    assert!(matches!(
        err,
        MapError::Mapping(MappingError::MissingPrimaryKey { found: 0, .. })
    ));
}

#[derive(Debug, Default)]
struct TwoKeys {
    a: i64,
    b: i64,
}

impl Record for TwoKeys {
    const NAME: &'static str = "TwoKeys";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("A", |t| t.a, |t, v| t.a = v).primary_key();
        def.field("B", |t| t.b, |t, v| t.b = v).primary_key();
    }
}

#[test]
fn test_multiple_primary_keys_not_supported() {
    let mut mapper = memory_mapper();
    let err = mapper.read::<TwoKeys>(None, None).unwrap_err();
    assert!(matches!(err, MapError::Mapping(MappingError::NotSupported(_))));
}

#[test]
fn test_auto_create_disabled() {
    let mut config = DatabaseConfig::in_memory();
    config.auto_create_tables = false;
    let mut mapper = Mapper::open(config).unwrap();

    let err = mapper.write(&mut [note(1, "a")], None).unwrap_err();
    match err {
        MapError::Mapping(MappingError::InvalidOperation(msg)) => assert!(msg.contains("Note")),
        other => panic!("expected invalid operation, got {other:?}"),
    }
}

#[test]
fn test_conversion_failure_keeps_default() {
    let mut mapper = memory_mapper();
    let mut samples = vec![Sample {
        text: "row".into(),
        count: 5,
        ..Default::default()
    }];
    mapper.write(&mut samples, None).unwrap();
    mapper
        .database_mut()
        .execute("UPDATE \"Sample\" SET \"Count\" = 'many', \"Level\" = 'Mid'", &[])
        .unwrap();

    let outcome = mapper
        .read_with_diagnostics::<Sample>(None, None)
        .unwrap()
        .unwrap();
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].text, "row");
    assert_eq!(outcome.rows[0].count, 0);
    assert_eq!(outcome.rows[0].level, Level::Low);

    let columns: Vec<_> = outcome.diagnostics.iter().map(|d| d.column.as_str()).collect();
    assert_eq!(columns, vec!["Count", "Level"]);
    assert!(outcome.diagnostics.iter().all(|d| d.table == "Sample" && d.row == 0));
}

#[test]
fn test_create_table_returns_ddl() {
    let mut mapper = memory_mapper();
    let ddl = mapper.create_table::<Note>(Some("Archive")).unwrap();
    assert_eq!(
        ddl,
        "CREATE TABLE \"Archive\" (\"ID\" INTEGER PRIMARY KEY, \"Text\" TEXT)"
    );
    assert!(mapper.database_mut().table_exists("Archive").unwrap());

    // Idempotent.
    mapper.create_table::<Note>(Some("Archive")).unwrap();
    mapper.write(&mut [note(1, "x")], Some("Archive")).unwrap();
    assert!(!mapper.database_mut().table_exists("Note").unwrap());
}

// =============================================================================
// Index and array tables
// =============================================================================

#[test]
fn test_index_table_dedup() {
    let mut mapper = memory_mapper();
    let mut samples = vec![
        Sample {
            text: "first".into(),
            city: "Oslo".into(),
            ..Default::default()
        },
        Sample {
            text: "second".into(),
            city: "Oslo".into(),
            ..Default::default()
        },
        Sample {
            text: "third".into(),
            city: String::new(),
            ..Default::default()
        },
    ];
    mapper.write(&mut samples, None).unwrap();

    let entries = mapper.index_table_contents("Cities").unwrap();
    assert_eq!(entries, vec![(1, "Oslo".to_string())]);

    let raw = mapper
        .database_mut()
        .query("SELECT \"City\" FROM \"Sample\" ORDER BY \"ID\"", &[])
        .unwrap();
    assert_eq!(raw.rows[0][0], Value::Integer(1));
    assert_eq!(raw.rows[1][0], Value::Integer(1));
    assert_eq!(raw.rows[2][0], Value::Null);

    let read = read_all::<Sample>(&mut mapper, Some("ORDER BY ID"));
    assert_eq!(read[0].city, "Oslo");
    assert_eq!(read[1].city, "Oslo");
    assert_eq!(read[2].city, "");

    // A later write reuses the persisted entry.
    let mut later = vec![Sample {
        city: "Oslo".into(),
        ..Default::default()
    }];
    mapper.write(&mut later, None).unwrap();
    assert_eq!(mapper.index_table_contents("Cities").unwrap().len(), 1);
}

#[test]
fn test_array_rows_are_replaced() {
    let mut mapper = memory_mapper();
    let mut samples = vec![Sample {
        id: 7,
        tags: vec!["x".into(), "y".into()],
        ..Default::default()
    }];
    mapper.write(&mut samples, None).unwrap();
    assert_eq!(count_rows(&mut mapper, "Tags"), 2);

    samples[0].tags = vec!["z".into()];
    mapper.write(&mut samples, None).unwrap();
    let read = read_all::<Sample>(&mut mapper, None);
    assert_eq!(read[0].tags, vec!["z"]);
    assert_eq!(count_rows(&mut mapper, "Tags"), 1);
}

// =============================================================================
// Deletes
// =============================================================================

#[test]
fn test_delete_by_key_cascades() {
    let mut mapper = memory_mapper();
    let mut departments = vec![
        Department {
            name: "Gone".into(),
            employees: vec![employee("a"), employee("b")],
            ..Default::default()
        },
        Department {
            name: "Kept".into(),
            employees: vec![employee("c")],
            ..Default::default()
        },
    ];
    mapper.write(&mut departments, None).unwrap();

    let deleted = mapper.delete_by_key(&departments[..1], None).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(count_rows(&mut mapper, "Department"), 1);
    assert_eq!(count_rows(&mut mapper, "Employees"), 1);
}

#[test]
fn test_delete_by_key_clears_arrays() {
    let mut mapper = memory_mapper();
    let mut samples = vec![Sample {
        id: 3,
        tags: vec!["a".into()],
        ..Default::default()
    }];
    mapper.write(&mut samples, None).unwrap();
    mapper.delete_by_key(&samples, None).unwrap();
    assert_eq!(count_rows(&mut mapper, "Sample"), 0);
    assert_eq!(count_rows(&mut mapper, "Tags"), 0);
}

#[test]
fn test_delete_where() {
    let mut mapper = memory_mapper();
    let mut notes = vec![note(1, "a"), note(2, "b"), note(3, "b")];
    mapper.write(&mut notes, None).unwrap();

    assert_eq!(mapper.delete_where::<Note>("Text = 'b'", None).unwrap(), 2);
    assert_eq!(read_all::<Note>(&mut mapper, None), vec![note(1, "a")]);
}

#[derive(Debug, Default)]
struct LogLine {
    text: String,
}

impl Record for LogLine {
    const NAME: &'static str = "LogLine";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("Text", |l| l.text.clone(), |l, v| l.text = v);
    }
}

#[test]
fn test_delete_by_key_requires_primary_key() {
    let mut mapper = memory_mapper();
    let mut lines = vec![LogLine { text: "x".into() }];
    mapper.write(&mut lines, None).unwrap();
    mapper.write(&mut lines, None).unwrap();
    assert_eq!(count_rows(&mut mapper, "LogLine"), 2);

    let err = mapper.delete_by_key(&lines, None).unwrap_err();
    assert!(matches!(err, MapError::Mapping(MappingError::Argument(_))));
}

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_sql_injection_is_rejected() {
    let mut mapper = memory_mapper();
    mapper.write(&mut [note(1, "a")], None).unwrap();

    let err = mapper
        .read::<Note>(Some("ID = 1; DROP TABLE Note"), None)
        .unwrap_err();
    assert!(err.is_sql_injection());
    let err = mapper
        .delete_where::<Note>("1 = 1; DROP TABLE Note", None)
        .unwrap_err();
    assert!(matches!(
        err,
        MapError::Database(DatabaseError::SqlInjection(_))
    ));

    assert!(mapper.database_mut().table_exists("Note").unwrap());
    assert_eq!(count_rows(&mut mapper, "Note"), 1);
}

// =============================================================================
// Databases
// =============================================================================

#[test]
fn test_read_only_database_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    {
        let mut mapper = Mapper::open(DatabaseConfig::new(&path)).unwrap();
        mapper.write(&mut [note(1, "stored")], None).unwrap();
    }

    let mut config = DatabaseConfig::new(&path);
    config.read_only = true;
    let mut mapper = Mapper::open(config).unwrap();

    assert_eq!(
        mapper.read::<Note>(None, None).unwrap(),
        Some(vec![note(1, "stored")])
    );
    assert_eq!(mapper.read::<Department>(None, None).unwrap(), None);

    let err = mapper.write(&mut [note(2, "new")], None).unwrap_err();
    assert!(matches!(err, MapError::Database(DatabaseError::ReadOnly(_))));
    assert!(mapper.index_table_contents("Cities").unwrap().is_empty());
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Library {
    id: i64,
    name: String,
    books: Vec<Book>,
}

impl Record for Library {
    const NAME: &'static str = "Library";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |l| l.id, |l, v| l.id = v).primary_key();
        def.field("Name", |l| l.name.clone(), |l, v| l.name = v);
        def.children("Books", |l| &mut l.books)
            .secondary_database("books.db");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Book {
    id: i64,
    library_id: i64,
    title: String,
    genre: String,
}

impl Record for Book {
    const NAME: &'static str = "Book";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |b| b.id, |b, v| b.id = v).primary_key();
        def.field("LibraryID", |b| b.library_id, |b, v| b.library_id = v)
            .parent_key::<Library>();
        def.field("Title", |b| b.title.clone(), |b, v| b.title = v);
        def.field("Genre", |b| b.genre.clone(), |b, v| b.genre = v)
            .index_table_named("Genres");
    }
}

#[test]
fn test_secondary_database_holds_child_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut mapper = Mapper::open(DatabaseConfig::new(dir.path().join("main.db"))).unwrap();
    let mut libraries = vec![Library {
        name: "Central".into(),
        books: vec![
            Book {
                title: "Dune".into(),
                genre: "SF".into(),
                ..Default::default()
            },
            Book {
                title: "Emma".into(),
                genre: "Novel".into(),
                ..Default::default()
            },
        ],
        ..Default::default()
    }];
    mapper.write(&mut libraries, None).unwrap();

    assert!(!mapper.database_mut().table_exists("Books").unwrap());
    assert!(!mapper.database_mut().table_exists("Genres").unwrap());

    let mut books_db = Database::open(dir.path().join("books.db")).unwrap();
    assert_eq!(
        books_db
            .query_scalar("SELECT COUNT(*) FROM \"Books\"", &[])
            .unwrap(),
        Some(Value::Integer(2))
    );
    assert_eq!(
        books_db
            .query_scalar("SELECT COUNT(*) FROM \"Genres\"", &[])
            .unwrap(),
        Some(Value::Integer(2))
    );
    books_db.close().unwrap();

    let read = read_all::<Library>(&mut mapper, None);
    assert_eq!(read, libraries);
}

// =============================================================================
// Transactions
// =============================================================================

#[test]
fn test_transaction_commits() {
    let mut mapper = memory_mapper();
    mapper
        .transaction(|m| {
            m.write(&mut [note(1, "a")], None)?;
            m.write(&mut [note(2, "b")], None)
        })
        .unwrap();
    assert_eq!(count_rows(&mut mapper, "Note"), 2);
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut mapper = Mapper::open(DatabaseConfig::new(dir.path().join("tx.db"))).unwrap();

    let err = mapper
        .transaction(|m| -> tablemap_sqlite::Result<()> {
            m.write(
                &mut [Sample {
                    city: "Rome".into(),
                    ..Default::default()
                }],
                None,
            )?;
            Err(MappingError::Argument("abort".into()).into())
        })
        .unwrap_err();
    assert!(matches!(err, MapError::Mapping(MappingError::Argument(_))));
    assert!(!mapper.database().in_transaction());

    assert_eq!(mapper.read::<Sample>(None, None).unwrap(), Some(Vec::new()));
    assert!(mapper.index_table_contents("Cities").unwrap().is_empty());
}

#[test]
fn test_nested_transaction_is_rejected() {
    let mut mapper = memory_mapper();
    let err = mapper
        .transaction(|m| m.transaction(|_| Ok(())))
        .unwrap_err();
    assert!(matches!(err, MapError::Database(DatabaseError::Argument(_))));
}
