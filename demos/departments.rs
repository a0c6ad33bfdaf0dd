//! Departments and employees workflow example.
//!
//! Demonstrates the mapper lifecycle on a file database: automatic table
//! creation, writing a parent with its children, filtered reads, index
//! tables, upserts, deletes and transactions.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p tablemap-demos --example departments
//! ```

use chrono::{DateTime, Utc};
use tablemap_core::{Record, RecordDef, SqlEnum};
use tablemap_db::DatabaseConfig;
use tablemap_sqlite::Mapper;

#[derive(Debug, Default, Clone)]
struct Department {
    id: i64,
    name: String,
    employees: Vec<Employee>,
}

impl Record for Department {
    const NAME: &'static str = "Department";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |d| d.id, |d, v| d.id = v).primary_key();
        def.field("Name", |d| d.name.clone(), |d, v| d.name = v).unique();
        def.children("Employees", |d| &mut d.employees);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum Shift {
    #[default]
    Day,
    Night,
}

impl SqlEnum for Shift {
    const TYPE_NAME: &'static str = "Shift";

    fn variant_name(&self) -> &'static str {
        match self {
            Shift::Day => "Day",
            Shift::Night => "Night",
        }
    }

    fn from_variant_name(name: &str) -> Option<Self> {
        match name {
            "Day" => Some(Shift::Day),
            "Night" => Some(Shift::Night),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Employee {
    id: i64,
    department_id: i64,
    name: String,
    city: String,
    shift: Shift,
    hired: Option<DateTime<Utc>>,
    skills: Vec<String>,
}

impl Record for Employee {
    const NAME: &'static str = "Employee";

    fn describe(def: &mut RecordDef<Self>) {
        def.field("ID", |e| e.id, |e, v| e.id = v).primary_key();
        def.field("DepartmentID", |e| e.department_id, |e, v| e.department_id = v)
            .parent_key::<Department>();
        def.field("Name", |e| e.name.clone(), |e, v| e.name = v);
        def.field("City", |e| e.city.clone(), |e, v| e.city = v)
            .index_table_named("Cities");
        def.enumeration("Shift", |e| e.shift, |e, v| e.shift = v);
        def.field("Hired", |e| e.hired, |e, v| e.hired = v);
        def.array("Skills", |e| e.skills.clone(), |e, v| e.skills = v);
    }
}

fn employee(name: &str, city: &str, shift: Shift, skills: &[&str]) -> Employee {
    Employee {
        name: name.into(),
        city: city.into(),
        shift,
        hired: Some(Utc::now()),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn print_departments(mapper: &mut Mapper, filter: Option<&str>) {
    let departments = mapper
        .read::<Department>(filter, None)
        .unwrap()
        .unwrap_or_default();
    for department in &departments {
        println!("  [{}] {}", department.id, department.name);
        for e in &department.employees {
            println!(
                "      [{}] {} ({}, {:?}) skills={:?}",
                e.id, e.name, e.city, e.shift, e.skills
            );
        }
    }
}

fn main() {
    // === Step 1: Open a database in a temporary directory ===
    let dir = std::env::temp_dir().join("tablemap_departments_example");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("company.db");
    std::fs::remove_file(&path).ok();

    let mut mapper = Mapper::open(DatabaseConfig::new(&path)).unwrap();
    println!("=== Schema ===");
    println!("{}", mapper.create_table::<Department>(None).unwrap());

    // === Step 2: Write departments with their employees ===
    println!("\n=== Writing ===");
    let mut departments = vec![
        Department {
            name: "Engineering".into(),
            employees: vec![
                employee("Ada", "London", Shift::Day, &["rust", "sql"]),
                employee("Lin", "Oslo", Shift::Night, &["go"]),
            ],
            ..Default::default()
        },
        Department {
            name: "Support".into(),
            employees: vec![employee("Sam", "Oslo", Shift::Day, &[])],
            ..Default::default()
        },
    ];
    mapper.write(&mut departments, None).unwrap();
    for department in &departments {
        println!(
            "Assigned key {} to '{}' ({} employees)",
            department.id,
            department.name,
            department.employees.len()
        );
    }

    // === Step 3: Read everything back ===
    println!("\n=== Reading ===");
    print_departments(&mut mapper, Some("ORDER BY ID"));

    println!("\nCities index table:");
    for (id, city) in mapper.index_table_contents("Cities").unwrap() {
        println!("  {id} => {city}");
    }

    // === Step 4: Update in place ===
    println!("\n=== Upsert ===");
    departments[1]
        .employees
        .push(employee("Kai", "Bergen", Shift::Night, &["sql"]));
    mapper.write(&mut departments[1..], None).unwrap();
    print_departments(&mut mapper, Some("Name = 'Support'"));

    // === Step 5: Delete with cascade ===
    println!("\n=== Delete ===");
    let removed = mapper.delete_by_key(&departments[..1], None).unwrap();
    println!("Removed {removed} department(s)");
    print_departments(&mut mapper, None);

    // === Step 6: Transactions ===
    println!("\n=== Transaction ===");
    let result = mapper.transaction(|m| {
        m.write(
            &mut [Department {
                name: "Temporary".into(),
                ..Default::default()
            }],
            None,
        )?;
        m.delete_where::<Department>("Name = 'Temporary'", None)
    });
    println!("Transaction deleted {} row(s)", result.unwrap());

    // === Step 7: Rejected filters ===
    let err = mapper
        .read::<Department>(Some("1 = 1; DROP TABLE Department"), None)
        .unwrap_err();
    println!("\nRejected filter: {err}");

    drop(mapper);
    std::fs::remove_dir_all(&dir).ok();
    println!("\nDone!");
}
