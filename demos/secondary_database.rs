//! Secondary database and read-only access example.
//!
//! Stores a library's books in a separate database file next to the main
//! one, then reopens both through a read-only configuration loaded from
//! YAML.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p tablemap-demos --example secondary_database
//! ```

use tablemap_core::{Record, RecordDef};
use tablemap_db::{Database, DatabaseConfig};
use tablemap_sqlite::Mapper;

#[derive(Debug, Default)]
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

#[derive(Debug, Default)]
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
            .index_table();
    }
}

fn book(title: &str, genre: &str) -> Book {
    Book {
        title: title.into(),
        genre: genre.into(),
        ..Default::default()
    }
}

fn main() {
    let dir = std::env::temp_dir().join("tablemap_secondary_example");
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();

    // === Step 1: Write through a writable configuration ===
    let config = DatabaseConfig::new(dir.join("main.db"));
    let mut mapper = Mapper::open(config.clone()).unwrap();
    let mut libraries = vec![Library {
        name: "Central".into(),
        books: vec![
            book("Dune", "Science Fiction"),
            book("Emma", "Novel"),
            book("Solaris", "Science Fiction"),
        ],
        ..Default::default()
    }];
    mapper.write(&mut libraries, None).unwrap();
    drop(mapper);

    // === Step 2: Inspect where the rows landed ===
    println!("=== Layout ===");
    for file in ["main.db", "books.db"] {
        let mut db = Database::open(dir.join(file)).unwrap();
        println!("{file}: {:?}", db.list_tables().unwrap());
        db.close().unwrap();
    }

    // === Step 3: Reopen read-only from a YAML configuration ===
    println!("\n=== Read-only ===");
    let mut read_only = config;
    read_only.read_only = true;
    let config_path = dir.join("tablemap.yaml");
    read_only.save(&config_path).unwrap();

    let mut mapper = Mapper::open(DatabaseConfig::load(&config_path).unwrap()).unwrap();
    for library in mapper.read::<Library>(None, None).unwrap().unwrap_or_default() {
        println!("{} ({} books)", library.name, library.books.len());
        for book in &library.books {
            println!("  {} [{}]", book.title, book.genre);
        }
    }

    match mapper.write(&mut libraries, None) {
        Ok(()) => println!("unexpected: write succeeded"),
        Err(err) => println!("Write refused: {err}"),
    }

    drop(mapper);
    std::fs::remove_dir_all(&dir).ok();
    println!("\nDone!");
}
