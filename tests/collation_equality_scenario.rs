//! End-to-end scenario S1 (spec.md §8): a NOCASE column finds a row by a
//! differently-cased literal, and only that row.

use std::sync::Arc;

use rusty_db::catalog::{Catalog, Column, LogicalType};
use rusty_db::collation::Collation;
use rusty_db::common::{StorageRef, Value};
use rusty_db::config::EngineConfig;
use rusty_db::database::Database;
use rusty_db::index::{BuildMode, HashIndex, Index};
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        data_dir: dir.to_string_lossy().to_string(),
        page_size: 4096,
        min_extension_pages: 64,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn where_name_equals_alice_finds_exactly_one_row_under_nocase() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("data.scdb"), &config(dir.path())).unwrap();

    let catalog = Catalog::default();
    catalog
        .create_table(
            "u",
            vec![
                Column::new("id", LogicalType::Integer).primary_key(),
                Column::new("name", LogicalType::Text).with_collation(Collation::NoCase),
            ],
        )
        .unwrap();

    let txn = db.heap_engine().begin().unwrap();
    let rows = [(1i64, "Alice"), (2, "Bob"), (3, "CHARLIE")];
    let mut refs = Vec::new();
    for (id, name) in rows {
        let row = vec![Value::Integer(id), Value::Text(name.to_string())];
        let bytes = bincode::serialize(&row).unwrap();
        refs.push((name, db.heap_engine().insert(1, txn, &bytes).unwrap()));
    }
    db.heap_engine().commit_async(txn).await.unwrap();

    let name_index = Arc::new(HashIndex::new(
        Collation::NoCase,
        BuildMode::Eager,
        Arc::new(|| Ok(Vec::new())),
    ));
    for (name, storage_ref) in &refs {
        name_index
            .add(&Value::Text(name.to_string()), *storage_ref)
            .unwrap();
    }
    db.register_index("u.name", name_index.clone());

    let matches = name_index.find(&Value::Text("alice".to_string())).unwrap();
    assert_eq!(matches.len(), 1);

    let StorageRef::PageHeap { .. } = matches[0] else {
        panic!("expected a page-heap storage ref");
    };
    let bytes = db.heap_engine().read(1, matches[0]).unwrap().unwrap();
    let row: Vec<Value> = bincode::deserialize(&bytes).unwrap();
    assert_eq!(row[1], Value::Text("Alice".to_string()));
}
