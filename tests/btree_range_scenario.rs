//! End-to-end scenario S2 (spec.md §8): a range probe over 100 inserted
//! keys returns exactly the 61-entry ascending window `[20, 80]`.

use std::sync::Arc;

use rusty_db::collation::Collation;
use rusty_db::common::{StorageRef, Value};
use rusty_db::index::{BTreeIndex, BuildMode, Index};

#[test]
fn find_range_20_to_80_returns_61_ascending_values() {
    let index = BTreeIndex::new(Collation::Binary, BuildMode::Eager, Arc::new(|| Ok(Vec::new())));

    let value_for = |k: i64| format!("Value{k}");
    for k in 1..=100i64 {
        index
            .add(
                &Value::Integer(k),
                StorageRef::PageHeap {
                    page_id: k as u32,
                    slot_id: 0,
                },
            )
            .unwrap();
    }

    let refs = index
        .find_range(Some(&Value::Integer(20)), Some(&Value::Integer(80)))
        .unwrap();
    assert_eq!(refs.len(), 61);

    let first = match refs.first().unwrap() {
        StorageRef::PageHeap { page_id, .. } => *page_id as i64,
        _ => panic!("expected page-heap ref"),
    };
    let last = match refs.last().unwrap() {
        StorageRef::PageHeap { page_id, .. } => *page_id as i64,
        _ => panic!("expected page-heap ref"),
    };
    assert_eq!(value_for(first), "Value20");
    assert_eq!(value_for(last), "Value80");
}
