//! MemTable Tests
//!
//! Tests verify:
//! - Appends, overwrites and sorted scans
//! - Size accounting against the table's allocator
//! - Range and whole-field deletion with a recorded tombstone
//! - Snapshots that ignore later writes
//! - Close releasing buffered bytes
//! - Concurrent appends to distinct and shared columns

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use unitstore::memtable::{AppendOutcome, ChunkSnapshot, MemTable};
use unitstore::shared::BufferAllocator;
use unitstore::{AreaSet, DataType, RangeSet, StoreError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_memtable() -> (BufferAllocator, MemTable) {
    let root = BufferAllocator::root("test");
    let table = MemTable::new(7, root.new_child("memtable-7"), 4);
    (root, table)
}

fn chunk(field: &str, cells: &[(i64, i64)]) -> ChunkSnapshot {
    ChunkSnapshot::new(
        field,
        DataType::Long,
        cells.iter().map(|&(k, v)| (k, Value::Long(v))).collect(),
    )
}

fn cells(table: &MemTable, field: &str) -> Vec<(i64, i64)> {
    let fields = BTreeSet::from([field.to_string()]);
    let mut scan = table.scan(&fields, &RangeSet::all());
    match scan.remove(field) {
        Some(column) => column
            .map(|cell| match cell.unwrap() {
                (key, Value::Long(v)) => (key, v),
                other => panic!("unexpected cell {:?}", other),
            })
            .collect(),
        None => Vec::new(),
    }
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let (_root, table) = setup_memtable();
    assert_eq!(table.id(), 7);
    assert!(table.is_empty());
    assert_eq!(table.estimated_size(), 0);
    assert!(table.schema().is_empty());
}

#[test]
fn test_append_and_scan_sorted() {
    let (_root, table) = setup_memtable();

    table.append(&chunk("f", &[(3, 30), (1, 10)])).unwrap();
    table.append(&chunk("f", &[(2, 20)])).unwrap();

    assert_eq!(cells(&table, "f"), vec![(1, 10), (2, 20), (3, 30)]);
    assert_eq!(table.schema().get("f"), Some(&DataType::Long));
}

#[test]
fn test_later_append_overwrites_across_chunks() {
    let (_root, table) = setup_memtable();

    // chunk_size 4: the first append seals a run
    table
        .append(&chunk("f", &[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]))
        .unwrap();
    table.append(&chunk("f", &[(2, 22), (5, 55)])).unwrap();

    assert_eq!(
        cells(&table, "f"),
        vec![(1, 1), (2, 22), (3, 3), (4, 4), (5, 55)]
    );

    table.compact();
    assert_eq!(
        cells(&table, "f"),
        vec![(1, 1), (2, 22), (3, 3), (4, 4), (5, 55)]
    );
}

#[test]
fn test_try_append_reports_appended() {
    let (_root, table) = setup_memtable();
    assert_eq!(
        table.try_append(&chunk("f", &[(1, 1)])).unwrap(),
        AppendOutcome::Appended
    );
    assert_eq!(cells(&table, "f"), vec![(1, 1)]);
}

#[test]
fn test_append_with_other_type_conflicts() {
    let (_root, table) = setup_memtable();
    table.append(&chunk("f", &[(1, 1)])).unwrap();

    let double = ChunkSnapshot::new("f", DataType::Double, vec![(2, Value::Double(2.0))]);
    let err = table.append(&double).unwrap_err();
    assert!(matches!(err, StoreError::SchemaConflict { .. }));
    assert_eq!(cells(&table, "f"), vec![(1, 1)]);
}

#[test]
fn test_scan_respects_ranges_and_fields() {
    let (_root, table) = setup_memtable();
    table
        .append(&chunk("a", &[(1, 1), (5, 5), (9, 9)]))
        .unwrap();
    table.append(&chunk("b", &[(5, 50)])).unwrap();

    let fields = BTreeSet::from(["a".to_string()]);
    let mut scan = table.scan(&fields, &RangeSet::from_range(2..=9));
    assert_eq!(scan.len(), 1);
    let keys: Vec<i64> = scan
        .remove("a")
        .unwrap()
        .map(|cell| cell.unwrap().0)
        .collect();
    assert_eq!(keys, vec![5, 9]);
}

// =============================================================================
// Size Tests
// =============================================================================

#[test]
fn test_size_grows_with_appends_and_reaches_parent() {
    let (root, table) = setup_memtable();

    table.append(&chunk("f", &[(1, 1)])).unwrap();
    let one = table.estimated_size();
    assert!(one > 0);

    table.append(&chunk("f", &[(2, 2), (3, 3)])).unwrap();
    assert_eq!(table.estimated_size(), one * 3);
    assert_eq!(root.allocated(), table.estimated_size());
}

#[test]
fn test_close_releases_bytes_and_rejects_appends() {
    let (root, table) = setup_memtable();
    table.append(&chunk("f", &[(1, 1), (2, 2)])).unwrap();

    table.close();
    table.close();

    assert!(table.is_closed());
    assert_eq!(root.allocated(), 0);
    assert!(table.is_empty());
    assert!(matches!(
        table.append(&chunk("f", &[(3, 3)])),
        Err(StoreError::Closed)
    ));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_key_range_of_one_field() {
    let (_root, table) = setup_memtable();
    table
        .append(&chunk("a", &[(1, 1), (2, 2), (3, 3)]))
        .unwrap();
    table.append(&chunk("b", &[(2, 2)])).unwrap();

    let mut areas = AreaSet::new();
    areas.add_field_keys(["a"], &RangeSet::from_range(2..=3));
    table.delete(&areas);

    assert_eq!(cells(&table, "a"), vec![(1, 1)]);
    assert_eq!(cells(&table, "b"), vec![(2, 2)]);
    assert!(table.tombstone().covers("a", 2));
    assert!(!table.tombstone().covers("b", 2));
}

#[test]
fn test_delete_whole_field_drops_column() {
    let (_root, table) = setup_memtable();
    table.append(&chunk("a", &[(1, 1)])).unwrap();
    table.append(&chunk("b", &[(1, 1)])).unwrap();

    let mut areas = AreaSet::new();
    areas.add_fields(["a"]);
    table.delete(&areas);

    assert_eq!(table.schema().len(), 1);
    assert!(table.schema().contains_key("b"));
    assert!(table.tombstone().field_deleted("a"));

    // The field can come back with another type
    let double = ChunkSnapshot::new("a", DataType::Double, vec![(4, Value::Double(4.0))]);
    table.append(&double).unwrap();
    assert_eq!(table.schema().get("a"), Some(&DataType::Double));
}

#[test]
fn test_delete_all_keys_empties_table() {
    let (_root, table) = setup_memtable();
    table.append(&chunk("a", &[(1, 1), (9, 9)])).unwrap();

    let mut areas = AreaSet::new();
    areas.add_keys(&RangeSet::all());
    table.delete(&areas);

    assert!(table.is_empty());
    assert!(cells(&table, "a").is_empty());
}

#[test]
fn test_empty_delete_records_nothing() {
    let (_root, table) = setup_memtable();
    table.append(&chunk("a", &[(1, 1)])).unwrap();

    table.delete(&AreaSet::new());

    assert!(table.tombstone().is_empty());
    assert_eq!(cells(&table, "a"), vec![(1, 1)]);
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_is_point_in_time() {
    let (_root, table) = setup_memtable();
    table.append(&chunk("f", &[(1, 1), (2, 2)])).unwrap();

    let snapshot = table.snapshot(None);
    table.append(&chunk("f", &[(3, 3)])).unwrap();

    assert_eq!(snapshot.meta().counts.get("f"), Some(&2));
    let fields = BTreeSet::from(["f".to_string()]);
    let keys: Vec<i64> = snapshot
        .scan(&fields, &RangeSet::all())
        .remove("f")
        .unwrap()
        .map(|cell| cell.unwrap().0)
        .collect();
    assert_eq!(keys, vec![1, 2]);
}

#[test]
fn test_snapshot_skips_emptied_columns() {
    let (_root, table) = setup_memtable();
    table.append(&chunk("a", &[(1, 1)])).unwrap();
    table.append(&chunk("b", &[(2, 2)])).unwrap();

    let mut areas = AreaSet::new();
    areas.add_field_keys(["a"], &RangeSet::from_range(..));
    table.delete(&areas);

    let snapshot = table.snapshot(None);
    assert!(!snapshot.meta().schema.contains_key("a"));
    assert_eq!(snapshot.meta().counts.get("b"), Some(&1));
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_concurrent_appends_distinct_columns() {
    let (_root, table) = setup_memtable();
    let table = Arc::new(table);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                let field = format!("f{}", t);
                for key in 0..100 {
                    table.append(&chunk(&field, &[(key, key * t)])).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.schema().len(), 8);
    for t in 0..8 {
        assert_eq!(cells(&table, &format!("f{}", t)).len(), 100);
    }
}

#[test]
fn test_concurrent_appends_same_column() {
    let (_root, table) = setup_memtable();
    let table = Arc::new(table);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for key in (t * 50)..((t + 1) * 50) {
                    table.append(&chunk("shared", &[(key, key)])).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let all = cells(&table, "shared");
    assert_eq!(all.len(), 200);
    assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
}
