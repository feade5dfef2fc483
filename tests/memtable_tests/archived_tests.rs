//! ArchivedMemTable Tests
//!
//! Tests verify:
//! - Deletes after a snapshot are collected for the flusher
//! - Close runs its hooks once and wakes waiters
//! - Failure reporting keeps the table pending

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use unitstore::memtable::{ArchivedMemTable, ChunkSnapshot, CloseHook, MemTable};
use unitstore::shared::BufferAllocator;
use unitstore::{AreaSet, DataType, RangeSet, StoreError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_archived(hooks: Vec<CloseHook>) -> (BufferAllocator, ArchivedMemTable) {
    let root = BufferAllocator::root("test");
    let table = MemTable::new(3, root.new_child("memtable-3"), 16);
    let cells = (0..10).map(|k| (k, Value::Long(k))).collect();
    table
        .append(&ChunkSnapshot::new("f", DataType::Long, cells))
        .unwrap();
    (root, ArchivedMemTable::new(Arc::new(table), hooks))
}

fn delete_keys(range: std::ops::Range<i64>) -> AreaSet {
    let mut areas = AreaSet::new();
    areas.add_field_keys(["f"], &RangeSet::from_range(range));
    areas
}

fn keys(archived: &ArchivedMemTable) -> Vec<i64> {
    let fields = BTreeSet::from(["f".to_string()]);
    archived
        .scan(&fields, &RangeSet::all())
        .remove("f")
        .map(|column| column.map(|cell| cell.unwrap().0).collect())
        .unwrap_or_default()
}

// =============================================================================
// Snapshot & Delete Tests
// =============================================================================

#[test]
fn test_delete_before_snapshot_is_not_collected() {
    let (_root, archived) = setup_archived(vec![]);

    archived.delete(&delete_keys(0..5));

    assert!(!archived.is_snapshot());
    assert!(archived.get_deleted().is_empty());
    assert_eq!(keys(&archived), vec![5, 6, 7, 8, 9]);
}

#[test]
fn test_delete_after_snapshot_is_collected() {
    let (_root, archived) = setup_archived(vec![]);

    let snapshot = archived.snapshot(None);
    assert!(archived.is_snapshot());
    assert_eq!(snapshot.meta().counts.get("f"), Some(&10));

    archived.delete(&delete_keys(2..4));
    archived.delete(&delete_keys(8..9));

    let deleted = archived.get_deleted();
    assert!(deleted.covers("f", 2));
    assert!(deleted.covers("f", 3));
    assert!(deleted.covers("f", 8));
    assert!(!deleted.covers("f", 4));

    // Applied to the live buffer as well
    assert_eq!(keys(&archived), vec![0, 1, 4, 5, 6, 7, 9]);
}

#[test]
fn test_scan_does_not_mark_snapshot() {
    let (_root, archived) = setup_archived(vec![]);

    assert_eq!(keys(&archived).len(), 10);
    assert!(!archived.is_snapshot());

    let fields = BTreeSet::from(["f".to_string()]);
    let partial = archived.snapshot_range(&fields, &RangeSet::from_range(0..3), None);
    assert!(archived.is_snapshot());
    assert_eq!(partial.meta().counts.get("f"), Some(&3));
}

#[test]
fn test_snapshot_accounts_to_given_allocator() {
    let (root, archived) = setup_archived(vec![]);
    let before = root.allocated();

    let flushing = root.new_child("flush");
    let snapshot = archived.snapshot(Some(&flushing));
    assert!(flushing.allocated() > 0);
    assert_eq!(root.allocated(), before + flushing.allocated());

    drop(snapshot);
    assert_eq!(flushing.allocated(), 0);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_runs_hooks_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let hook: CloseHook = {
        let released = Arc::clone(&released);
        Box::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    };
    let (root, archived) = setup_archived(vec![hook]);

    archived.close();
    archived.close();

    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(archived.is_closed());
    assert!(archived.table().is_closed());
    assert_eq!(root.allocated(), 0);
    archived.wait_flushed().unwrap();
}

#[test]
fn test_close_wakes_waiter() {
    let (_root, archived) = setup_archived(vec![]);
    let archived = Arc::new(archived);

    let waiter = {
        let archived = Arc::clone(&archived);
        thread::spawn(move || archived.wait_flushed())
    };

    thread::sleep(Duration::from_millis(20));
    archived.close();

    waiter.join().unwrap().unwrap();
    archived.wait_until_closed();
}

#[test]
fn test_failure_keeps_table_pending() {
    let (_root, archived) = setup_archived(vec![]);
    let archived = Arc::new(archived);

    let waiter = {
        let archived = Arc::clone(&archived);
        thread::spawn(move || archived.wait_flushed())
    };

    archived.mark_failed("disk full");

    let err = waiter.join().unwrap().unwrap_err();
    match err {
        StoreError::FlushFailed { table, reason } => {
            assert_eq!(table, archived.name());
            assert_eq!(reason, "disk full");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(archived.failure().as_deref(), Some("disk full"));
    assert!(!archived.is_closed());
    assert_eq!(keys(&archived).len(), 10);
}

#[test]
fn test_failure_after_close_is_ignored() {
    let (_root, archived) = setup_archived(vec![]);

    archived.close();
    archived.mark_failed("too late");

    assert!(archived.failure().is_none());
    archived.wait_flushed().unwrap();
}
