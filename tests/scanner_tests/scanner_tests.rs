//! Scanner Tests
//!
//! Tests verify:
//! - Stable k-way merge with newest-wins deduplication
//! - Error propagation through the merge
//! - Tombstone masking of whole table scans
//! - Row assembly across columns
//! - Close listeners firing exactly once

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use unitstore::scanner::{
    column_from_vec, filter_table_scan, ColumnScanner, DedupIterator, ListenCloseScanner,
    RowScanner, StableMergeIterator, TableScan,
};
use unitstore::{AreaSet, RangeSet, Result, Row, StoreError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn longs(cells: &[(i64, i64)]) -> ColumnScanner {
    column_from_vec(cells.iter().map(|&(k, v)| (k, Value::Long(v))).collect())
}

fn cell_key(cell: &(i64, Value)) -> i64 {
    cell.0
}

/// Merge generations given oldest first, newest winning
fn merge_newest_wins(generations: Vec<ColumnScanner>) -> Vec<(i64, Value)> {
    DedupIterator::new(StableMergeIterator::new(generations, cell_key), cell_key)
        .collect::<Result<_>>()
        .unwrap()
}

fn failing_after(cells: &[(i64, i64)]) -> ColumnScanner {
    let items: Vec<Result<(i64, Value)>> = cells
        .iter()
        .map(|&(k, v)| Ok((k, Value::Long(v))))
        .chain(std::iter::once(Err(StoreError::Integrity(
            "checksum mismatch".to_string(),
        ))))
        .collect();
    Box::new(items.into_iter())
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_newest_generation_wins_on_equal_keys() {
    let merged = merge_newest_wins(vec![
        longs(&[(1, 10), (2, 20), (3, 30)]),
        longs(&[(2, 99)]),
        longs(&[(3, 300), (4, 400)]),
    ]);

    assert_eq!(
        merged,
        vec![
            (1, Value::Long(10)),
            (2, Value::Long(99)),
            (3, Value::Long(300)),
            (4, Value::Long(400)),
        ]
    );
}

#[test]
fn test_merge_of_nothing() {
    assert!(merge_newest_wins(vec![]).is_empty());
    assert!(merge_newest_wins(vec![longs(&[]), longs(&[])]).is_empty());
}

#[test]
fn test_merge_extreme_keys() {
    let merged = merge_newest_wins(vec![
        longs(&[(i64::MIN, 1), (i64::MAX, 1)]),
        longs(&[(i64::MIN, 2)]),
    ]);
    assert_eq!(
        merged,
        vec![(i64::MIN, Value::Long(2)), (i64::MAX, Value::Long(1))]
    );
}

#[test]
fn test_merge_reports_source_error() {
    let mut merged = StableMergeIterator::new(
        vec![longs(&[(1, 1), (5, 5)]), failing_after(&[(2, 2)])],
        cell_key,
    );

    assert_eq!(merged.next().unwrap().unwrap().0, 1);
    assert_eq!(merged.next().unwrap().unwrap().0, 2);
    assert!(matches!(merged.next(), Some(Err(StoreError::Integrity(_)))));
}

// =============================================================================
// Tombstone Masking Tests
// =============================================================================

#[test]
fn test_filter_table_scan_masks_and_drops() {
    let mut scan = TableScan::new();
    scan.insert("a".to_string(), longs(&[(1, 1), (2, 2), (3, 3)]));
    scan.insert("b".to_string(), longs(&[(1, 1), (2, 2)]));
    scan.insert("c".to_string(), longs(&[(1, 1)]));

    let mut areas = AreaSet::new();
    areas.add_field_keys(["a"], &RangeSet::from_range(2..3));
    areas.add_fields(["b"]);

    let mut filtered = filter_table_scan(scan, &areas);
    assert!(!filtered.contains_key("b"));

    let a: Vec<i64> = filtered
        .remove("a")
        .unwrap()
        .map(|cell| cell.unwrap().0)
        .collect();
    assert_eq!(a, vec![1, 3]);
    assert_eq!(filtered.remove("c").unwrap().count(), 1);
}

// =============================================================================
// Row Assembly Tests
// =============================================================================

#[test]
fn test_rows_from_sparse_columns() {
    let mut scan = TableScan::new();
    scan.insert("x".to_string(), longs(&[(1, 1), (4, 4)]));
    scan.insert("y".to_string(), longs(&[(2, 20), (4, 40)]));

    let scanner = RowScanner::new(scan);
    assert_eq!(scanner.fields(), ["x".to_string(), "y".to_string()]);

    let rows: Vec<Row> = scanner.collect::<Result<_>>().unwrap();
    let keys: Vec<i64> = rows.iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![1, 2, 4]);
    assert_eq!(rows[1].get("x"), None);
    assert_eq!(rows[2].cells.len(), 2);
}

#[test]
fn test_rows_from_no_columns() {
    let rows: Vec<Row> = RowScanner::new(TableScan::new())
        .collect::<Result<_>>()
        .unwrap();
    assert!(rows.is_empty());
}

// =============================================================================
// Close Listener Tests
// =============================================================================

#[test]
fn test_close_listener_fires_once_on_drop() {
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let counter = Arc::clone(&fired);
        let mut scanner = ListenCloseScanner::new(longs(&[(1, 1), (2, 2)]), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scanner.next().is_some());
        assert!(!scanner.is_closed());
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_closed_scanner_yields_nothing() {
    let mut scanner = ListenCloseScanner::new(longs(&[(1, 1)]), || {});
    scanner.close();
    assert!(scanner.is_closed());
    assert!(scanner.next().is_none());
}
