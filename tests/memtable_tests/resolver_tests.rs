//! Conflict Resolver Tests
//!
//! Tests verify:
//! - Every chunk is appended exactly once, contended or not
//! - Stats account for each chunk
//! - Threshold zero falls back to blocking on first contention
//! - Type conflicts abort the batch

use std::sync::{Arc, Barrier};
use std::thread;

use unitstore::memtable::{ChunkSnapshot, ConflictResolver, MemTable, RecursiveTryLockResolver};
use unitstore::shared::BufferAllocator;
use unitstore::{DataType, RangeSet, StoreError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_table() -> Arc<MemTable> {
    Arc::new(MemTable::new(0, BufferAllocator::root("test"), 8))
}

/// Chunk `index` of a thread: 10 keys, spread over 4 fields
fn thread_chunk(thread: i64, index: i64) -> ChunkSnapshot {
    let base = (thread * 100 + index) * 10;
    ChunkSnapshot::new(
        format!("f{}", index % 4),
        DataType::Long,
        (base..base + 10).map(|k| (k, Value::Long(k))).collect(),
    )
}

fn count(table: &MemTable, field: &str) -> usize {
    let fields = std::collections::BTreeSet::from([field.to_string()]);
    table
        .scan(&fields, &RangeSet::all())
        .remove(field)
        .map(|column| column.count())
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_empty_batch() {
    let table = setup_table();
    let stats = RecursiveTryLockResolver::default()
        .append(&table, vec![])
        .unwrap();
    assert_eq!(stats.rounds, 0);
    assert_eq!(stats.appended(), 0);
    assert!(table.is_empty());
}

#[test]
fn test_concurrent_batches_append_every_chunk_once() {
    let table = setup_table();
    let resolver = Arc::new(RecursiveTryLockResolver::new(0.5));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let table = Arc::clone(&table);
            let resolver = Arc::clone(&resolver);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let chunks: Vec<_> = (0..100).map(|i| thread_chunk(t, i)).collect();
                barrier.wait();
                resolver.append(&table, chunks).unwrap()
            })
        })
        .collect();

    let mut appended = 0;
    for handle in handles {
        let stats = handle.join().unwrap();
        assert!(stats.rounds >= 1);
        appended += stats.appended();
    }

    assert_eq!(appended, 800);
    let total: usize = (0..4).map(|f| count(&table, &format!("f{}", f))).sum();
    assert_eq!(total, 8000);
}

#[test]
fn test_zero_threshold_still_appends_everything() {
    let table = setup_table();
    let resolver = Arc::new(RecursiveTryLockResolver::new(0.0));
    assert_eq!(resolver.threshold(), 0.0);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let table = Arc::clone(&table);
            let resolver = Arc::clone(&resolver);
            thread::spawn(move || {
                let chunks: Vec<_> = (0..50).map(|i| thread_chunk(t, i)).collect();
                let stats = resolver.append(&table, chunks).unwrap();
                // Any contention ends the optimistic phase after one round
                assert!(stats.rounds <= 1);
                stats.appended()
            })
        })
        .collect();

    let appended: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(appended, 200);
    let total: usize = (0..4).map(|f| count(&table, &format!("f{}", f))).sum();
    assert_eq!(total, 2000);
}

#[test]
fn test_type_conflict_aborts() {
    let table = setup_table();
    table
        .append(&ChunkSnapshot::new("f0", DataType::Double, vec![(1, Value::Double(1.0))]))
        .unwrap();

    let err = RecursiveTryLockResolver::default()
        .append(&table, vec![thread_chunk(0, 0)])
        .unwrap_err();
    assert!(matches!(err, StoreError::SchemaConflict { .. }));
}
