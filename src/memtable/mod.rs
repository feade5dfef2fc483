//! MemTable Module
//!
//! In-memory write buffers and the path from writer to flush.
//!
//! ## Responsibilities
//! - Concurrent, per-column buffered appends
//! - Immediate deletion with a recorded tombstone
//! - Point-in-time snapshots for scans and flushes
//! - Archiving a retired buffer until its flush completes
//! - Contention-adaptive chunk append (conflict resolver)
//!
//! ## Data Structure Choice
//! Each field owns a `MemColumn` guarded by its own `Mutex`: writers to
//! different fields never contend, and the resolver can `try_lock` a
//! column without blocking. Within a column, cells accumulate in a small
//! `BTreeMap` that is sealed into a sorted run every `chunk_size` cells.

mod archived;
mod column;
mod resolver;
mod table;

pub use archived::{ArchivedMemTable, CloseHook};
pub use column::MemColumn;
pub use resolver::{AppendStats, ConflictResolver, RecursiveTryLockResolver};
pub use table::{AppendOutcome, MemTable};

pub(crate) use column::cell_size;

use crate::types::{DataType, Key, Value};

/// A batch of cells for one field, the unit the resolver appends
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSnapshot {
    pub field: String,
    pub data_type: DataType,
    pub cells: Vec<(Key, Value)>,
}

impl ChunkSnapshot {
    pub fn new(field: impl Into<String>, data_type: DataType, cells: Vec<(Key, Value)>) -> Self {
        Self {
            field: field.into(),
            data_type,
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
