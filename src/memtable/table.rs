//! MemTable implementation
//!
//! A map of field -> [`MemColumn`] behind an `RwLock`. Writers share the
//! read side and serialize only on the column they touch; the write side
//! is taken to create a column or drop a whole field.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::column::MemColumn;
use super::ChunkSnapshot;
use crate::area::AreaSet;
use crate::error::{Result, StoreError};
use crate::range::RangeSet;
use crate::scanner::TableScan;
use crate::shared::BufferAllocator;
use crate::table::MemoryTable;
use crate::types::DataType;

/// Result of a non-blocking append attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The target column was locked by another writer
    Blocked,
}

/// The mutable write buffer of one engine generation
pub struct MemTable {
    id: u64,
    chunk_size: usize,
    allocator: BufferAllocator,
    columns: RwLock<BTreeMap<String, Arc<MemColumn>>>,
    /// Everything deleted from this table so far
    tombstone: Mutex<AreaSet>,
    closed: AtomicBool,
}

impl MemTable {
    /// `allocator` should be a child dedicated to this table: its
    /// allocated bytes are the table's size estimate
    pub fn new(id: u64, allocator: BufferAllocator, chunk_size: usize) -> Self {
        Self {
            id,
            chunk_size,
            allocator,
            columns: RwLock::new(BTreeMap::new()),
            tombstone: Mutex::new(AreaSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a chunk unless its column is busy
    pub fn try_append(&self, chunk: &ChunkSnapshot) -> Result<AppendOutcome> {
        let appended = self.with_column(chunk, |column| column.try_append(&chunk.cells))?;
        if appended {
            Ok(AppendOutcome::Appended)
        } else {
            trace!(field = %chunk.field, "Column busy");
            Ok(AppendOutcome::Blocked)
        }
    }

    /// Append a chunk, waiting for its column
    pub fn append(&self, chunk: &ChunkSnapshot) -> Result<()> {
        self.with_column(chunk, |column| column.append(&chunk.cells))
    }

    /// Apply a deletion. Cells are dropped at once and the deletion is
    /// recorded in the table's tombstone.
    pub fn delete(&self, areas: &AreaSet) {
        if areas.is_empty() {
            return;
        }
        {
            let mut columns = self.columns.write();
            columns.retain(|field, _| !areas.field_deleted(field));
            for (field, column) in columns.iter() {
                let mask = areas.mask_for(field);
                if !mask.is_empty() {
                    column.delete(&mask);
                }
            }
        }
        self.tombstone.lock().add_all(areas);
    }

    /// Run `f` on the chunk's column under the shared lock, creating the
    /// column first if needed
    fn with_column<R>(&self, chunk: &ChunkSnapshot, f: impl FnOnce(&MemColumn) -> R) -> Result<R> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        loop {
            {
                let columns = self.columns.read();
                if let Some(column) = columns.get(&chunk.field) {
                    if column.data_type() != chunk.data_type {
                        return Err(StoreError::SchemaConflict {
                            field: chunk.field.clone(),
                            existing: column.data_type(),
                            requested: chunk.data_type,
                        });
                    }
                    return Ok(f(column));
                }
            }
            // A whole-field delete may remove it again before the retry
            self.columns
                .write()
                .entry(chunk.field.clone())
                .or_insert_with(|| {
                    Arc::new(MemColumn::new(
                        chunk.data_type,
                        self.chunk_size,
                        &self.allocator,
                    ))
                });
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Scan a point-in-time copy of the projected cells
    pub fn scan(&self, fields: &BTreeSet<String>, ranges: &RangeSet) -> TableScan {
        self.snapshot_range(fields, ranges, None).scan(fields, ranges)
    }

    /// Materialize the whole buffer
    pub fn snapshot(&self, allocator: Option<&BufferAllocator>) -> MemoryTable {
        let columns = self.columns.read();
        let data = columns
            .iter()
            .map(|(field, column)| (field.clone(), (column.data_type(), column.snapshot(None))))
            .filter(|(_, (_, cells))| !cells.is_empty())
            .collect();
        MemoryTable::new(data, allocator)
    }

    /// Materialize only `fields` within `ranges`
    pub fn snapshot_range(
        &self,
        fields: &BTreeSet<String>,
        ranges: &RangeSet,
        allocator: Option<&BufferAllocator>,
    ) -> MemoryTable {
        let columns = self.columns.read();
        let data = columns
            .iter()
            .filter(|(field, _)| fields.contains(*field))
            .map(|(field, column)| {
                (
                    field.clone(),
                    (column.data_type(), column.snapshot(Some(ranges))),
                )
            })
            .filter(|(_, (_, cells))| !cells.is_empty())
            .collect();
        MemoryTable::new(data, allocator)
    }

    /// Fold each column's chunks into one run
    pub fn compact(&self) {
        for column in self.columns.read().values() {
            column.compact();
        }
    }

    /// Declared type of every field holding a column
    pub fn schema(&self) -> BTreeMap<String, DataType> {
        self.columns
            .read()
            .iter()
            .map(|(field, column)| (field.clone(), column.data_type()))
            .collect()
    }

    pub fn tombstone(&self) -> AreaSet {
        self.tombstone.lock().clone()
    }

    /// Bytes accounted to this table
    pub fn estimated_size(&self) -> usize {
        self.allocator.allocated()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.read().values().all(|column| column.is_empty())
    }

    /// Drop all buffered cells and refuse further appends. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.columns.write().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTable")
            .field("id", &self.id)
            .field("fields", &self.columns.read().len())
            .field("estimated_size", &self.estimated_size())
            .field("closed", &self.is_closed())
            .finish()
    }
}
