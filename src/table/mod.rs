//! Table Module
//!
//! Immutable generations of data and the persistence boundary.
//!
//! ## Responsibilities
//! - Table metadata (schema, per-field key spans and counts, tombstone)
//! - The closed set of table kinds: in-memory snapshot, persisted file,
//!   and a tombstone overlay over either
//! - The [`ReadWriter`] contract for pluggable on-disk formats
//!
//! ## Deletion
//! A table is never rewritten to delete data. `Table::Deleted` carries an
//! [`AreaSet`] and masks its inner table at scan time.

mod file;
mod memory;
mod readwriter;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use file::FileReadWriter;
pub use memory::MemoryTable;
pub use readwriter::ReadWriter;

use crate::area::AreaSet;
use crate::error::Result;
use crate::range::{KeyRange, RangeSet};
use crate::scanner::{filter_table_scan, TableScan};
use crate::shared::Weigh;
use crate::types::{DataType, Key, Value};

// =============================================================================
// Table Metadata
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Field -> declared type
    pub schema: BTreeMap<String, DataType>,
    /// Field -> span of its keys; absent for fields without cells
    pub ranges: BTreeMap<String, KeyRange>,
    /// Field -> number of stored cells
    pub counts: BTreeMap<String, u64>,
    /// Deletions recorded against this table after it was written
    pub tombstone: AreaSet,
}

impl TableMeta {
    /// Record one field's sorted cells
    pub fn add_field(&mut self, field: &str, data_type: DataType, cells: &[(Key, Value)]) {
        self.schema.insert(field.to_string(), data_type);
        if let (Some((first, _)), Some((last, _))) = (cells.first(), cells.last()) {
            self.ranges
                .insert(field.to_string(), KeyRange { start: *first, end: *last });
        }
        self.counts.insert(field.to_string(), cells.len() as u64);
    }

    /// Span of all fields' keys
    pub fn range(&self) -> Option<KeyRange> {
        self.ranges.values().copied().reduce(|a, b| a.span(&b))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.values().all(|&count| count == 0)
    }

    /// Copy with an extra tombstone folded in
    pub fn with_tombstone(&self, areas: &AreaSet) -> TableMeta {
        let mut meta = self.clone();
        meta.tombstone.add_all(areas);
        meta
    }
}

impl Weigh for TableMeta {
    fn weight(&self) -> usize {
        let fields: usize = self.schema.keys().map(|f| f.len() + 48).sum();
        let tombstone = self.tombstone.fields().len() * 32
            + self.tombstone.keys().iter().count() * 16
            + self
                .tombstone
                .segments()
                .iter()
                .map(|(f, r)| f.len() + r.iter().count() * 16)
                .sum::<usize>();
        64 + fields + tombstone
    }
}

// =============================================================================
// Table
// =============================================================================

/// One persisted table, read through its [`ReadWriter`]
#[derive(Clone)]
pub struct FileTable {
    name: String,
    read_writer: Arc<dyn ReadWriter>,
}

impl FileTable {
    pub fn new(name: impl Into<String>, read_writer: Arc<dyn ReadWriter>) -> Self {
        Self {
            name: name.into(),
            read_writer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> Result<Arc<TableMeta>> {
        self.read_writer.read_meta(&self.name)
    }

    pub fn scan(&self, fields: &BTreeSet<String>, ranges: &RangeSet) -> Result<TableScan> {
        self.read_writer.scan_data(&self.name, fields, ranges)
    }
}

impl std::fmt::Debug for FileTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTable")
            .field("name", &self.name)
            .field("format", &self.read_writer.name())
            .finish()
    }
}

#[derive(Debug)]
pub enum Table {
    Memory(MemoryTable),
    File(FileTable),
    Deleted(Box<Table>, AreaSet),
}

impl Table {
    /// Overlay a tombstone; an empty one leaves the table as is
    pub fn deleted(inner: Table, areas: AreaSet) -> Table {
        if areas.is_empty() {
            return inner;
        }
        match inner {
            Table::Deleted(inner, mut existing) => {
                existing.add_all(&areas);
                Table::Deleted(inner, existing)
            }
            other => Table::Deleted(Box::new(other), areas),
        }
    }

    /// Metadata of the underlying data; a tombstone overlay does not
    /// narrow the declared spans
    pub fn meta(&self) -> Result<Arc<TableMeta>> {
        match self {
            Table::Memory(table) => Ok(Arc::clone(table.meta())),
            Table::File(table) => table.meta(),
            Table::Deleted(inner, _) => inner.meta(),
        }
    }

    pub fn scan(&self, fields: &BTreeSet<String>, ranges: &RangeSet) -> Result<TableScan> {
        match self {
            Table::Memory(table) => Ok(table.scan(fields, ranges)),
            Table::File(table) => table.scan(fields, ranges),
            Table::Deleted(inner, areas) => {
                let live: BTreeSet<String> = fields
                    .iter()
                    .filter(|field| !areas.field_deleted(field))
                    .cloned()
                    .collect();
                if live.is_empty() {
                    return Ok(TableScan::new());
                }
                Ok(filter_table_scan(inner.scan(&live, ranges)?, areas))
            }
        }
    }
}
