//! In-memory, immutable table snapshot

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::TableMeta;
use crate::error::Result;
use crate::range::{KeyRange, RangeSet};
use crate::scanner::{ColumnScanner, TableScan};
use crate::shared::{BufferAllocator, Reservation};
use crate::types::{DataType, Key, Value};

type Cells = Arc<[(Key, Value)]>;

/// Sorted columns captured from a MemTable. Cheap to scan repeatedly:
/// each scanner shares the column buffers.
pub struct MemoryTable {
    meta: Arc<TableMeta>,
    columns: BTreeMap<String, Cells>,
    _reservation: Option<Reservation>,
}

impl MemoryTable {
    /// `columns` must hold each field's cells sorted by key with unique keys.
    /// When `allocator` is given the snapshot's bytes are accounted to it.
    pub fn new(
        columns: BTreeMap<String, (DataType, Vec<(Key, Value)>)>,
        allocator: Option<&BufferAllocator>,
    ) -> Self {
        let mut meta = TableMeta::default();
        let mut bytes = 0;
        let columns = columns
            .into_iter()
            .map(|(field, (data_type, cells))| {
                meta.add_field(&field, data_type, &cells);
                bytes += cells
                    .iter()
                    .map(|(_, value)| crate::memtable::cell_size(value))
                    .sum::<usize>();
                (field, Cells::from(cells))
            })
            .collect();
        Self {
            meta: Arc::new(meta),
            columns,
            _reservation: allocator.map(|allocator| allocator.reserve(bytes)),
        }
    }

    pub fn meta(&self) -> &Arc<TableMeta> {
        &self.meta
    }

    pub fn is_empty(&self) -> bool {
        self.columns.values().all(|cells| cells.is_empty())
    }

    pub fn scan(&self, fields: &BTreeSet<String>, ranges: &RangeSet) -> TableScan {
        self.columns
            .iter()
            .filter(|(field, _)| fields.contains(*field))
            .map(|(field, cells)| {
                let scanner: ColumnScanner =
                    Box::new(SliceScanner::new(Arc::clone(cells), ranges));
                (field.clone(), scanner)
            })
            .collect()
    }
}

impl std::fmt::Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTable")
            .field("fields", &self.columns.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Walks the parts of a shared sorted column that fall in a range set
struct SliceScanner {
    cells: Cells,
    ranges: Vec<KeyRange>,
    range_index: usize,
    position: usize,
}

impl SliceScanner {
    fn new(cells: Cells, ranges: &RangeSet) -> Self {
        let mut scanner = Self {
            cells,
            ranges: ranges.iter().collect(),
            range_index: 0,
            position: 0,
        };
        scanner.seek_range();
        scanner
    }

    fn seek_range(&mut self) {
        if let Some(range) = self.ranges.get(self.range_index) {
            let start = range.start;
            let offset = self.cells[self.position..].partition_point(|(key, _)| *key < start);
            self.position += offset;
        }
    }
}

impl Iterator for SliceScanner {
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let range = self.ranges.get(self.range_index)?;
            let (key, value) = self.cells.get(self.position)?;
            if *key <= range.end {
                self.position += 1;
                return Some(Ok((*key, value.clone())));
            }
            self.range_index += 1;
            self.seek_range();
        }
    }
}
