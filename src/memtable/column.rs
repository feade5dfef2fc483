//! MemColumn: one field's buffered cells.
//!
//! Cells land in a small ordered `active` chunk; once it holds
//! `chunk_size` cells it is sealed into an immutable sorted run. Runs are
//! kept oldest first, so a later run overrides an earlier one on equal
//! keys. [`MemColumn::compact`] folds everything back into a single run.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::range::RangeSet;
use crate::shared::{BufferAllocator, Reservation};
use crate::types::{DataType, Key, Value};

/// Accounted footprint of one buffered cell
pub(crate) fn cell_size(value: &Value) -> usize {
    std::mem::size_of::<Key>() + value.estimated_size()
}

struct ColumnState {
    active: BTreeMap<Key, Value>,
    sealed: Vec<Vec<(Key, Value)>>,
    reservation: Reservation,
}

impl ColumnState {
    fn append(&mut self, cells: &[(Key, Value)], chunk_size: usize) {
        let mut bytes = 0;
        for (key, value) in cells {
            bytes += cell_size(value);
            self.active.insert(*key, value.clone());
            if self.active.len() >= chunk_size {
                let full = std::mem::take(&mut self.active);
                self.sealed.push(full.into_iter().collect());
            }
        }
        self.reservation.grow(bytes);
    }

    /// Latest value per key, restricted to `ranges`
    fn merged(&self, ranges: Option<&RangeSet>) -> BTreeMap<Key, Value> {
        let keep = |key: &Key| ranges.map_or(true, |r| r.contains(*key));
        let mut merged = BTreeMap::new();
        for run in &self.sealed {
            for (key, value) in run.iter().filter(|(k, _)| keep(k)) {
                merged.insert(*key, value.clone());
            }
        }
        for (key, value) in self.active.iter().filter(|(k, _)| keep(k)) {
            merged.insert(*key, value.clone());
        }
        merged
    }
}

pub struct MemColumn {
    data_type: DataType,
    chunk_size: usize,
    state: Mutex<ColumnState>,
}

impl MemColumn {
    pub fn new(data_type: DataType, chunk_size: usize, allocator: &BufferAllocator) -> Self {
        Self {
            data_type,
            chunk_size,
            state: Mutex::new(ColumnState {
                active: BTreeMap::new(),
                sealed: Vec::new(),
                reservation: allocator.reserve(0),
            }),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Append without waiting; `false` means the column was busy
    pub fn try_append(&self, cells: &[(Key, Value)]) -> bool {
        match self.state.try_lock() {
            Some(mut state) => {
                state.append(cells, self.chunk_size);
                true
            }
            None => false,
        }
    }

    pub fn append(&self, cells: &[(Key, Value)]) {
        self.state.lock().append(cells, self.chunk_size);
    }

    /// Physically drop every cell whose key is in `ranges`
    pub fn delete(&self, ranges: &RangeSet) {
        let mut state = self.state.lock();
        state.active.retain(|key, _| !ranges.contains(*key));
        for run in state.sealed.iter_mut() {
            run.retain(|(key, _)| !ranges.contains(*key));
        }
        state.sealed.retain(|run| !run.is_empty());
    }

    /// Fold every run and the active chunk into one sorted run
    pub fn compact(&self) {
        let mut state = self.state.lock();
        if state.sealed.len() <= 1 && state.active.is_empty() {
            return;
        }
        let merged: Vec<(Key, Value)> = state.merged(None).into_iter().collect();
        state.active.clear();
        state.sealed = if merged.is_empty() {
            Vec::new()
        } else {
            vec![merged]
        };
    }

    /// Point-in-time copy of the latest value per key
    pub fn snapshot(&self, ranges: Option<&RangeSet>) -> Vec<(Key, Value)> {
        self.state.lock().merged(ranges).into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.active.is_empty() && state.sealed.iter().all(|run| run.is_empty())
    }

    /// Number of sealed runs plus the active chunk if non-empty
    pub fn chunk_count(&self) -> usize {
        let state = self.state.lock();
        state.sealed.len() + usize::from(!state.active.is_empty())
    }

    #[cfg(test)]
    fn lock(&self) -> parking_lot::MutexGuard<'_, ColumnState> {
        self.state.lock()
    }
}
