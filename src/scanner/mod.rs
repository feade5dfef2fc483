//! Scanner Module
//!
//! Pull-based, single-pass cursors and their combinators.
//!
//! ## Responsibilities
//! - A common boxed cursor type for every generation's column data
//! - Close notification with exactly-once release (on close or drop)
//! - Tombstone masking at scan time
//! - Stable k-way merge and last-wins deduplication
//! - Assembling per-field columns into key-ordered rows
//!
//! ## Shape
//! A scanner is an `Iterator<Item = Result<T>>`: `next()` advances and
//! surfaces storage failures, `None` marks the end. Closing is dropping;
//! [`ListenCloseScanner`] adds an explicit, idempotent `close()` for
//! callers that must release resources before the scanner goes out of scope.

mod merge;
mod row;

use std::collections::BTreeMap;
use std::fmt;

pub use merge::{DedupIterator, StableMergeIterator};
pub use row::RowScanner;

use crate::area::AreaSet;
use crate::error::Result;
use crate::range::RangeSet;
use crate::types::{Key, Value};

/// Type-erased fallible cursor
pub type BoxScanner<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Cursor over one field's cells in key order
pub type ColumnScanner = BoxScanner<(Key, Value)>;

/// One table's scan result: a column cursor per projected field
pub type TableScan = BTreeMap<String, ColumnScanner>;

/// Adapt an in-memory, already ordered cell list into a column scanner
pub fn column_from_vec(cells: Vec<(Key, Value)>) -> ColumnScanner {
    Box::new(cells.into_iter().map(Ok))
}

// =============================================================================
// DelegateScanner
// =============================================================================

/// Pass-through base that decorators wrap their source in
pub struct DelegateScanner<I> {
    inner: I,
}

impl<I> DelegateScanner<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Iterator> Iterator for DelegateScanner<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

// =============================================================================
// ListenCloseScanner
// =============================================================================

type CloseListener = Box<dyn FnOnce() + Send>;

/// Runs a callback exactly once when the scanner is closed or dropped
pub struct ListenCloseScanner<I> {
    inner: DelegateScanner<I>,
    listener: Option<CloseListener>,
}

impl<I> ListenCloseScanner<I> {
    pub fn new(inner: I, listener: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: DelegateScanner::new(inner),
            listener: Some(Box::new(listener)),
        }
    }

    /// Idempotent; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none()
    }
}

impl<I: Iterator> Iterator for ListenCloseScanner<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.inner.next()
    }
}

impl<I> Drop for ListenCloseScanner<I> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<I> fmt::Debug for ListenCloseScanner<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenCloseScanner")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// AreaFilterScanner
// =============================================================================

/// Skips every cell of one column covered by a tombstone mask
pub struct AreaFilterScanner<I> {
    inner: DelegateScanner<I>,
    mask: RangeSet,
}

impl<I> AreaFilterScanner<I>
where
    I: Iterator<Item = Result<(Key, Value)>>,
{
    pub fn new(inner: I, field: &str, areas: &AreaSet) -> Self {
        Self::with_mask(inner, areas.mask_for(field))
    }

    pub fn with_mask(inner: I, mask: RangeSet) -> Self {
        Self {
            inner: DelegateScanner::new(inner),
            mask,
        }
    }
}

impl<I> Iterator for AreaFilterScanner<I>
where
    I: Iterator<Item = Result<(Key, Value)>>,
{
    type Item = Result<(Key, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok((key, _)) if self.mask.contains(key) => continue,
                other => return Some(other),
            }
        }
    }
}

/// Apply a tombstone to a whole table scan: fully deleted fields are
/// dropped, the rest are masked cell by cell.
pub fn filter_table_scan(scan: TableScan, areas: &AreaSet) -> TableScan {
    if areas.is_empty() {
        return scan;
    }
    scan.into_iter()
        .filter_map(|(field, scanner)| {
            let mask = areas.mask_for(&field);
            if mask.is_all() {
                return None;
            }
            if mask.is_empty() {
                return Some((field, scanner));
            }
            let filtered: ColumnScanner = Box::new(AreaFilterScanner::with_mask(scanner, mask));
            Some((field, filtered))
        })
        .collect()
}
