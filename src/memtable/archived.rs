//! ArchivedMemTable: a retired buffer waiting for its flush.
//!
//! ```text
//! Archived ──snapshot()──▶ Snapshotted ──close()──▶ Closed
//!                              │
//!                         mark_failed()  (stays pending, waiters notified)
//! ```
//! Deletes that arrive once a snapshot has been taken are applied to the
//! buffer as usual and also collected separately, so the flusher can
//! record them against the table it just wrote.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::MemTable;
use crate::area::AreaSet;
use crate::error::{Result, StoreError};
use crate::range::RangeSet;
use crate::scanner::TableScan;
use crate::shared::{BufferAllocator, Latch};
use crate::table::MemoryTable;

/// Resource released when the archived table closes
pub type CloseHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SnapshotState {
    snapshot: bool,
    deleted: AreaSet,
}

pub struct ArchivedMemTable {
    table: Arc<MemTable>,
    state: Mutex<SnapshotState>,
    on_close: Mutex<Vec<CloseHook>>,
    closing: AtomicBool,
    latch: Latch,
}

impl ArchivedMemTable {
    pub fn new(table: Arc<MemTable>, on_close: Vec<CloseHook>) -> Self {
        Self {
            table,
            state: Mutex::new(SnapshotState::default()),
            on_close: Mutex::new(on_close),
            closing: AtomicBool::new(false),
            latch: Latch::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.table.id()
    }

    pub fn name(&self) -> String {
        format!("memtable-{}", self.table.id())
    }

    pub fn table(&self) -> &MemTable {
        &self.table
    }

    // =========================================================================
    // Snapshot & Delete
    // =========================================================================

    /// Materialize the buffer for flushing. Repeated calls return fresh
    /// copies; the snapshot flag stays set.
    pub fn snapshot(&self, allocator: Option<&BufferAllocator>) -> MemoryTable {
        let mut state = self.state.lock();
        state.snapshot = true;
        self.table.compact();
        self.table.snapshot(allocator)
    }

    pub fn snapshot_range(
        &self,
        fields: &BTreeSet<String>,
        ranges: &RangeSet,
        allocator: Option<&BufferAllocator>,
    ) -> MemoryTable {
        let mut state = self.state.lock();
        state.snapshot = true;
        self.table.compact();
        self.table.snapshot_range(fields, ranges, allocator)
    }

    pub fn delete(&self, areas: &AreaSet) {
        let mut state = self.state.lock();
        self.table.delete(areas);
        if state.snapshot {
            state.deleted.add_all(areas);
        }
    }

    /// Deletes received after the first snapshot
    pub fn get_deleted(&self) -> AreaSet {
        self.state.lock().deleted.clone()
    }

    pub fn is_snapshot(&self) -> bool {
        self.state.lock().snapshot
    }

    /// Read the live buffer without marking a snapshot
    pub fn scan(&self, fields: &BTreeSet<String>, ranges: &RangeSet) -> TableScan {
        self.table.scan(fields, ranges)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Release the buffer and every registered resource, then wake
    /// waiters. Runs once; later calls are no-ops.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.table.close();
        let hooks = std::mem::take(&mut *self.on_close.lock());
        for hook in hooks {
            hook();
        }
        self.latch.release();
        debug!(table = %self.name(), "Archived memtable closed");
    }

    pub fn is_closed(&self) -> bool {
        self.latch.is_released()
    }

    /// Block until `close` has run
    pub fn wait_until_closed(&self) {
        self.latch.wait();
    }

    /// Block until closed or a flush failure is reported
    pub fn wait_flushed(&self) -> Result<()> {
        self.latch
            .wait_settled()
            .map_err(|reason| StoreError::FlushFailed {
                table: self.name(),
                reason,
            })
    }

    /// Report a failed flush. The table stays pending and keeps its
    /// resources.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(table = %self.name(), %reason, "Flush failed; generation stays pending");
        self.latch.fail(reason);
    }

    pub fn failure(&self) -> Option<String> {
        self.latch.failure()
    }
}

impl std::fmt::Debug for ArchivedMemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivedMemTable")
            .field("id", &self.id())
            .field("snapshot", &self.is_snapshot())
            .field("closed", &self.is_closed())
            .finish()
    }
}
