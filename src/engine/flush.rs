//! Flush workers
//!
//! A fixed pool of `compact-N` threads drains archived buffers from a
//! channel. Each flush:
//! 1. Takes a flusher permit
//! 2. Snapshots the archived buffer and writes it as a new table
//! 3. Under the commit lock, records deletes that arrived after the
//!    snapshot and swaps the buffer for the table in the table set
//! 4. Closes the archived buffer, releasing its write buffer permit
//!
//! A failure leaves the buffer pending with its permit held.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;
use tracing::{debug, error, trace, warn};

use super::{table_name, EngineInner};
use crate::error::{Result, StoreError};
use crate::memtable::ArchivedMemTable;
use crate::range::RangeSet;
use crate::table::FileTable;

pub(super) fn spawn_workers(
    inner: &Arc<EngineInner>,
    receiver: &Receiver<Arc<ArchivedMemTable>>,
    count: usize,
) -> Result<Vec<JoinHandle<()>>> {
    (0..count)
        .map(|index| {
            let inner = Arc::clone(inner);
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("compact-{}", index))
                .spawn(move || {
                    trace!(worker = index, "Flush worker started");
                    for archived in receiver.iter() {
                        inner.flush_archived(&archived);
                    }
                    trace!(worker = index, "Flush worker stopped");
                })
                .map_err(StoreError::from)
        })
        .collect()
}

impl EngineInner {
    fn flush_archived(&self, archived: &ArchivedMemTable) {
        let _permit = self.shared.flusher_permits().acquire();
        let name = table_name(archived.id());
        debug!(table = %name, source = %archived.name(), "Flush started");

        match self.write_generation(archived, &name) {
            Ok(()) => debug!(table = %name, "Flush finished"),
            Err(e) => {
                error!(table = %name, error = %e, "Flush failed");
                archived.mark_failed(e.to_string());
            }
        }
    }

    fn write_generation(&self, archived: &ArchivedMemTable, name: &str) -> Result<()> {
        let id = archived.id();

        let snapshot = archived.snapshot(Some(self.shared.allocator()));
        let meta = Arc::clone(snapshot.meta());
        let has_data = !meta.is_empty();
        if has_data {
            let fields: BTreeSet<String> = meta.schema.keys().cloned().collect();
            self.read_writer
                .flush(name, &meta, snapshot.scan(&fields, &RangeSet::all()))?;
        }
        drop(snapshot);

        let _commit = self.commit_lock.write();
        let deleted = archived.get_deleted();
        if has_data && !deleted.is_empty() {
            if let Err(e) = self.read_writer.delete(name, &deleted) {
                self.discard(name);
                return Err(e);
            }
        }

        let registered = {
            let mut tables = self.tables.write();
            let pending = tables.archived.remove(&id).is_some();
            if pending && has_data {
                tables
                    .persisted
                    .insert(id, FileTable::new(name, Arc::clone(&self.read_writer)));
            }
            pending
        };
        if has_data {
            if registered {
                self.registry.lock().add_table(id, &meta, &deleted);
            } else {
                // Cleared while flushing
                self.discard(name);
            }
        }
        drop(_commit);

        archived.close();
        Ok(())
    }

    fn discard(&self, name: &str) {
        if let Err(e) = self.read_writer.delete_table(name) {
            warn!(table = %name, error = %e, "Failed to remove table");
        }
    }
}
