//! Engine Module
//!
//! The storage engine of one storage unit, coordinating buffers, flushes
//! and persisted tables.
//!
//! ## Responsibilities
//! - Route writes into the active MemTable through the conflict resolver
//! - Archive full buffers and hand them to the flush workers
//! - Merge every generation into one key-ordered row stream on query
//! - Apply deletions to each generation that may hold matching cells
//! - Recover persisted tables on startup

mod flush;
mod registry;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::area::AreaSet;
use crate::config::StorageProperties;
use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::memtable::{
    ArchivedMemTable, ChunkSnapshot, CloseHook, ConflictResolver, MemTable,
    RecursiveTryLockResolver,
};
use crate::range::{KeyRange, RangeSet};
use crate::scanner::{
    BoxScanner, ColumnScanner, DedupIterator, ListenCloseScanner, RowScanner,
    StableMergeIterator, TableScan,
};
use crate::shared::Shared;
use crate::table::{FileReadWriter, FileTable, ReadWriter, Table, TableMeta};
use crate::types::{DataType, Key, Row, Value};

use registry::SchemaRegistry;

/// Row stream returned by [`Engine::query`]; releases its registration on
/// the shared pool when closed or dropped
pub type QueryScanner = ListenCloseScanner<BoxScanner<Row>>;

/// Persisted table name for a generation id
pub fn table_name(id: u64) -> String {
    format!("{:019}", id)
}

fn parse_table_name(name: &str) -> Option<u64> {
    if name.len() == 19 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// The generations of one storage unit. Ids come from a single sequence,
/// so ascending id is oldest-to-newest across all three kinds.
struct TableSet {
    active: Arc<MemTable>,
    archived: BTreeMap<u64, Arc<ArchivedMemTable>>,
    persisted: BTreeMap<u64, FileTable>,
}

/// One source of a merged read
struct Generation {
    id: u64,
    table: Table,
    meta: Arc<TableMeta>,
}

pub(crate) struct EngineInner {
    shared: Arc<Shared>,
    read_writer: Arc<dyn ReadWriter>,
    resolver: Box<dyn ConflictResolver>,

    /// Held only for list manipulation, never across I/O
    tables: RwLock<TableSet>,

    /// Deletes share it; committing a flushed table or clearing takes it
    /// exclusively, so no delete can slip between a flush and its
    /// registration
    commit_lock: RwLock<()>,

    /// Writers share it from declaring a field's type until its cells are
    /// appended; deletes and clear take it exclusively, so a dropped type
    /// never leaves cells behind in the buffers
    schema_lock: RwLock<()>,

    registry: Mutex<SchemaRegistry>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// The storage engine
///
/// ## Concurrency Model
///
/// - **Writes**: many writers append concurrently under the read side of
///   the table-set lock; the conflict resolver serializes only writers
///   of the same column
/// - **Archive**: takes a write buffer permit (the backpressure point),
///   then the write side of the table-set lock for the swap
/// - **Deletes**: take the schema lock exclusively while types and
///   buffers change, so no writer sits between declaring and appending
/// - **Reads**: snapshot the table set under the read side, then scan
///   without any engine lock
/// - **Flush**: runs on `compact-N` worker threads bounded by the
///   flusher permits
pub struct Engine {
    inner: Arc<EngineInner>,
    flush_tx: Mutex<Option<Sender<Arc<ArchivedMemTable>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Open or create a storage unit in `dir` with file-backed tables
    pub fn open(dir: impl AsRef<Path>, properties: StorageProperties) -> Result<Self> {
        let shared = Shared::new(properties)?;
        let read_writer = Arc::new(FileReadWriter::open(dir, Arc::clone(&shared))?);
        Self::with_read_writer(shared, read_writer)
    }

    /// Open over any persistence format
    ///
    /// On startup:
    /// 1. Drop leftovers of interrupted writes
    /// 2. Read the metadata of every recoverable table
    /// 3. Rebuild the schema registry (conflicting types are corruption)
    /// 4. Resume the generation sequence after the newest table
    /// 5. Start the flush workers
    pub fn with_read_writer(shared: Arc<Shared>, read_writer: Arc<dyn ReadWriter>) -> Result<Self> {
        let properties = shared.properties().clone();

        // Step 1: Clean up
        read_writer.reload()?;

        // Step 2 & 3: Register persisted tables
        let mut registry = SchemaRegistry::default();
        let mut persisted = BTreeMap::new();
        for name in read_writer.table_names()? {
            let Some(id) = parse_table_name(&name) else {
                warn!(table = %name, "Ignoring table with unexpected name");
                continue;
            };
            let meta = read_writer.read_meta(&name)?;
            registry.load_table(id, &meta)?;
            persisted.insert(id, FileTable::new(name, Arc::clone(&read_writer)));
        }

        // Step 4: Resume the sequence
        let first_id = persisted.keys().next_back().map_or(0, |id| id + 1);
        let active = Arc::new(EngineInner::memtable(&shared, first_id));
        info!(
            tables = persisted.len(),
            next_id = first_id,
            format = read_writer.name(),
            "Engine opened"
        );

        let inner = Arc::new(EngineInner {
            resolver: Box::new(RecursiveTryLockResolver::new(properties.blocking_threshold)),
            tables: RwLock::new(TableSet {
                active,
                archived: BTreeMap::new(),
                persisted,
            }),
            commit_lock: RwLock::new(()),
            schema_lock: RwLock::new(()),
            registry: Mutex::new(registry),
            next_id: AtomicU64::new(first_id + 1),
            closed: AtomicBool::new(false),
            shared,
            read_writer,
        });

        // Step 5: Flush workers
        let (flush_tx, flush_rx) = channel::unbounded();
        let workers = flush::spawn_workers(&inner, &flush_rx, properties.compact_permits)?;

        Ok(Self {
            inner,
            flush_tx: Mutex::new(Some(flush_tx)),
            workers: Mutex::new(workers),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Rows of `fields` within `ranges` matching `filter`, in key order.
    ///
    /// Fields referenced only by the filter are read for evaluation and
    /// stripped from the returned rows. Rows left without cells are
    /// skipped.
    pub fn query(
        &self,
        fields: &BTreeSet<String>,
        ranges: &RangeSet,
        filter: Option<&Filter>,
    ) -> Result<QueryScanner> {
        self.ensure_open()?;
        let mut ranges = ranges.clone();
        let mut scan_fields = fields.clone();
        if let Some(filter) = filter {
            ranges = ranges.intersection(&filter.key_ranges()?);
            scan_fields.extend(filter.fields());
        }

        let generations = self.inner.generations(&scan_fields, &ranges)?;
        trace!(generations = generations.len(), %ranges, "Query planned");
        let rows = RowScanner::new(merge_columns(&generations, &scan_fields, &ranges)?);

        let filter = filter.cloned();
        let projected = fields.clone();
        let strip = scan_fields.len() != projected.len();
        let rows = rows.filter_map(move |row| {
            let mut row = match row {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if filter.as_ref().is_some_and(|f| !f.matches(&row)) {
                return None;
            }
            if strip {
                row.cells.retain(|(field, _)| projected.contains(field));
                if row.cells.is_empty() {
                    return None;
                }
            }
            Some(Ok(row))
        });

        Ok(ListenCloseScanner::new(
            Box::new(rows) as BoxScanner<Row>,
            self.inner.shared.track_scanner(),
        ))
    }

    /// Surviving cells per field. Fields without cells are omitted.
    ///
    /// A field held by a single generation with no tombstone on it is
    /// answered from metadata; everything else is counted by merging.
    pub fn count(&self, fields: &BTreeSet<String>) -> Result<BTreeMap<String, u64>> {
        self.ensure_open()?;
        let all = RangeSet::all();
        let generations = self.inner.generations(fields, &all)?;

        let mut counts = BTreeMap::new();
        let mut merged = BTreeSet::new();
        for field in fields {
            let holders: Vec<&Generation> = generations
                .iter()
                .filter(|g| g.meta.counts.get(field).is_some_and(|&c| c > 0))
                .collect();
            match holders.as_slice() {
                [] => {}
                [only] if !only.meta.tombstone.touches(field) => {
                    counts.insert(field.clone(), only.meta.counts[field]);
                }
                _ => {
                    merged.insert(field.clone());
                }
            }
        }

        if !merged.is_empty() {
            for (field, cells) in merge_columns(&generations, &merged, &all)? {
                let mut count = 0u64;
                for cell in cells {
                    cell?;
                    count += 1;
                }
                if count > 0 {
                    counts.insert(field, count);
                }
            }
        }
        Ok(counts)
    }

    /// Declared type of every live field
    pub fn schema(&self) -> BTreeMap<String, DataType> {
        self.inner.registry.lock().types().clone()
    }

    /// Span of all surviving keys, `None` when the unit holds no cells
    pub fn range(&self) -> Result<Option<KeyRange>> {
        self.ensure_open()?;
        let fields: BTreeSet<String> = self.schema().into_keys().collect();
        let all = RangeSet::all();
        let generations = self.inner.generations(&fields, &all)?;

        let mut span: Option<KeyRange> = None;
        for (_, cells) in merge_columns(&generations, &fields, &all)? {
            let mut first = None;
            let mut last = None;
            for cell in cells {
                let (key, _) = cell?;
                first.get_or_insert(key);
                last = Some(key);
            }
            if let (Some(start), Some(end)) = (first, last) {
                let column = KeyRange { start, end };
                span = Some(span.map_or(column, |s| s.span(&column)));
            }
        }
        Ok(span)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Upsert row-oriented data. Every cell's field must be declared in
    /// `schema` with the cell's type.
    pub fn upsert_rows<I>(&self, rows: I, schema: &BTreeMap<String, DataType>) -> Result<()>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut columns: BTreeMap<String, Vec<(Key, Value)>> = BTreeMap::new();
        for row in rows {
            let key = row.key;
            for (field, value) in row.cells {
                columns.entry(field).or_default().push((key, value));
            }
        }
        self.write(columns, schema)
    }

    /// Upsert column-oriented data
    pub fn upsert_columns<I, C>(&self, columns: I, schema: &BTreeMap<String, DataType>) -> Result<()>
    where
        I: IntoIterator<Item = (String, C)>,
        C: IntoIterator<Item = (Key, Value)>,
    {
        let mut merged: BTreeMap<String, Vec<(Key, Value)>> = BTreeMap::new();
        for (field, cells) in columns {
            merged.entry(field).or_default().extend(cells);
        }
        self.write(merged, schema)
    }

    /// Shared write path
    ///
    /// Steps:
    /// 1. Check every cell against the caller's schema
    /// 2. Declare field types; conflicting fields are dropped from the write
    /// 3. Make room: archive the active buffer if it is full (may block)
    /// 4. Declare again under the schema lock, since a delete may have
    ///    dropped a type while this write was blocked, then append the
    ///    chunks through the conflict resolver
    fn write(
        &self,
        columns: BTreeMap<String, Vec<(Key, Value)>>,
        schema: &BTreeMap<String, DataType>,
    ) -> Result<()> {
        self.ensure_open()?;

        // Step 1: Validate arguments before touching anything
        let mut typed = Vec::with_capacity(columns.len());
        for (field, cells) in columns {
            let data_type = *schema.get(&field).ok_or_else(|| {
                StoreError::InvalidArgument(format!("field {} is missing from the schema", field))
            })?;
            if let Some((key, value)) = cells.iter().find(|(_, v)| v.data_type() != data_type) {
                return Err(StoreError::InvalidArgument(format!(
                    "cell {}@{} is {}, schema declares {}",
                    field,
                    key,
                    value.data_type(),
                    data_type
                )));
            }
            typed.push((field, data_type, cells));
        }

        // Step 2: Declare types
        let chunk_size = self.inner.shared.properties().chunk_size;
        let mut conflict = None;
        let mut chunks = Vec::new();
        {
            let mut registry = self.inner.registry.lock();
            for (field, data_type, cells) in typed {
                match registry.declare(&field, data_type) {
                    Ok(()) => chunks.extend(into_chunks(field, data_type, cells, chunk_size)),
                    Err(e) => {
                        warn!(field = %field, error = %e, "Rejecting cells of conflicting type");
                        conflict.get_or_insert(e);
                    }
                }
            }
        }

        if !chunks.is_empty() {
            // Step 3: Backpressure
            self.make_room()?;

            // Step 4: Re-declare and append
            let _schema = self.inner.schema_lock.read();
            let tables = self.inner.tables.read();
            let chunks = {
                let mut registry = self.inner.registry.lock();
                let mut rejected = BTreeSet::new();
                for chunk in &chunks {
                    if rejected.contains(&chunk.field) {
                        continue;
                    }
                    if let Err(e) = registry.declare(&chunk.field, chunk.data_type) {
                        warn!(
                            field = %chunk.field,
                            error = %e,
                            "Field re-declared with another type while blocked"
                        );
                        rejected.insert(chunk.field.clone());
                        conflict.get_or_insert(e);
                    }
                }
                chunks
                    .into_iter()
                    .filter(|chunk| !rejected.contains(&chunk.field))
                    .collect::<Vec<_>>()
            };
            if !chunks.is_empty() {
                let stats = self.inner.resolver.append(&tables.active, chunks)?;
                trace!(?stats, table = tables.active.id(), "Chunks appended");
            }
        }

        match conflict {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delete every cell covered by `areas` from every generation
    ///
    /// Steps:
    /// 1. Find the persisted tables the deletion can touch
    /// 2. Apply it to the active and archived buffers (in memory)
    /// 3. Record a tombstone against each persisted table found
    pub fn delete(&self, areas: &AreaSet) -> Result<()> {
        self.ensure_open()?;
        if areas.is_empty() {
            return Ok(());
        }
        let _commit = self.inner.commit_lock.read();
        let schema = self.inner.schema_lock.write();

        // Step 1: Candidate tables
        let targets = {
            let mut registry = self.inner.registry.lock();
            let targets = registry.find(areas);
            registry.delete(areas);
            targets
        };

        // Step 2: Buffers, under the table-set lock so no swap interleaves
        let files: Vec<FileTable> = {
            let tables = self.inner.tables.read();
            tables.active.delete(areas);
            for archived in tables.archived.values() {
                archived.delete(areas);
            }
            targets
                .iter()
                .filter_map(|id| tables.persisted.get(id).cloned())
                .collect()
        };
        drop(schema);

        // Step 3: Persisted tombstones
        for file in &files {
            self.inner.read_writer.delete(file.name(), areas)?;
        }
        debug!(tables = files.len(), "Delete applied");
        Ok(())
    }

    /// Drop every generation, tombstone and declared type
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let _commit = self.inner.commit_lock.write();
        let _schema = self.inner.schema_lock.write();

        let (active, archived) = {
            let mut tables = self.inner.tables.write();
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            let fresh = Arc::new(EngineInner::memtable(&self.inner.shared, id));
            tables.persisted.clear();
            (
                std::mem::replace(&mut tables.active, fresh),
                std::mem::take(&mut tables.archived),
            )
        };
        active.close();
        for table in archived.values() {
            table.close();
        }
        self.inner.registry.lock().clear();
        self.inner.read_writer.clear()?;

        info!(dropped_buffers = archived.len(), "Storage unit cleared");
        Ok(())
    }

    // =========================================================================
    // Flush & Lifecycle
    // =========================================================================

    /// Archive the active buffer and wait until every pending generation
    /// is persisted
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.flush_pending()
    }

    fn flush_pending(&self) -> Result<()> {
        // A failed generation holds its permit; archiving would wait forever
        self.check_failures()?;

        if !self.inner.tables.read().active.is_empty() {
            self.archive_active(|active| !active.is_empty())?;
        }

        let pending: Vec<Arc<ArchivedMemTable>> =
            self.inner.tables.read().archived.values().cloned().collect();
        for archived in pending {
            archived.wait_flushed()?;
        }
        Ok(())
    }

    fn check_failures(&self) -> Result<()> {
        let tables = self.inner.tables.read();
        for archived in tables.archived.values() {
            if let Some(reason) = archived.failure() {
                return Err(StoreError::FlushFailed {
                    table: archived.name(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Archive the active buffer if it is full
    fn make_room(&self) -> Result<()> {
        let limit = self.inner.shared.properties().write_buffer_size;
        if self.inner.tables.read().active.estimated_size() >= limit {
            self.archive_active(|active| active.estimated_size() >= limit)?;
        }
        Ok(())
    }

    /// Swap in a fresh buffer and queue the old one for flushing.
    ///
    /// Blocks for a write buffer permit first. `should` is checked again
    /// under the lock, since another writer may have archived meanwhile.
    fn archive_active(&self, should: impl Fn(&MemTable) -> bool) -> Result<()> {
        let shared = &self.inner.shared;
        trace!(available = shared.memtable_permits().available(), "Waiting for write buffer permit");
        let permit = shared
            .memtable_permits()
            .acquire_within(shared.properties().write_timeout)?;

        let archived = {
            let mut tables = self.inner.tables.write();
            if !should(&tables.active) {
                return Ok(());
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
            let fresh = Arc::new(EngineInner::memtable(shared, id));
            let retired = std::mem::replace(&mut tables.active, fresh);
            let release: CloseHook = Box::new(move || drop(permit));
            let archived = Arc::new(ArchivedMemTable::new(retired, vec![release]));
            tables.archived.insert(archived.id(), Arc::clone(&archived));
            archived
        };

        info!(
            table = %archived.name(),
            bytes = archived.table().estimated_size(),
            "Flush triggered"
        );
        match self.flush_tx.lock().as_ref() {
            Some(tx) => tx.send(archived).map_err(|_| StoreError::Closed),
            None => Err(StoreError::Closed),
        }
    }

    /// Close the engine gracefully
    ///
    /// Flushes the active buffer if configured, waits for in-flight
    /// flushes, stops the workers and releases every buffer. Idempotent.
    /// A failed final flush is reported after everything is released.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut result = Ok(());
        if self.inner.shared.properties().flush_on_close {
            if let Err(e) = self.flush_pending() {
                warn!(error = %e, "Final flush failed");
                result = Err(e);
            }
        }
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return result;
        }

        // Workers drain the queue, then see the channel disconnect
        drop(self.flush_tx.lock().take());
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                error!("Flush worker panicked");
            }
        }

        let (active, leftovers) = {
            let mut tables = self.inner.tables.write();
            (
                Arc::clone(&tables.active),
                std::mem::take(&mut tables.archived),
            )
        };
        if !leftovers.is_empty() {
            warn!(count = leftovers.len(), "Closing with unflushed buffers");
        }
        for archived in leftovers.values() {
            archived.close();
        }
        active.close();
        self.inner.shared.close();

        info!("Engine closed");
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Names of persisted tables, oldest first
    pub fn table_names(&self) -> Vec<String> {
        self.inner
            .tables
            .read()
            .persisted
            .values()
            .map(|table| table.name().to_string())
            .collect()
    }

    /// Archived buffers not yet persisted, failed ones included
    pub fn pending_flushes(&self) -> usize {
        self.inner.tables.read().archived.len()
    }

    /// Bytes buffered in the active MemTable
    pub fn active_size(&self) -> usize {
        self.inner.tables.read().active.estimated_size()
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Engine closed with errors on drop");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.inner.tables.read();
        f.debug_struct("Engine")
            .field("active", &tables.active)
            .field("archived", &tables.archived.len())
            .field("persisted", &tables.persisted.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Generations
// =============================================================================

impl EngineInner {
    fn memtable(shared: &Shared, id: u64) -> MemTable {
        MemTable::new(
            id,
            shared.allocator().new_child(format!("memtable-{}", id)),
            shared.properties().chunk_size,
        )
    }

    /// Consistent view of every generation, oldest first.
    ///
    /// Buffers are materialized under the table-set lock; persisted
    /// tables are only referenced there and opened after it is released.
    fn generations(&self, fields: &BTreeSet<String>, ranges: &RangeSet) -> Result<Vec<Generation>> {
        let (files, buffers) = {
            let tables = self.tables.read();
            let files: Vec<(u64, FileTable)> = tables
                .persisted
                .iter()
                .map(|(id, table)| (*id, table.clone()))
                .collect();
            let mut buffers: Vec<_> = tables
                .archived
                .iter()
                .map(|(id, archived)| (*id, archived.table().snapshot_range(fields, ranges, None)))
                .collect();
            buffers.push((
                tables.active.id(),
                tables.active.snapshot_range(fields, ranges, None),
            ));
            (files, buffers)
        };

        let mut generations = Vec::with_capacity(files.len() + buffers.len());
        for (id, file) in files {
            let meta = file.meta()?;
            let relevant = fields.iter().any(|field| {
                meta.ranges.get(field).is_some_and(|span| ranges.intersects(span))
                    && !meta.tombstone.field_deleted(field)
            });
            if !relevant {
                continue;
            }
            let table = Table::deleted(Table::File(file), meta.tombstone.clone());
            generations.push(Generation { id, table, meta });
        }
        for (id, buffer) in buffers {
            if buffer.is_empty() {
                continue;
            }
            let meta = Arc::clone(buffer.meta());
            generations.push(Generation {
                id,
                table: Table::Memory(buffer),
                meta,
            });
        }
        generations.sort_by_key(|g| g.id);
        Ok(generations)
    }
}

fn cell_key(cell: &(Key, Value)) -> Key {
    cell.0
}

/// One key-ordered column per field; on equal keys the newest
/// generation's cell wins
fn merge_columns(
    generations: &[Generation],
    fields: &BTreeSet<String>,
    ranges: &RangeSet,
) -> Result<TableScan> {
    let mut sources: BTreeMap<String, Vec<ColumnScanner>> = BTreeMap::new();
    for generation in generations {
        for (field, column) in generation.table.scan(fields, ranges)? {
            sources.entry(field).or_default().push(column);
        }
    }

    let mut merged = TableScan::new();
    for (field, mut columns) in sources {
        let column: ColumnScanner = if columns.len() == 1 {
            match columns.pop() {
                Some(column) => column,
                None => continue,
            }
        } else {
            let key_fn = cell_key as fn(&(Key, Value)) -> Key;
            Box::new(DedupIterator::new(
                StableMergeIterator::new(columns, key_fn),
                key_fn,
            ))
        };
        merged.insert(field, column);
    }
    Ok(merged)
}

/// Split one field's cells into resolver chunks. Later cells for the
/// same key replace earlier ones.
fn into_chunks(
    field: String,
    data_type: DataType,
    cells: Vec<(Key, Value)>,
    chunk_size: usize,
) -> Vec<ChunkSnapshot> {
    let latest: BTreeMap<Key, Value> = cells.into_iter().collect();
    let cells: Vec<(Key, Value)> = latest.into_iter().collect();
    cells
        .chunks(chunk_size.max(1))
        .map(|chunk| ChunkSnapshot::new(field.clone(), data_type, chunk.to_vec()))
        .collect()
}
