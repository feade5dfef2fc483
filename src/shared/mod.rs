//! Shared Module
//!
//! The resource pool of one storage unit, created once and handed to the
//! engine and its tables by reference.
//!
//! ## Responsibilities
//! - Write buffer permits (backpressure on writers)
//! - Flusher permits (bound on concurrent flushes)
//! - Table metadata cache
//! - Root buffer allocator
//! - Open scanner gauge and pool lifecycle

mod allocator;
mod cache;
mod semaphore;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

pub use allocator::{BufferAllocator, Reservation};
pub use cache::{MetaCache, Weigh};
pub use semaphore::{Latch, Permit, Semaphore};

use crate::config::StorageProperties;
use crate::error::Result;
use crate::table::TableMeta;

pub struct Shared {
    properties: StorageProperties,
    memtable_permits: Arc<Semaphore>,
    flusher_permits: Arc<Semaphore>,
    cache: MetaCache<TableMeta>,
    allocator: BufferAllocator,
    open_scanners: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl Shared {
    pub fn new(properties: StorageProperties) -> Result<Arc<Self>> {
        properties.validate()?;
        debug!(?properties, "Creating shared resource pool");
        Ok(Arc::new(Self {
            memtable_permits: Semaphore::new("write buffer", properties.write_buffer_permits),
            flusher_permits: Semaphore::new("flusher", properties.compact_permits),
            cache: MetaCache::new(properties.cache_capacity),
            allocator: BufferAllocator::root("shared"),
            open_scanners: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
            properties,
        }))
    }

    pub fn properties(&self) -> &StorageProperties {
        &self.properties
    }

    pub fn memtable_permits(&self) -> &Arc<Semaphore> {
        &self.memtable_permits
    }

    pub fn flusher_permits(&self) -> &Arc<Semaphore> {
        &self.flusher_permits
    }

    pub fn cache(&self) -> &MetaCache<TableMeta> {
        &self.cache
    }

    pub fn allocator(&self) -> &BufferAllocator {
        &self.allocator
    }

    /// Number of query scanners not yet closed
    pub fn open_scanners(&self) -> usize {
        self.open_scanners.load(Ordering::Acquire)
    }

    /// Register an open scanner; the returned callback unregisters it
    pub(crate) fn track_scanner(&self) -> impl FnOnce() + Send + 'static {
        self.open_scanners.fetch_add(1, Ordering::AcqRel);
        let gauge = Arc::clone(&self.open_scanners);
        move || {
            gauge.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Release the pool. Call only after every table and buffer built
    /// on it is closed; leftovers are reported, never fatal.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let leaked = self.allocator.allocated();
        if leaked > 0 {
            warn!(bytes = leaked, "Closing shared pool with buffers still allocated");
        }
        let scanners = self.open_scanners();
        if scanners > 0 {
            warn!(scanners, "Closing shared pool with scanners still open");
        }
        self.cache.clear();
        debug!("Shared resource pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("properties", &self.properties)
            .field("memtable_permits", &self.memtable_permits)
            .field("flusher_permits", &self.flusher_permits)
            .field("allocated", &self.allocator.allocated())
            .field("closed", &self.is_closed())
            .finish()
    }
}
