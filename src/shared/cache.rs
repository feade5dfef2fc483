//! Weighted metadata cache keyed by file path, backed by moka

use std::path::{Path, PathBuf};
use std::sync::Arc;

use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Result, StoreError};

/// Approximate retained size of a cached value
pub trait Weigh {
    fn weight(&self) -> usize;
}

pub struct MetaCache<V> {
    entries: Cache<PathBuf, Arc<V>>,
    /// Loads on a miss and explicit updates take turns, so a load that
    /// read the files before an update can never land after it
    update_lock: Mutex<()>,
}

impl<V> MetaCache<V>
where
    V: Weigh + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity as u64)
            .weigher(|_path: &PathBuf, value: &Arc<V>| {
                u32::try_from(value.weight()).unwrap_or(u32::MAX)
            })
            .build();
        Self {
            entries,
            update_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, path: &Path) -> Option<Arc<V>> {
        self.entries.get(path)
    }

    /// Cached value, or the loader's result which is then cached.
    /// Concurrent misses on one path share a single load.
    pub fn get_or_load<F>(&self, path: &Path, loader: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.entries.get(path) {
            return Ok(value);
        }
        let _update = self.update_lock.lock();
        trace!(path = %path.display(), "Cache miss");
        self.entries
            .try_get_with(path.to_path_buf(), || loader().map(Arc::new))
            .map_err(StoreError::from)
    }

    /// Insert or replace
    pub fn refresh(&self, path: &Path, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let _update = self.update_lock.lock();
        self.entries.insert(path.to_path_buf(), Arc::clone(&value));
        value
    }

    pub fn invalidate(&self, path: &Path) {
        let _update = self.update_lock.lock();
        self.entries.invalidate(path);
    }

    pub fn clear(&self) {
        let _update = self.update_lock.lock();
        self.entries.invalidate_all();
    }
}
