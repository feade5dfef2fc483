//! Configuration for unitstore
//!
//! Centralized storage properties with sensible defaults.

use std::time::Duration;

use crate::error::{Result, StoreError};

/// Resource configuration consumed by [`crate::shared::Shared`] and every
/// engine built on top of it
#[derive(Debug, Clone)]
pub struct StorageProperties {
    // -------------------------------------------------------------------------
    // Write Buffer Configuration
    // -------------------------------------------------------------------------
    /// Bytes buffered in the active MemTable before it is archived
    pub write_buffer_size: usize,

    /// Max number of archived, flush-pending MemTables at once.
    /// Exhausting these permits is the only backpressure on writers.
    pub write_buffer_permits: usize,

    /// Max values per in-memory chunk; also the insert batch size
    pub chunk_size: usize,

    /// Bound on how long a writer waits for a write buffer permit
    pub write_timeout: Option<Duration>,

    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Max number of concurrent flush tasks (and flush worker threads)
    pub compact_permits: usize,

    /// Flush the active MemTable when the engine is closed
    pub flush_on_close: bool,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// The conflict resolver falls back to blocking appends once
    /// `blocked > blocking_threshold * attempted`
    pub blocking_threshold: f64,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Weighted capacity (bytes) of the table metadata cache
    pub cache_capacity: usize,
}

impl Default for StorageProperties {
    fn default() -> Self {
        Self {
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            write_buffer_permits: 2,
            chunk_size: 1024,
            write_timeout: None,
            compact_permits: 2,
            flush_on_close: true,
            blocking_threshold: 0.5,
            cache_capacity: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl StorageProperties {
    /// Create a new properties builder
    pub fn builder() -> StoragePropertiesBuilder {
        StoragePropertiesBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_permits == 0 {
            return Err(StoreError::Config(
                "write_buffer_permits must be at least 1".to_string(),
            ));
        }
        if self.compact_permits == 0 {
            return Err(StoreError::Config(
                "compact_permits must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(StoreError::Config("chunk_size must be at least 1".to_string()));
        }
        if !(self.blocking_threshold > 0.0 && self.blocking_threshold <= 1.0) {
            return Err(StoreError::Config(format!(
                "blocking_threshold must be in (0, 1], got {}",
                self.blocking_threshold
            )));
        }
        Ok(())
    }
}

/// Builder for StorageProperties
#[derive(Default)]
pub struct StoragePropertiesBuilder {
    properties: StorageProperties,
}

impl StoragePropertiesBuilder {
    /// Set the write buffer size (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.properties.write_buffer_size = size;
        self
    }

    /// Set the number of flush-pending write buffers allowed at once
    pub fn write_buffer_permits(mut self, permits: usize) -> Self {
        self.properties.write_buffer_permits = permits;
        self
    }

    /// Set the number of values per in-memory chunk
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.properties.chunk_size = size;
        self
    }

    /// Bound the backpressure wait of writers
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.properties.write_timeout = Some(timeout);
        self
    }

    /// Set the number of concurrent flush tasks
    pub fn compact_permits(mut self, permits: usize) -> Self {
        self.properties.compact_permits = permits;
        self
    }

    /// Whether closing an engine flushes its active buffer
    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.properties.flush_on_close = flush;
        self
    }

    /// Set the contention ratio of the conflict resolver
    pub fn blocking_threshold(mut self, ratio: f64) -> Self {
        self.properties.blocking_threshold = ratio;
        self
    }

    /// Set the metadata cache capacity (in bytes)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.properties.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<StorageProperties> {
        self.properties.validate()?;
        Ok(self.properties)
    }
}
