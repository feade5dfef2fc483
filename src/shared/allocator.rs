//! Hierarchical buffer accounting.
//!
//! Every MemTable generation draws from its own child of the root
//! allocator. Bytes are tracked by [`Reservation`] guards and released
//! along the whole parent chain when a guard drops.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct AllocatorNode {
    name: String,
    allocated: AtomicUsize,
    peak: AtomicUsize,
    parent: Option<Arc<AllocatorNode>>,
}

impl AllocatorNode {
    fn grow(&self, bytes: usize) {
        let mut node = Some(self);
        while let Some(current) = node {
            let now = current.allocated.fetch_add(bytes, Ordering::AcqRel) + bytes;
            current.peak.fetch_max(now, Ordering::AcqRel);
            node = current.parent.as_deref();
        }
    }

    fn shrink(&self, bytes: usize) {
        let mut node = Some(self);
        while let Some(current) = node {
            current.allocated.fetch_sub(bytes, Ordering::AcqRel);
            node = current.parent.as_deref();
        }
    }
}

/// Cloneable handle onto one node of the allocator tree
#[derive(Clone)]
pub struct BufferAllocator {
    node: Arc<AllocatorNode>,
}

impl BufferAllocator {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            node: Arc::new(AllocatorNode {
                name: name.into(),
                allocated: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                parent: None,
            }),
        }
    }

    pub fn new_child(&self, name: impl Into<String>) -> Self {
        Self {
            node: Arc::new(AllocatorNode {
                name: format!("{}/{}", self.node.name, name.into()),
                allocated: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                parent: Some(Arc::clone(&self.node)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Bytes currently reserved through this node and its descendants
    pub fn allocated(&self) -> usize {
        self.node.allocated.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.node.peak.load(Ordering::Acquire)
    }

    pub fn reserve(&self, bytes: usize) -> Reservation {
        self.node.grow(bytes);
        Reservation {
            node: Arc::clone(&self.node),
            bytes,
        }
    }
}

impl fmt::Debug for BufferAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferAllocator")
            .field("name", &self.node.name)
            .field("allocated", &self.allocated())
            .finish()
    }
}

/// Bytes held against an allocator until dropped
pub struct Reservation {
    node: Arc<AllocatorNode>,
    bytes: usize,
}

impl Reservation {
    pub fn size(&self) -> usize {
        self.bytes
    }

    pub fn grow(&mut self, bytes: usize) {
        self.node.grow(bytes);
        self.bytes += bytes;
    }

    /// Give back part of the reservation early
    pub fn shrink(&mut self, bytes: usize) {
        let bytes = bytes.min(self.bytes);
        self.node.shrink(bytes);
        self.bytes -= bytes;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.node.shrink(self.bytes);
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("allocator", &self.node.name)
            .field("bytes", &self.bytes)
            .finish()
    }
}
