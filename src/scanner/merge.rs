//! Stable k-way merge and last-wins deduplication

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Result, StoreError};

struct HeapEntry<I, T, K> {
    key: K,
    item: T,
    source: usize,
    iter: I,
}

impl<I, T, K: Ord> PartialEq for HeapEntry<I, T, K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl<I, T, K: Ord> Eq for HeapEntry<I, T, K> {}

impl<I, T, K: Ord> PartialOrd for HeapEntry<I, T, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I, T, K: Ord> Ord for HeapEntry<I, T, K> {
    // BinaryHeap is a max-heap: smallest key first, then lowest source
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

enum MergeState<I> {
    Pending(Vec<I>),
    Running,
}

/// Merges sorted sources into one sorted stream.
///
/// Ties are emitted in source order: the element from the source given
/// first comes out first. Feed generations oldest to newest and follow
/// with [`DedupIterator`] to make the newest one win.
pub struct StableMergeIterator<I, T, K, F>
where
    K: Ord,
{
    state: MergeState<I>,
    heap: BinaryHeap<HeapEntry<I, T, K>>,
    key_fn: F,
    failed: Option<StoreError>,
}

impl<I, T, K, F> StableMergeIterator<I, T, K, F>
where
    I: Iterator<Item = Result<T>>,
    K: Ord,
    F: Fn(&T) -> K,
{
    pub fn new(sources: Vec<I>, key_fn: F) -> Self {
        Self {
            state: MergeState::Pending(sources),
            heap: BinaryHeap::new(),
            key_fn,
            failed: None,
        }
    }

    /// Pull the next head of `iter` into the heap
    fn advance(&mut self, mut iter: I, source: usize) -> Result<()> {
        match iter.next() {
            Some(Ok(item)) => {
                let key = (self.key_fn)(&item);
                self.heap.push(HeapEntry {
                    key,
                    item,
                    source,
                    iter,
                });
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Ok(()),
        }
    }

    fn prime(&mut self) -> Result<()> {
        if let MergeState::Pending(sources) = std::mem::replace(&mut self.state, MergeState::Running)
        {
            for (source, iter) in sources.into_iter().enumerate() {
                self.advance(iter, source)?;
            }
        }
        Ok(())
    }
}

impl<I, T, K, F> Iterator for StableMergeIterator<I, T, K, F>
where
    I: Iterator<Item = Result<T>>,
    K: Ord,
    F: Fn(&T) -> K,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.failed.take() {
            self.heap.clear();
            return Some(Err(e));
        }
        if let Err(e) = self.prime() {
            self.heap.clear();
            return Some(Err(e));
        }

        let HeapEntry {
            item, source, iter, ..
        } = self.heap.pop()?;
        if let Err(e) = self.advance(iter, source) {
            // Hand out the item we already hold, fail on the next call
            self.failed = Some(e);
        }
        Some(Ok(item))
    }
}

/// Collapses runs of equal keys, keeping the last element of each run
pub struct DedupIterator<I, T, K, F> {
    inner: I,
    key_fn: F,
    pending: Option<(K, T)>,
}

impl<I, T, K, F> DedupIterator<I, T, K, F>
where
    I: Iterator<Item = Result<T>>,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    pub fn new(inner: I, key_fn: F) -> Self {
        Self {
            inner,
            key_fn,
            pending: None,
        }
    }
}

impl<I, T, K, F> Iterator for DedupIterator<I, T, K, F>
where
    I: Iterator<Item = Result<T>>,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next() {
                Some(Ok(item)) => {
                    let key = (self.key_fn)(&item);
                    match self.pending.take() {
                        Some((pending_key, _)) if pending_key == key => {
                            self.pending = Some((key, item));
                        }
                        Some((_, previous)) => {
                            self.pending = Some((key, item));
                            return Some(Ok(previous));
                        }
                        None => self.pending = Some((key, item)),
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => return self.pending.take().map(|(_, item)| Ok(item)),
            }
        }
    }
}
