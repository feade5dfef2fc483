//! Conflict resolution for concurrent chunk appends.
//!
//! `RecursiveTryLockResolver` first tries every chunk without waiting and
//! retries only the ones whose column was busy. While contention stays
//! low the retry set keeps shrinking; once too large a share is blocked
//! (or a round makes no progress) the rest is shuffled and appended with
//! blocking locks.

use rand::seq::SliceRandom;
use tracing::trace;

use super::{AppendOutcome, ChunkSnapshot, MemTable};
use crate::error::Result;

/// How a batch of chunks made it into the table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStats {
    /// Try-lock rounds run
    pub rounds: usize,
    /// Chunks appended by a successful try-lock
    pub optimistic: usize,
    /// Chunks appended by the blocking fallback
    pub blocking: usize,
}

impl AppendStats {
    pub fn appended(&self) -> usize {
        self.optimistic + self.blocking
    }
}

pub trait ConflictResolver: Send + Sync {
    /// Append every chunk exactly once
    fn append(&self, table: &MemTable, chunks: Vec<ChunkSnapshot>) -> Result<AppendStats>;
}

#[derive(Debug, Clone, Copy)]
pub struct RecursiveTryLockResolver {
    /// Fall back to blocking once `blocked > threshold * attempted`
    threshold: f64,
}

impl RecursiveTryLockResolver {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for RecursiveTryLockResolver {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl ConflictResolver for RecursiveTryLockResolver {
    fn append(&self, table: &MemTable, chunks: Vec<ChunkSnapshot>) -> Result<AppendStats> {
        let mut stats = AppendStats::default();
        let mut working = chunks;

        while !working.is_empty() {
            stats.rounds += 1;
            let attempted = working.len();
            let mut blocked = Vec::new();
            for chunk in working {
                match table.try_append(&chunk)? {
                    AppendOutcome::Appended => stats.optimistic += 1,
                    AppendOutcome::Blocked => blocked.push(chunk),
                }
            }

            let contended = blocked.len() as f64 > self.threshold * attempted as f64;
            if contended || blocked.len() == attempted {
                trace!(
                    blocked = blocked.len(),
                    attempted,
                    "Falling back to blocking append"
                );
                blocked.shuffle(&mut rand::thread_rng());
                for chunk in &blocked {
                    table.append(chunk)?;
                    stats.blocking += 1;
                }
                break;
            }
            working = blocked;
        }

        Ok(stats)
    }
}
