//! Blocking synchronization primitives built on parking_lot
//!
//! - [`Semaphore`] with owned [`Permit`] guards, the backpressure mechanism
//! - [`Latch`], a one-shot release signal that can also report failure

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::{Result, StoreError};

// =============================================================================
// Semaphore
// =============================================================================

/// Counting semaphore. Permits are owned guards that may move across
/// threads and are returned when dropped.
pub struct Semaphore {
    name: &'static str,
    capacity: usize,
    available: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(name: &'static str, permits: usize) -> Arc<Self> {
        Arc::new(Self {
            name,
            capacity: permits,
            available: Mutex::new(permits),
            cond: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Block until a permit is free
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self.available.lock();
        while *available == 0 {
            trace!(semaphore = self.name, "Waiting for permit");
            self.cond.wait(&mut available);
        }
        *available -= 1;
        Permit::new(Arc::clone(self))
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit::new(Arc::clone(self)))
    }

    /// Block for at most `timeout`; expiry is a retryable `Timeout` error
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Result<Permit> {
        let deadline = Instant::now() + timeout;
        let mut available = self.available.lock();
        while *available == 0 {
            trace!(semaphore = self.name, "Waiting for permit");
            if self.cond.wait_until(&mut available, deadline).timed_out() && *available == 0 {
                return Err(StoreError::Timeout(format!(
                    "no {} permit within {:?}",
                    self.name, timeout
                )));
            }
        }
        *available -= 1;
        Ok(Permit::new(Arc::clone(self)))
    }

    /// `acquire` or `acquire_timeout` depending on the configured bound
    pub fn acquire_within(self: &Arc<Self>, timeout: Option<Duration>) -> Result<Permit> {
        match timeout {
            Some(timeout) => self.acquire_timeout(timeout),
            None => Ok(self.acquire()),
        }
    }

    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        self.cond.notify_one();
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// One unit of a [`Semaphore`], returned on drop
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Permit {
    fn new(semaphore: Arc<Semaphore>) -> Self {
        Self { semaphore }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("semaphore", &self.semaphore.name)
            .finish()
    }
}

// =============================================================================
// Latch
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum LatchState {
    Open,
    Failed(String),
    Released,
}

/// One-shot signal. Waiters block until it is released; a failure wakes
/// the waiters that asked to hear about it but does not release the latch.
#[derive(Debug)]
pub struct Latch {
    state: Mutex<LatchState>,
    cond: Condvar,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LatchState::Open),
            cond: Condvar::new(),
        }
    }

    /// Returns true for the call that actually released it
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LatchState::Released {
            return false;
        }
        *state = LatchState::Released;
        self.cond.notify_all();
        true
    }

    /// Record a failure; ignored once released
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if *state != LatchState::Released {
            *state = LatchState::Failed(reason.into());
            self.cond.notify_all();
        }
    }

    pub fn is_released(&self) -> bool {
        *self.state.lock() == LatchState::Released
    }

    pub fn failure(&self) -> Option<String> {
        match &*self.state.lock() {
            LatchState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Block until released
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while *state != LatchState::Released {
            self.cond.wait(&mut state);
        }
    }

    /// Block until released; false on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state != LatchState::Released {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return *state == LatchState::Released;
            }
        }
        true
    }

    /// Block until released or failed
    pub fn wait_settled(&self) -> std::result::Result<(), String> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                LatchState::Released => return Ok(()),
                LatchState::Failed(reason) => return Err(reason.clone()),
                LatchState::Open => self.cond.wait(&mut state),
            }
        }
    }
}
