//! Concurrency bound and start-interval throttling
//!
//! All shared counters live in one [`RateLimiterState`] behind a
//! `std::sync::Mutex` that is never held across an `.await`. The semaphore
//! bounding in-flight processes is acquired outside that lock.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::error::{GuardError, Result};

/// Mutable scheduler state shared by every call on one executor
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    pub last_operation_start: Option<Instant>,
    pub current_concurrent: usize,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub rate_limited_operations: u64,
    pub force_flag_violations: u64,
    pub max_concurrent_seen: usize,
    /// Configured interval, unaffected by batch mode
    pub base_interval: Duration,
    /// Open batch-mode scopes
    pub batch_depth: u32,
}

impl RateLimiterState {
    const fn new(base_interval: Duration) -> Self {
        Self {
            last_operation_start: None,
            current_concurrent: 0,
            total_operations: 0,
            failed_operations: 0,
            rate_limited_operations: 0,
            force_flag_violations: 0,
            max_concurrent_seen: 0,
            base_interval,
            batch_depth: 0,
        }
    }

    /// Interval in effect: the base halved once per open batch scope
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.base_interval / 2u32.saturating_pow(self.batch_depth)
    }
}

/// Semaphore-bounded, interval-throttled scheduler
pub struct RateLimiter {
    state: Mutex<RateLimiterState>,
    semaphore: Semaphore,
    max_concurrent: usize,
}

/// An attempt holding one concurrency slot. Releases it on drop.
pub struct InFlight<'a> {
    limiter: &'a RateLimiter,
    _permit: SemaphorePermit<'a>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.limiter.lock();
        state.current_concurrent = state.current_concurrent.saturating_sub(1);
    }
}

impl RateLimiter {
    /// Create a limiter. `max_concurrent` is clamped to at least 1.
    #[must_use]
    pub fn new(min_interval: Duration, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            state: Mutex::new(RateLimiterState::new(min_interval)),
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimiterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait for a concurrency slot
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Cancelled`] if the semaphore was closed.
    pub async fn acquire_slot(&self) -> Result<InFlight<'_>> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| GuardError::Cancelled)?;

        let mut state = self.lock();
        state.current_concurrent += 1;
        state.max_concurrent_seen = state.max_concurrent_seen.max(state.current_concurrent);
        drop(state);

        Ok(InFlight {
            limiter: self,
            _permit: permit,
        })
    }

    /// Reserve the next start slot.
    ///
    /// Returns the instant at which the caller may start. Slots are handed
    /// out at least `min_interval` apart, so concurrent callers never start
    /// closer together than that.
    pub fn reserve_start(&self) -> Instant {
        let now = Instant::now();
        let mut state = self.lock();
        let start = state
            .last_operation_start
            .map_or(now, |last| now.max(last + state.min_interval()));
        state.last_operation_start = Some(start);
        start
    }

    pub fn record_operation(&self) {
        self.lock().total_operations += 1;
    }

    pub fn record_failure(&self) {
        self.lock().failed_operations += 1;
    }

    pub fn record_rate_limited(&self) {
        self.lock().rate_limited_operations += 1;
    }

    pub fn record_violation(&self) {
        self.lock().force_flag_violations += 1;
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.lock().min_interval()
    }

    /// Open a batch scope and return the interval now in effect
    pub fn enter_batch(&self) -> Duration {
        let mut state = self.lock();
        state.batch_depth = state.batch_depth.saturating_add(1);
        state.min_interval()
    }

    /// Close a batch scope and return the interval now in effect
    pub fn exit_batch(&self) -> Duration {
        let mut state = self.lock();
        state.batch_depth = state.batch_depth.saturating_sub(1);
        state.min_interval()
    }

    /// Consistent copy of the state
    #[must_use]
    pub fn snapshot(&self) -> RateLimiterState {
        self.lock().clone()
    }

    /// Clear the counters. The interval, open batch scopes and in-flight
    /// count are kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        let current = state.current_concurrent;
        let depth = state.batch_depth;
        *state = RateLimiterState::new(state.base_interval);
        state.current_concurrent = current;
        state.max_concurrent_seen = current;
        state.batch_depth = depth;
    }
}
