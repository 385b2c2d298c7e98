// rust/feed-core/src/retry.rs

//! Opt-in retry of row allocation.
//!
//! A [`RowIterator`](crate::RowIterator) built with
//! [`with_retry`](crate::RowIterator::with_retry) asks its allocator again
//! when the coordination service is briefly unreachable or overloaded.
//! Only [`is_retryable`](crate::FeedError::is_retryable) failures are
//! retried. Running off the end of a dataset and protocol violations come
//! back on the first attempt.

use std::time::Duration;

use rand::Rng;

use crate::cursor::{AllocationRequest, CursorAllocator};
use crate::error::Result;

/// How many times to ask for a batch, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total allocation attempts, including the first. Zero acts as one.
    pub max_attempts: u32,
    /// Backoff ceiling before the first retry; doubles per retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Wait before retry number `retry` (0 for the first retry).
    ///
    /// Full jitter: a uniform draw from zero up to
    /// `min(max_delay, base_delay * 2^retry)`, so clients that failed
    /// together do not come back together.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let ceiling = base.saturating_mul(1u64 << retry.min(16)).min(max);

        Duration::from_millis(rand::rng().random_range(0..=ceiling))
    }

    /// Allocate `request` from `allocator`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last retryable one
    /// unchanged once every attempt is used.
    pub async fn allocate<A>(
        &self,
        allocator: &A,
        request: &AllocationRequest<'_>,
    ) -> Result<Vec<usize>>
    where
        A: CursorAllocator + ?Sized,
    {
        let attempts = self.max_attempts.max(1);
        let mut retry = 0;

        loop {
            match allocator.allocate(request).await {
                Err(e) if e.is_retryable() && retry + 1 < attempts => {
                    let delay = self.backoff(retry);
                    tracing::warn!(
                        dataset = request.dataset,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "row allocation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) if e.is_retryable() && retry > 0 => {
                    tracing::warn!(
                        dataset = request.dataset,
                        attempts,
                        error = %e,
                        "row allocation failed, giving up"
                    );
                    return Err(e);
                }
                result => return result,
            }
        }
    }
}
