// rust/feed-core/src/cursor/stride.rs

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::config::ClientIdentity;
use crate::error::{FeedError, Result};

use super::{claim_window, AllocationRequest, AllocatorKind, CursorAllocator};

/// Local, network-free allocator striding the fleet by client count.
///
/// The cursor starts at `concurrent_clients * iteration + global_client_index`
/// and moves forward by one per delivered row. Reads and increments of the
/// cursor happen under one lock per call, so concurrent callers in the same
/// process never see a duplicate or a gap.
#[derive(Debug)]
pub struct StrideAllocator {
    cursor: Mutex<Stride>,
}

// Client slot and cursor position change together on reseed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stride {
    global_client_index: u64,
    concurrent_clients: u64,
    position: u64,
}

impl Stride {
    fn new(identity: &ClientIdentity, position: u64) -> Self {
        Self {
            global_client_index: identity.global_client_index,
            concurrent_clients: identity.concurrent_clients,
            position,
        }
    }

    fn start_of(&self, iteration: u64) -> u64 {
        self.concurrent_clients
            .wrapping_mul(iteration)
            .wrapping_add(self.global_client_index)
    }
}

impl StrideAllocator {
    pub fn new(identity: &ClientIdentity) -> Self {
        Self::at_position(identity, Self::start_position(identity))
    }

    /// Start from an explicit cursor position.
    pub fn at_position(identity: &ClientIdentity, position: u64) -> Self {
        Self {
            cursor: Mutex::new(Stride::new(identity, position)),
        }
    }

    /// First cursor position for an identity.
    pub fn start_position(identity: &ClientIdentity) -> u64 {
        Stride::new(identity, 0).start_of(identity.iteration)
    }

    /// Next cursor position to be handed out.
    pub fn position(&self) -> u64 {
        self.lock().position
    }

    /// Adopt `identity` and move the cursor to its start position.
    ///
    /// Later calls to [`StrideAllocator::begin_iteration`] stride with the
    /// new client index and client count.
    pub fn reseed(&self, identity: &ClientIdentity) {
        let stride = Stride::new(identity, Self::start_position(identity));
        *self.lock() = stride;
        tracing::debug!(
            global_client_index = stride.global_client_index,
            concurrent_clients = stride.concurrent_clients,
            position = stride.position,
            "stride cursor reseeded"
        );
    }

    /// Reset the cursor to the start of `iteration` for this client.
    pub fn begin_iteration(&self, iteration: u64) {
        let mut stride = self.lock();
        stride.position = stride.start_of(iteration);
        tracing::debug!(
            iteration,
            position = stride.position,
            "stride cursor moved to iteration start"
        );
    }

    // A panic in another caller cannot leave the cursor half-written.
    fn lock(&self) -> MutexGuard<'_, Stride> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CursorAllocator for StrideAllocator {
    async fn allocate(&self, request: &AllocationRequest<'_>) -> Result<Vec<usize>> {
        let mut stride = self.lock();
        let position = stride.position;

        let indices = claim_window(position, request.rows, request.length, request.wrap)
            .ok_or_else(|| {
                FeedError::end_of_dataset(
                    request.dataset,
                    request.rows,
                    Some(position),
                    request.length,
                )
            })?;

        tracing::debug!(
            dataset = request.dataset,
            position,
            rows = request.rows,
            wrap = request.wrap,
            "allocated local rows"
        );

        stride.position = position.wrapping_add(request.rows as u64);
        Ok(indices)
    }

    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Local
    }
}
