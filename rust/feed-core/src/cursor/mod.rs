// rust/feed-core/src/cursor/mod.rs

//! Row index allocation.
//!
//! Two strategies decide which dataset rows a client reads next:
//!
//! - [`StrideAllocator`]: a closed-form stride over the fleet. Each client
//!   starts at `concurrent_clients * iteration + global_client_index` and
//!   advances one position per row, so clients in the same iteration touch
//!   disjoint rows without talking to anyone.
//! - [`RemoteCursorClient`]: asks the fleet's coordination service, which
//!   owns one authoritative cursor per execution and dataset.
//!
//! Both sit behind [`CursorAllocator`]; a process picks one at start-up via
//! [`Allocator::from_config`] and keeps it for its lifetime.

mod remote;
mod stride;

pub use remote::RemoteCursorClient;
pub use stride::StrideAllocator;

use async_trait::async_trait;

use crate::config::FeedConfig;
use crate::error::Result;

/// A request for the next `rows` indices into one dataset.
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    /// Resource path of the dataset being iterated.
    pub dataset: &'a str,
    /// Number of rows in the dataset.
    pub length: usize,
    /// Batch size.
    pub rows: usize,
    /// Restart at row 0 past the end instead of failing.
    pub wrap: bool,
}

/// Which allocation strategy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    Local,
    Remote,
}

impl std::fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Hands out zero-based row indices.
#[async_trait]
pub trait CursorAllocator: Send + Sync {
    /// Claim the next `request.rows` indices, in order.
    ///
    /// Every returned index is in `[0, request.length)`.
    ///
    /// # Errors
    ///
    /// - `EndOfDataset` when `wrap` is false and the batch would cross the
    ///   end of the dataset. Nothing is claimed in that case.
    /// - `Coordination` when a remote allocation fails.
    async fn allocate(&self, request: &AllocationRequest<'_>) -> Result<Vec<usize>>;

    /// The strategy this allocator implements.
    fn kind(&self) -> AllocatorKind;
}

/// The allocator a process runs with, fixed at construction.
#[derive(Debug)]
pub enum Allocator {
    Local(StrideAllocator),
    Remote(RemoteCursorClient),
}

impl Allocator {
    /// Pick the strategy for this process.
    ///
    /// A configured execution identity selects the coordination service;
    /// otherwise rows are strided locally from the client identity.
    ///
    /// # Errors
    ///
    /// Returns a config error if the remote client cannot be built.
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        match &config.execution {
            Some(execution) => Ok(Self::Remote(RemoteCursorClient::new(
                &config.coordinator,
                execution.clone(),
            )?)),
            None => Ok(Self::Local(StrideAllocator::new(&config.client))),
        }
    }

    /// Reposition for a new pass through the test script.
    ///
    /// Only the local strategy keeps per-process state; the remote cursor is
    /// owned by the service and carries on across iterations.
    pub fn begin_iteration(&self, iteration: u64) {
        if let Self::Local(stride) = self {
            stride.begin_iteration(iteration);
        }
    }
}

#[async_trait]
impl CursorAllocator for Allocator {
    async fn allocate(&self, request: &AllocationRequest<'_>) -> Result<Vec<usize>> {
        match self {
            Self::Local(stride) => stride.allocate(request).await,
            Self::Remote(remote) => remote.allocate(request).await,
        }
    }

    fn kind(&self) -> AllocatorKind {
        match self {
            Self::Local(_) => AllocatorKind::Local,
            Self::Remote(_) => AllocatorKind::Remote,
        }
    }
}

/// Indices for `rows` consecutive cursor positions starting at `position`.
///
/// Each position maps to `position mod length`. Returns `None` when nothing
/// can be claimed: an empty dataset, or `wrap` is false and the last
/// position of the window would reach `length`. The window is all or
/// nothing.
pub fn claim_window(position: u64, rows: usize, length: usize, wrap: bool) -> Option<Vec<usize>> {
    if length == 0 {
        return None;
    }

    let length = length as u64;
    if !wrap {
        let end = position.checked_add(rows as u64)?;
        if end > length {
            return None;
        }
    }

    let base = position % length;
    Some(
        (0..rows as u64)
            .map(|offset| ((base + offset) % length) as usize)
            .collect(),
    )
}
