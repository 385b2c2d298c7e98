// rust/feed-core/src/lib.rs

//! Row Feed - Core Library
//!
//! Hands out fixture rows to load-test clients. Each client reads rows from a
//! shared dataset; this crate decides which row it reads next, either with a
//! local stride over the fleet or by asking a central coordination service,
//! so the fleet covers the dataset evenly.

pub mod config;
pub mod error;
pub mod events;
pub mod retry;

// Re-export commonly used types for convenience
pub use config::FeedConfig;
pub use error::{ErrorKind, FeedError, Result};
pub use events::{ConsoleSink, Event, EventSink, JsonLinesSink, LogLevel};
pub use retry::RetryPolicy;

pub mod cursor;
pub use cursor::{
    claim_window, AllocationRequest, Allocator, AllocatorKind, CursorAllocator,
    RemoteCursorClient, StrideAllocator,
};

pub mod dataset;
pub use dataset::{dataset_token, CsvLoader, Dataset, DatasetLoader, Row};

pub mod iterator;
pub use iterator::RowIterator;
