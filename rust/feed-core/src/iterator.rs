// rust/feed-core/src/iterator.rs

//! The row iterator a test script talks to.
//!
//! `RowIterator` owns one loaded dataset and one allocator, chosen once from
//! configuration, and resolves allocated indices to rows.
//!
//! # Example
//!
//! ```no_run
//! use feed_core::{FeedConfig, RowIterator};
//!
//! # async fn example() -> feed_core::Result<()> {
//! let config = FeedConfig::from_env()?;
//! let users = RowIterator::open(&config, "users.csv")?;
//!
//! // Next row for this client, wrapping past the end
//! let row = users.next_row().await?;
//! println!("logging in as {:?}", row.get("username"));
//!
//! // Three rows at once, failing instead of wrapping
//! let batch = users.next_rows_with(3, false).await?;
//! assert_eq!(batch.len(), 3);
//!
//! // Random and absolute access need no allocator
//! let any = users.random()?;
//! let first = users.get(0)?;
//! # let _ = (any, first);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::config::FeedConfig;
use crate::cursor::{AllocationRequest, Allocator, AllocatorKind, CursorAllocator};
use crate::dataset::{CsvLoader, Dataset, DatasetLoader, Row};
use crate::error::{FeedError, Result};
use crate::events::{sink_from_config, Event, EventSink};
use crate::retry::RetryPolicy;

pub struct RowIterator {
    dataset: Arc<Dataset>,
    allocator: Allocator,
    events: Option<Arc<dyn EventSink>>,
    retry: Option<RetryPolicy>,
}

impl RowIterator {
    pub fn new(dataset: impl Into<Arc<Dataset>>, allocator: Allocator) -> Self {
        Self {
            dataset: dataset.into(),
            allocator,
            events: None,
            retry: None,
        }
    }

    /// Wrap an already loaded dataset, picking the allocator from `config`.
    ///
    /// Failures are reported to the event sink described by
    /// `config.events`.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` is invalid or the remote client
    /// cannot be built, and an event error if the result file cannot be
    /// opened.
    pub fn from_config(config: &FeedConfig, dataset: impl Into<Arc<Dataset>>) -> Result<Self> {
        config.validate()?;
        let allocator = Allocator::from_config(config)?;

        let dataset = dataset.into();
        tracing::info!(
            dataset = dataset.name(),
            rows = dataset.len(),
            strategy = %allocator.kind(),
            "row iterator ready"
        );

        let events = sink_from_config(&config.events)?;
        Ok(Self::new(dataset, allocator).with_events(Arc::from(events)))
    }

    /// Load `path` with the configured loader and build an iterator over it.
    ///
    /// # Errors
    ///
    /// Returns a load error if the dataset cannot be read, or a config error
    /// as for [`RowIterator::from_config`].
    pub fn open(config: &FeedConfig, path: impl AsRef<Path>) -> Result<Self> {
        let loader = CsvLoader::from_config(&config.dataset)?;
        let dataset = loader.load(path.as_ref())?;
        Self::from_config(config, dataset)
    }

    /// Report row failures to `sink` as they happen.
    ///
    /// End of dataset is an expected outcome under the no-wrap policy and is
    /// not reported.
    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Retry transient allocation failures under `policy`.
    ///
    /// Without a policy every allocation is attempted exactly once.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Which allocation strategy this iterator was built with.
    pub fn strategy(&self) -> AllocatorKind {
        self.allocator.kind()
    }

    /// Row at an absolute index.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` if `index` is not in `[0, len)`.
    pub fn get(&self, index: usize) -> Result<&Row> {
        self.dataset
            .row(index)
            .ok_or_else(|| self.report(FeedError::index_out_of_range(index, self.len())))
    }

    /// Row at `index mod len`.
    pub fn get_wrapped(&self, index: usize) -> Result<&Row> {
        if self.is_empty() {
            return Err(self.report(FeedError::index_out_of_range(index, 0)));
        }
        self.get(index % self.len())
    }

    /// A uniformly random row.
    pub fn random(&self) -> Result<&Row> {
        self.random_with(&mut rand::rng())
    }

    /// A uniformly random row drawn from `rng`.
    pub fn random_with<R: Rng>(&self, rng: &mut R) -> Result<&Row> {
        if self.is_empty() {
            return Err(self.report(FeedError::index_out_of_range(0, 0)));
        }
        self.get(rng.random_range(0..self.len()))
    }

    /// Next row for this client, wrapping past the end.
    pub async fn next_row(&self) -> Result<Row> {
        self.next_row_with(true).await
    }

    pub async fn next_row_with(&self, wrap: bool) -> Result<Row> {
        let mut rows = self.next_rows_with(1, wrap).await?;
        rows.pop()
            .ok_or_else(|| FeedError::coordination("allocator returned no index for one row"))
    }

    /// Next `rows` rows for this client, wrapping past the end.
    pub async fn next_rows(&self, rows: usize) -> Result<Vec<Row>> {
        self.next_rows_with(rows, true).await
    }

    /// Next `rows` rows in allocation order.
    ///
    /// A zero-row request returns immediately without touching the
    /// allocator.
    ///
    /// # Errors
    ///
    /// - `EndOfDataset` if `wrap` is false and the batch would run past the
    ///   last row. No rows are consumed.
    /// - `Coordination` if the remote allocation fails, after any retries
    ///   allowed by [`RowIterator::with_retry`].
    pub async fn next_rows_with(&self, rows: usize, wrap: bool) -> Result<Vec<Row>> {
        if rows == 0 {
            return Ok(Vec::new());
        }

        let request = AllocationRequest {
            dataset: self.dataset.name(),
            length: self.len(),
            rows,
            wrap,
        };

        let allocated = match &self.retry {
            Some(policy) => policy.allocate(&self.allocator, &request).await,
            None => self.allocator.allocate(&request).await,
        };
        let indices = allocated.map_err(|e| self.report(e))?;

        indices
            .into_iter()
            .map(|index| self.get(index).cloned())
            .collect()
    }

    /// Start a new pass through the test script.
    ///
    /// Repositions the local cursor to the start of `iteration`; the remote
    /// cursor is owned by the coordination service and is left alone.
    pub fn begin_iteration(&self, iteration: u64) {
        self.allocator.begin_iteration(iteration);
    }

    fn report(&self, error: FeedError) -> FeedError {
        if error.is_end_of_dataset() {
            return error;
        }
        if let Some(sink) = &self.events {
            if let Err(e) = sink.emit(&Event::failure(&error)) {
                tracing::warn!(error = %e, "failed to report row failure");
            }
        }
        error
    }
}

impl std::fmt::Debug for RowIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIterator")
            .field("dataset", &self.dataset.name())
            .field("rows", &self.dataset.len())
            .field("allocator", &self.allocator)
            .field("events", &self.events.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}
