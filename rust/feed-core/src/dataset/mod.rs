// rust/feed-core/src/dataset/mod.rs

//! Fixture datasets.
//!
//! A dataset is an immutable, zero-indexed table of rows loaded once per
//! process from a delimited text file whose first record is the header.
//! Rows are handed out by index; which index a client reads next is the job
//! of the [`cursor`](crate::cursor) allocators.
//!
//! # Example
//!
//! ```no_run
//! use feed_core::dataset::{CsvLoader, DatasetLoader};
//! use std::path::Path;
//!
//! let loader = CsvLoader::new("fixtures");
//! let dataset = loader.load(Path::new("users.csv")).unwrap();
//!
//! for row in dataset.rows() {
//!     println!("{:?}", row.get("username"));
//! }
//! ```

mod loader;
mod row;

pub use loader::{CsvLoader, DatasetLoader};
pub use row::{dataset_token, Dataset, Row};
