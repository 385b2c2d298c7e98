// rust/feed-core/src/error.rs

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {

    #[error("Failed to load dataset '{path}': {message}")]
    Load {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("End of dataset '{dataset}': {requested} row(s) requested past the last row (length {length})")]
    EndOfDataset {
        dataset: String,
        requested: usize,
        /// Local cursor position at the time of the request; unknown for
        /// the remote strategy.
        position: Option<u64>,
        length: usize,
    },

    #[error("Coordination error: {message}")]
    Coordination {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Row index {index} out of range (dataset length: {length})")]
    IndexOutOfRange {
        index: usize,
        length: usize,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Event sink error: {message}")]
    Event {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

pub type Result<T> = std::result::Result<T, FeedError>;

/// Distinguishable failure category, suitable for structured reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Load,
    EndOfDataset,
    Coordination,
    IndexOutOfRange,
    Config,
    Event,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "Load",
            Self::EndOfDataset => "EndOfDataset",
            Self::Coordination => "Coordination",
            Self::IndexOutOfRange => "IndexOutOfRange",
            Self::Config => "Config",
            Self::Event => "Event",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Convenience constructors
impl FeedError {

    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn load_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn end_of_dataset(
        dataset: impl Into<String>,
        requested: usize,
        position: Option<u64>,
        length: usize,
    ) -> Self {
        Self::EndOfDataset {
            dataset: dataset.into(),
            requested,
            position,
            length,
        }
    }

    pub fn coordination(message: impl Into<String>) -> Self {
        Self::Coordination {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn coordination_status(message: impl Into<String>, status: u16) -> Self {
        Self::Coordination {
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    pub fn coordination_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Coordination {
            message: message.into(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    pub fn index_out_of_range(index: usize, length: usize) -> Self {
        Self::IndexOutOfRange { index, length }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn event_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Event {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Load { .. } => ErrorKind::Load,
            Self::EndOfDataset { .. } => ErrorKind::EndOfDataset,
            Self::Coordination { .. } => ErrorKind::Coordination,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::Config { .. } => ErrorKind::Config,
            Self::Event { .. } => ErrorKind::Event,
        }
    }

    /// True when the dataset was exhausted under a no-wrap policy.
    pub fn is_end_of_dataset(&self) -> bool {
        matches!(self, Self::EndOfDataset { .. })
    }

    /// True for coordination failures that may succeed on a later attempt:
    /// transport failures (no status) and 5xx / 429 responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Coordination { status: None, source, .. } => source.is_some(),
            Self::Coordination { status: Some(status), .. } => {
                *status >= 500 || *status == 429
            }
            _ => false,
        }
    }
}
