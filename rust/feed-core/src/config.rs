// rust/feed-core/src/config.rs

//! Process configuration for the row feed.
//!
//! Configuration is read once at process start (TOML file and/or `FEED_*`
//! environment variables), validated, and then handed to the row iterator by
//! value. Nothing downstream reads the environment on its own.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{FeedError, Result};

// Top-level feed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub coordinator: CoordinatorConfig,
    /// Distributed execution identity; absent when running locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionIdentity>,
    pub client: ClientIdentity,
    pub dataset: DatasetConfig,
    pub events: EventsConfig,
}

/// Connection settings for the fleet-wide coordination service.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Base URL of the coordination service (e.g. "https://agent.example.com").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Authentication key sent as the `key` query parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            key: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

// The key never shows up in logs.
impl std::fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("base_url", &self.base_url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Identity of the distributed test execution this process belongs to.
///
/// Its presence switches the row iterator to the remote cursor strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIdentity {
    pub execution_id: u64,
    pub chunk_id: u64,
}

/// Static identity of this client within the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    /// Unique index in `[0, concurrent_clients)` across all regions.
    pub global_client_index: u64,
    /// Index within this client's region.
    pub regional_client_index: u64,
    /// Pass number through the test script, starting at 0.
    pub iteration: u64,
    /// Fleet-wide number of concurrently running clients.
    pub concurrent_clients: u64,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            global_client_index: 0,
            regional_client_index: 0,
            iteration: 0,
            concurrent_clients: 1,
        }
    }
}

impl ClientIdentity {
    /// Identity for a given iteration, everything else unchanged.
    #[must_use]
    pub fn at_iteration(&self, iteration: u64) -> Self {
        Self {
            iteration,
            ..self.clone()
        }
    }
}

/// Dataset loading options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    // Directory relative dataset paths are resolved against.
    pub base_path: PathBuf,
    // Field delimiter, a single ASCII character.
    pub delimiter: char,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            delimiter: ',',
        }
    }
}

// Structured event output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    // JSON-lines result file; events go to stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file: Option<PathBuf>,
    // Region this client runs in; added to every emitted event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
}

impl FromStr for FeedConfig {
    type Err = FeedError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| FeedError::config_with_source("failed to parse TOML config", e))
    }
}

impl FeedConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FeedError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self> {
        let config = Self::default().with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `FEED_` and use underscores
    // to separate nested fields. For example:
    // - `FEED_COORDINATOR_BASE_URL` overrides `coordinator.base_url`
    // - `FEED_EXECUTION_ID` / `FEED_CHUNK_ID` set `execution`
    // - `FEED_CLIENT_ITERATION` overrides `client.iteration`
    // - `FEED_EVENTS_RESULT_FILE` overrides `events.result_file`
    //
    // Negative execution or chunk ids mean "not part of a distributed run".
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Coordinator overrides
        if let Ok(val) = std::env::var("FEED_COORDINATOR_BASE_URL") {
            self.coordinator.base_url = Some(val);
        }
        if let Ok(val) = std::env::var("FEED_COORDINATOR_KEY") {
            self.coordinator.key = Some(val);
        }
        if let Ok(val) = std::env::var("FEED_COORDINATOR_CONNECT_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.coordinator.connect_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("FEED_COORDINATOR_REQUEST_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.coordinator.request_timeout_ms = v;
            }
        }

        // Execution identity
        let execution_id = env_id("FEED_EXECUTION_ID");
        let chunk_id = env_id("FEED_CHUNK_ID");
        match (execution_id, chunk_id) {
            (Some(Some(execution_id)), Some(Some(chunk_id))) => {
                self.execution = Some(ExecutionIdentity {
                    execution_id,
                    chunk_id,
                });
            }
            // An explicit negative id opts out of the distributed run
            (Some(None), _) | (_, Some(None)) => self.execution = None,
            (Some(Some(execution_id)), None) => {
                if let Some(execution) = self.execution.as_mut() {
                    execution.execution_id = execution_id;
                }
            }
            (None, Some(Some(chunk_id))) => {
                if let Some(execution) = self.execution.as_mut() {
                    execution.chunk_id = chunk_id;
                }
            }
            (None, None) => {}
        }

        // Client identity overrides
        if let Ok(val) = std::env::var("FEED_CLIENT_GLOBAL_INDEX") {
            if let Ok(v) = val.parse() {
                self.client.global_client_index = v;
            }
        }
        if let Ok(val) = std::env::var("FEED_CLIENT_REGIONAL_INDEX") {
            if let Ok(v) = val.parse() {
                self.client.regional_client_index = v;
            }
        }
        if let Ok(val) = std::env::var("FEED_CLIENT_ITERATION") {
            if let Ok(v) = val.parse() {
                self.client.iteration = v;
            }
        }
        if let Ok(val) = std::env::var("FEED_CLIENT_CONCURRENT_CLIENTS") {
            if let Ok(v) = val.parse() {
                self.client.concurrent_clients = v;
            }
        }

        // Dataset overrides
        if let Ok(val) = std::env::var("FEED_DATASET_BASE_PATH") {
            self.dataset.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FEED_DATASET_DELIMITER") {
            let mut chars = val.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                self.dataset.delimiter = c;
            }
        }

        // Event overrides
        if let Ok(val) = std::env::var("FEED_EVENTS_RESULT_FILE") {
            self.events.result_file = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("FEED_EVENTS_REGION_NAME") {
            self.events.region_name = Some(val);
        }

        self
    }

    /// Whether this process takes part in a distributed execution and
    /// should therefore draw rows from the coordination service.
    pub fn is_distributed(&self) -> bool {
        self.execution.is_some()
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Coordinator validation
        if self.coordinator.connect_timeout_ms == 0 {
            return Err(FeedError::config(
                "coordinator.connect_timeout_ms must be greater than 0",
            ));
        }
        if self.coordinator.request_timeout_ms == 0 {
            return Err(FeedError::config(
                "coordinator.request_timeout_ms must be greater than 0",
            ));
        }
        if self.is_distributed() {
            match self.coordinator.base_url.as_deref() {
                Some(url) if !url.trim().is_empty() => {}
                _ => {
                    return Err(FeedError::config(
                        "coordinator.base_url is required for a distributed execution",
                    ));
                }
            }
        }

        // Client validation
        if self.client.concurrent_clients == 0 {
            return Err(FeedError::config(
                "client.concurrent_clients must be greater than 0",
            ));
        }
        if self.client.global_client_index >= self.client.concurrent_clients {
            return Err(FeedError::config(format!(
                "client.global_client_index ({}) must be less than client.concurrent_clients ({})",
                self.client.global_client_index, self.client.concurrent_clients
            )));
        }

        // Dataset validation
        if !self.dataset.delimiter.is_ascii() {
            return Err(FeedError::config(
                "dataset.delimiter must be a single ASCII character",
            ));
        }

        Ok(())
    }
}

// Reads an id variable: `None` when unset or unparseable, `Some(None)` when
// negative, `Some(Some(id))` otherwise.
fn env_id(name: &str) -> Option<Option<u64>> {
    let val = std::env::var(name).ok()?;
    let id: i64 = val.trim().parse().ok()?;
    Some(u64::try_from(id).ok())
}
