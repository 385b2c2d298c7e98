// rust/feed-core/src/events.rs

//! Structured result events.
//!
//! Every record is a `{"type": ..., "data": ...}` JSON object. With a result
//! file configured, records are appended one per line; otherwise they go to
//! stdout prefixed with their type, e.g. `[Log] {"type":"Log",...}`.

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::config::EventsConfig;
use crate::error::{ErrorKind, FeedError, Result};

/// Severity of a `Log` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Error,
    /// Stops the whole test run.
    Fatal,
}

/// A `Log` record's payload.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// One structured record: a type tag plus an arbitrary JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl Event {
    /// Build an event from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns an event error if `data` cannot be represented as JSON.
    pub fn new(event_type: impl Into<String>, data: impl Serialize) -> Result<Self> {
        let data = serde_json::to_value(data).map_err(|e| FeedError::Event {
            message: format!("failed to serialize event payload: {e}"),
            source: None,
        })?;
        Ok(Self {
            event_type: event_type.into(),
            data,
        })
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::from_record(LogRecord {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind: None,
        })
    }

    /// An `Error`-level log event describing a row iteration failure.
    pub fn failure(error: &FeedError) -> Self {
        Self::from_record(LogRecord {
            level: LogLevel::Error,
            message: error.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind: Some(error.kind()),
        })
    }

    fn from_record(record: LogRecord) -> Self {
        // LogRecord has only plain fields and cannot fail to serialize
        let data = serde_json::to_value(&record).unwrap_or(Value::Null);
        Self {
            event_type: "Log".to_string(),
            data,
        }
    }

    /// Tag the payload with the region the client runs in.
    ///
    /// Payloads that are not JSON objects are left as they are.
    #[must_use]
    pub fn in_region(mut self, region: &str) -> Self {
        if let Value::Object(data) = &mut self.data {
            data.insert("region".to_string(), Value::String(region.to_string()));
        }
        self
    }

    /// `{"type":...,"data":...}` on one line.
    pub fn to_json(&self) -> String {
        // String keys and a JSON value; serialization is infallible
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Destination for structured events.
pub trait EventSink: Send + Sync {
    /// # Errors
    ///
    /// Returns an event error if the record cannot be written.
    fn emit(&self, event: &Event) -> Result<()>;
}

/// Appends one JSON object per line to a result file.
#[derive(Debug)]
pub struct JsonLinesSink {
    writer: Mutex<LineWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                FeedError::event_with_source(
                    format!("failed to open result file {}", path.display()),
                    e,
                )
            })?;
        Ok(Self {
            writer: Mutex::new(LineWriter::new(file)),
        })
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &Event) -> Result<()> {
        let line = event.to_json();
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| FeedError::event_with_source("failed to write event", e))
    }
}

/// Prints `[type] {json}` lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn format(event: &Event) -> String {
        format!("[{}] {}", event.event_type, event.to_json())
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: &Event) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", Self::format(event))
            .map_err(|e| FeedError::event_with_source("failed to write event to stdout", e))
    }
}

// Adds the configured region to every event before passing it on.
struct RegionSink {
    region: String,
    inner: Box<dyn EventSink>,
}

impl EventSink for RegionSink {
    fn emit(&self, event: &Event) -> Result<()> {
        self.inner.emit(&event.clone().in_region(&self.region))
    }
}

/// Result file sink when one is configured, console otherwise.
///
/// With `region_name` set, every event carries it as `data.region`.
pub fn sink_from_config(config: &EventsConfig) -> Result<Box<dyn EventSink>> {
    let sink: Box<dyn EventSink> = match &config.result_file {
        Some(path) => Box::new(JsonLinesSink::open(path)?),
        None => Box::new(ConsoleSink),
    };

    Ok(match &config.region_name {
        Some(region) => Box::new(RegionSink {
            region: region.clone(),
            inner: sink,
        }),
        None => sink,
    })
}
