//! Telemetry sinks.

use crate::error::TelemetryError;
use crate::event::{EventKind, TelemetryEvent};
use async_trait::async_trait;
use chrono::NaiveDate;
use rootcause::prelude::Report;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

/// Destination for telemetry records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Persists one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be serialized or stored.
    async fn record(&self, event: &TelemetryEvent) -> Result<(), Report<TelemetryError>>;
}

/// Appends records as JSON lines, one file per stream per UTC day.
///
/// Files are named `{stream}_{YYYY-MM-DD}.jsonl` inside the sink directory,
/// which is created on first write.
#[derive(Debug)]
pub struct DailyJsonlSink {
    dir: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl DailyJsonlSink {
    /// Creates a sink writing under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Returns the sink directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file a record of `kind` created on `date` goes to.
    #[must_use]
    pub fn path_for(&self, kind: EventKind, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.jsonl", kind.file_stem(), date.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl TelemetrySink for DailyJsonlSink {
    async fn record(&self, event: &TelemetryEvent) -> Result<(), Report<TelemetryError>> {
        let mut line = serde_json::to_string(event).map_err(|e| TelemetryError::SerializeFailed {
            reason: e.to_string(),
        })?;
        line.push('\n');

        let path = self.path_for(event.kind(), event.timestamp().date_naive());
        let write_failed = |e: std::io::Error| TelemetryError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        // One writer at a time so concurrent records never interleave mid-line.
        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(write_failed)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(write_failed)?;
        file.write_all(line.as_bytes()).await.map_err(write_failed)?;
        file.flush().await.map_err(write_failed)?;

        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record received so far.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the records of one stream.
    #[must_use]
    pub fn events_of(&self, kind: EventKind) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn record(&self, event: &TelemetryEvent) -> Result<(), Report<TelemetryError>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
