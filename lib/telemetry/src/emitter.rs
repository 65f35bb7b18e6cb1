//! Best-effort telemetry front end.

use crate::event::TelemetryEvent;
use crate::sink::TelemetrySink;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Forwards records to a sink without ever failing the caller.
///
/// A sink error is logged and the record dropped; nothing is retried.
#[derive(Clone)]
pub struct TelemetryEmitter {
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl TelemetryEmitter {
    /// Creates an emitter writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Creates an emitter that drops every record.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Returns true if records are forwarded anywhere.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Sends one record to the sink.
    pub async fn emit(&self, event: impl Into<TelemetryEvent>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let event = event.into();
        if let Err(e) = sink.record(&event).await {
            warn!(kind = ?event.kind(), error = %e, "failed to write telemetry record");
        }
    }
}

impl fmt::Debug for TelemetryEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::event::{ErrorRecord, EventKind};
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use rootcause::prelude::Report;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for FailingSink {
        async fn record(&self, _event: &TelemetryEvent) -> Result<(), Report<TelemetryError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TelemetryError::WriteFailed {
                path: "/dev/full".to_string(),
                reason: "no space left on device".to_string(),
            }
            .into())
        }
    }

    #[tokio::test]
    async fn emit_forwards_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let emitter = TelemetryEmitter::new(sink.clone());

        emitter.emit(ErrorRecord::new("test", "message", None)).await;

        assert_eq!(sink.events_of(EventKind::Error).len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed_without_retry() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let emitter = TelemetryEmitter::new(sink.clone());

        emitter.emit(ErrorRecord::new("test", "message", None)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_emitter_drops_records() {
        let emitter = TelemetryEmitter::disabled();
        assert!(!emitter.is_enabled());
        emitter.emit(ErrorRecord::new("test", "message", None)).await;
    }
}
