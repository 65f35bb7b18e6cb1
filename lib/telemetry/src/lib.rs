//! Telemetry for parley.
//!
//! Telemetry is an append-only record of what happened to each exchange,
//! separate from `tracing` diagnostics:
//!
//! - **Events**: conversation-exchange, completion-attempt and error records
//! - **Sinks**: where records go (daily JSON-lines files, memory)
//! - **Emitter**: best-effort front end that never fails its caller

pub mod emitter;
pub mod error;
pub mod event;
pub mod sink;

pub use emitter::TelemetryEmitter;
pub use error::TelemetryError;
pub use event::{AttemptRecord, AttemptStatus, ConversationRecord, ErrorRecord, EventKind, TelemetryEvent};
pub use sink::{DailyJsonlSink, MemorySink, TelemetrySink};
