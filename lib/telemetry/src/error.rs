//! Error types for the telemetry crate.

use std::fmt;

/// Errors from telemetry sinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// The record could not be serialized.
    SerializeFailed { reason: String },
    /// The record could not be written.
    WriteFailed { path: String, reason: String },
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerializeFailed { reason } => {
                write!(f, "failed to serialize telemetry record: {reason}")
            }
            Self::WriteFailed { path, reason } => {
                write!(f, "failed to write telemetry to '{path}': {reason}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {}
