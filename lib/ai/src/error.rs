//! Error types for the AI crate.

use std::fmt;

/// Errors from completion backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Timeout waiting for response.
    Timeout,
    /// The request never produced a response (connection, TLS, DNS...).
    RequestFailed { reason: String },
    /// The endpoint answered with a non-success status.
    Status { status: u16, body: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Invalid configuration.
    InvalidConfig { reason: String },
}

impl LlmError {
    /// Returns true if this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::Status { status, body } => {
                if body.is_empty() {
                    write!(f, "LLM endpoint returned status {status}")
                } else {
                    write!(f, "LLM endpoint returned status {status}: {body}")
                }
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for LlmError {}
