//! Completion pipeline for parley.
//!
//! This crate turns one user message into one reply:
//!
//! - **Backend**: the remote completion endpoint behind a trait, with an
//!   OpenAI-compatible HTTP implementation
//! - **Settings**: typed generation and retry configuration with defaults
//! - **Client**: prompt assembly, timeout-bounded attempts, fixed-delay
//!   retries, history commit and telemetry, always ending in a reply or the
//!   configured fallback message

pub mod backend;
pub mod client;
pub mod error;
pub mod openai;
pub mod settings;

pub use backend::{
    ChatMessage, CompletionBackend, CompletionRequest, CompletionResponse, MessageRole, TokenUsage,
};
pub use client::{AttemptOutcome, CompletionClient, format_user_turn};
pub use error::LlmError;
pub use openai::OpenAiCompatibleBackend;
pub use settings::CompletionSettings;
