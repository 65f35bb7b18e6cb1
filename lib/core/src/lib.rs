//! Core types shared across the parley crates.
//!
//! This crate provides the identifiers that flow between the conversation
//! store, the completion pipeline and telemetry, plus the `Result` alias
//! used where errors cross a layer boundary.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ExchangeId, ParseIdError, UserKey};
