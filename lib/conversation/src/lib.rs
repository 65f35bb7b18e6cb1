//! Conversation history for parley.
//!
//! This crate provides:
//!
//! - **Turns**: role-tagged message units
//! - **History**: a per-user sequence of turns capped by oldest-first eviction
//! - **Store**: the process-wide keyed map of histories, safe to share
//!   between concurrently running exchanges

pub mod history;
pub mod store;
pub mod turn;

pub use history::ConversationHistory;
pub use store::{ConversationStore, DEFAULT_HISTORY_CAPACITY, ExchangeGuard, StoreStats};
pub use turn::{ConversationTurn, TurnRole};
