//! Telemetry record schema.
//!
//! Each record serializes to one flat JSON object. Field names are part of
//! the on-disk format and must stay stable.

use chrono::{DateTime, Utc};
use parley_core::{ExchangeId, UserKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Which stream a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A completed request/reply exchange.
    Conversation,
    /// One attempt against the completion endpoint.
    Attempt,
    /// A failure worth keeping.
    Error,
}

impl EventKind {
    /// Returns the file stem used by file-backed sinks.
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Conversation => "conversations",
            Self::Attempt => "llm_requests",
            Self::Error => "errors",
        }
    }
}

/// A successful exchange between a user and the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub timestamp: DateTime<Utc>,
    pub exchange_id: ExchangeId,
    pub user_id: UserKey,
    pub username: Option<String>,
    pub user_message: String,
    pub bot_response: String,
    pub response_time_ms: u64,
}

impl ConversationRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        exchange_id: ExchangeId,
        user_id: UserKey,
        username: Option<String>,
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            exchange_id,
            user_id,
            username,
            user_message: user_message.into(),
            bot_response: bot_response.into(),
            response_time_ms,
        }
    }
}

/// Outcome of a completion attempt as written to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Error,
}

/// One attempt against the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub exchange_id: ExchangeId,
    pub user_id: UserKey,
    pub model: String,
    /// Zero-based attempt index within the exchange.
    pub attempt: u32,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    /// Sum of prompt and completion tokens, only when both are known.
    pub total_tokens: Option<u32>,
    pub response_time_ms: u64,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    /// Creates a record for a successful attempt.
    #[must_use]
    pub fn success(
        exchange_id: ExchangeId,
        user_id: UserKey,
        model: impl Into<String>,
        attempt: u32,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        response_time_ms: u64,
    ) -> Self {
        let total_tokens = match (prompt_tokens, completion_tokens) {
            (Some(prompt), Some(completion)) => Some(prompt.saturating_add(completion)),
            _ => None,
        };
        Self {
            timestamp: Utc::now(),
            exchange_id,
            user_id,
            model: model.into(),
            attempt,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            response_time_ms,
            status: AttemptStatus::Success,
            error: None,
        }
    }

    /// Creates a record for a failed attempt.
    #[must_use]
    pub fn failure(
        exchange_id: ExchangeId,
        user_id: UserKey,
        model: impl Into<String>,
        attempt: u32,
        response_time_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            exchange_id,
            user_id,
            model: model.into(),
            attempt,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            response_time_ms,
            status: AttemptStatus::Error,
            error: Some(error.into()),
        }
    }
}

/// A failure record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub error_message: String,
    pub user_id: Option<UserKey>,
    #[serde(default)]
    pub additional_data: Map<String, JsonValue>,
}

impl ErrorRecord {
    /// Creates an error record with no extra data.
    #[must_use]
    pub fn new(
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        user_id: Option<UserKey>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            error_type: error_type.into(),
            error_message: error_message.into(),
            user_id,
            additional_data: Map::new(),
        }
    }

    /// Adds one field to `additional_data`.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }
}

/// Any telemetry record.
///
/// Serializes as the bare inner record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryEvent {
    Conversation(ConversationRecord),
    Attempt(AttemptRecord),
    Error(ErrorRecord),
}

impl TelemetryEvent {
    /// Returns the stream this record belongs to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Conversation(_) => EventKind::Conversation,
            Self::Attempt(_) => EventKind::Attempt,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Returns when the record was created.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Conversation(record) => record.timestamp,
            Self::Attempt(record) => record.timestamp,
            Self::Error(record) => record.timestamp,
        }
    }
}

impl From<ConversationRecord> for TelemetryEvent {
    fn from(record: ConversationRecord) -> Self {
        Self::Conversation(record)
    }
}

impl From<AttemptRecord> for TelemetryEvent {
    fn from(record: AttemptRecord) -> Self {
        Self::Attempt(record)
    }
}

impl From<ErrorRecord> for TelemetryEvent {
    fn from(record: ErrorRecord) -> Self {
        Self::Error(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_tokens_needs_both_counts() {
        let id = ExchangeId::new();
        let user = UserKey::new(1);

        let both = AttemptRecord::success(id, user, "m", 0, Some(120), Some(30), 800);
        assert_eq!(both.total_tokens, Some(150));

        let partial = AttemptRecord::success(id, user, "m", 0, Some(120), None, 800);
        assert_eq!(partial.total_tokens, None);
    }

    #[test]
    fn attempt_record_serializes_flat() {
        let record = AttemptRecord::failure(
            ExchangeId::new(),
            UserKey::new(42),
            "google/gemini-2.0-flash-exp:free",
            1,
            30_000,
            "LLM request timed out",
        );
        let json = serde_json::to_value(TelemetryEvent::from(record)).expect("serialize");

        assert_eq!(json["user_id"], 42);
        assert_eq!(json["status"], "error");
        assert_eq!(json["attempt"], 1);
        assert_eq!(json["error"], "LLM request timed out");
        assert!(json["total_tokens"].is_null());
    }

    #[test]
    fn successful_attempt_omits_error_field() {
        let record =
            AttemptRecord::success(ExchangeId::new(), UserKey::new(1), "m", 0, None, None, 5);
        let json = serde_json::to_value(&record).expect("serialize");
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "success");
    }

    #[test]
    fn error_record_defaults_to_empty_data() {
        let record = ErrorRecord::new("completion_exhausted", "timed out", None);
        let json = serde_json::to_value(&record).expect("serialize");

        assert!(json["user_id"].is_null());
        assert_eq!(json["additional_data"], serde_json::json!({}));

        let record = record.with_data("attempts", 3);
        assert_eq!(record.additional_data["attempts"], 3);
    }

    #[test]
    fn conversation_record_keeps_unicode_unescaped() {
        let record = ConversationRecord::new(
            ExchangeId::new(),
            UserKey::new(3),
            Some("Анна".to_string()),
            "Привет",
            "Здравствуйте!",
            1_250,
        );
        let line = serde_json::to_string(&TelemetryEvent::from(record)).expect("serialize");
        assert!(line.contains("Привет"));
        assert!(line.contains("\"username\":\"Анна\""));
    }

    #[test]
    fn kinds_map_to_file_stems() {
        let event = TelemetryEvent::from(ErrorRecord::new("x", "y", None));
        assert_eq!(event.kind(), EventKind::Error);
        assert_eq!(EventKind::Attempt.file_stem(), "llm_requests");
        assert_eq!(EventKind::Conversation.file_stem(), "conversations");
    }
}
