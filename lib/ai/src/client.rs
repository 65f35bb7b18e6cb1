//! The completion pipeline.
//!
//! One call to [`CompletionClient::get_response`] is one exchange:
//!
//! 1. Take the user's exchange gate so exchanges for one user run one at a time
//! 2. Build `[system] + recent history + [current message]`
//! 3. Run up to `max_retries + 1` attempts, each bounded by the timeout, with
//!    a fixed pause between them
//! 4. On success, commit the user/assistant pair to the store and emit
//!    telemetry; on exhaustion, emit an error record and return the
//!    fallback message without touching history
//!
//! Nothing escapes this boundary as an error.

use crate::backend::{ChatMessage, CompletionBackend, CompletionRequest, CompletionResponse};
use crate::error::LlmError;
use crate::settings::CompletionSettings;
use parley_conversation::{ConversationStore, ConversationTurn, TurnRole};
use parley_core::{ExchangeId, UserKey};
use parley_telemetry::{AttemptRecord, ConversationRecord, ErrorRecord, TelemetryEmitter};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The endpoint replied.
    Success(CompletionResponse),
    /// No reply within the attempt timeout.
    Timeout,
    /// The endpoint failed or replied with something unusable.
    Error(LlmError),
}

impl AttemptOutcome {
    /// Classifies a backend result.
    ///
    /// A timeout reported by the backend itself counts as a timeout.
    #[must_use]
    pub fn from_result(result: Result<CompletionResponse, LlmError>) -> Self {
        match result {
            Ok(response) => Self::Success(response),
            Err(e) if e.is_timeout() => Self::Timeout,
            Err(e) => Self::Error(e),
        }
    }

    /// Returns a description of a failed outcome.
    #[must_use]
    pub fn describe(&self, timeout: Duration) -> String {
        match self {
            Self::Success(_) => "success".to_string(),
            Self::Timeout => format!("timed out after {}s", timeout.as_secs()),
            Self::Error(e) => e.to_string(),
        }
    }
}

/// Formats the user turn as sent to the model and kept in history.
#[must_use]
pub fn format_user_turn(message: &str, display_name: Option<&str>) -> String {
    match display_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{name}: {message}"),
        None => message.to_string(),
    }
}

/// Resilient request pipeline in front of a completion backend.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    store: Arc<ConversationStore>,
    telemetry: TelemetryEmitter,
    settings: CompletionSettings,
}

impl CompletionClient {
    /// Creates a client.
    ///
    /// Settings are normalized, and the history limit is clamped to the
    /// store's capacity.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: Arc<ConversationStore>,
        telemetry: TelemetryEmitter,
        settings: CompletionSettings,
    ) -> Self {
        let mut settings = settings.normalized();
        if settings.history_limit > store.capacity() {
            warn!(
                history_limit = settings.history_limit,
                capacity = store.capacity(),
                "history limit exceeds store capacity, clamping"
            );
            settings.history_limit = store.capacity();
        }

        Self {
            backend,
            store,
            telemetry,
            settings,
        }
    }

    /// Returns the effective settings.
    #[must_use]
    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Returns the conversation store.
    #[must_use]
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Produces a reply for `message` from user `key`.
    ///
    /// Always returns text: the assistant's reply, or the configured error
    /// message once every attempt has failed.
    #[instrument(skip_all, fields(user_id = %key))]
    pub async fn get_response(
        &self,
        message: &str,
        key: UserKey,
        display_name: Option<&str>,
    ) -> String {
        let exchange_id = ExchangeId::new();

        let queued = Instant::now();
        let _gate = self.store.begin_exchange(key).await;
        let started = Instant::now();
        let queued_ms = millis(started.duration_since(queued));

        let history = prompt_window(self.store.get_history(key, self.settings.history_limit));
        let user_turn = format_user_turn(message, display_name);
        let request = self.build_request(&history, &user_turn);

        info!(
            %exchange_id,
            history = history.len(),
            queued_ms,
            "requesting completion"
        );
        debug!(%exchange_id, text = message, "user message");

        let max_retries = self.settings.max_retries;
        let mut last_failure = String::new();

        for attempt in 0..=max_retries {
            let attempt_started = Instant::now();
            let outcome = self.attempt(&request).await;
            let attempt_ms = millis(attempt_started.elapsed());

            if let AttemptOutcome::Success(response) = outcome {
                self.store
                    .append_exchange(key, user_turn, response.content.clone());
                self.record_success(
                    exchange_id,
                    key,
                    display_name,
                    message,
                    &response,
                    attempt,
                    attempt_ms,
                    millis(started.elapsed()),
                )
                .await;
                return response.content;
            }

            last_failure = outcome.describe(self.settings.timeout());
            warn!(
                %exchange_id,
                attempt = attempt + 1,
                max_attempts = self.settings.max_attempts(),
                elapsed_ms = attempt_ms,
                error = %last_failure,
                "completion attempt failed"
            );
            self.telemetry
                .emit(AttemptRecord::failure(
                    exchange_id,
                    key,
                    &request.model,
                    attempt,
                    attempt_ms,
                    &last_failure,
                ))
                .await;

            if attempt < max_retries {
                tokio::time::sleep(self.settings.retry_delay()).await;
            }
        }

        let elapsed_ms = millis(started.elapsed());
        let attempts = self.settings.max_attempts();
        warn!(%exchange_id, attempts, elapsed_ms, "all completion attempts failed");
        self.telemetry
            .emit(
                ErrorRecord::new("completion_exhausted", &last_failure, Some(key))
                    .with_data("exchange_id", exchange_id.to_string())
                    .with_data("attempts", attempts)
                    .with_data("elapsed_ms", elapsed_ms)
                    .with_data("queued_ms", queued_ms)
                    .with_data("model", request.model.as_str()),
            )
            .await;

        self.settings.error_message.clone()
    }

    /// Builds the request for one exchange.
    #[must_use]
    pub fn build_request(&self, history: &[ConversationTurn], user_turn: &str) -> CompletionRequest {
        CompletionRequest::new(
            &self.settings.model,
            self.settings.max_tokens,
            self.settings.temperature,
        )
        .with_message(ChatMessage::system(&self.settings.system_prompt))
        .with_messages(history.iter().map(ChatMessage::from))
        .with_message(ChatMessage::user(user_turn))
    }

    async fn attempt(&self, request: &CompletionRequest) -> AttemptOutcome {
        match tokio::time::timeout(self.settings.timeout(), self.backend.complete(request)).await {
            Ok(result) => AttemptOutcome::from_result(result),
            Err(_) => AttemptOutcome::Timeout,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_success(
        &self,
        exchange_id: ExchangeId,
        key: UserKey,
        display_name: Option<&str>,
        message: &str,
        response: &CompletionResponse,
        attempt: u32,
        attempt_ms: u64,
        elapsed_ms: u64,
    ) {
        info!(
            %exchange_id,
            attempt = attempt + 1,
            elapsed_ms,
            backend = self.backend.name(),
            "completion succeeded"
        );

        let usage = response.usage;
        self.telemetry
            .emit(AttemptRecord::success(
                exchange_id,
                key,
                &self.settings.model,
                attempt,
                usage.map(|u| u.prompt_tokens),
                usage.map(|u| u.completion_tokens),
                attempt_ms,
            ))
            .await;
        self.telemetry
            .emit(ConversationRecord::new(
                exchange_id,
                key,
                display_name.map(str::to_string),
                message,
                &response.content,
                elapsed_ms,
            ))
            .await;
    }
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Drops assistant turns at the start of the window; their user turn is no
/// longer in it.
fn prompt_window(mut history: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
    let orphans = history
        .iter()
        .take_while(|turn| turn.role() == TurnRole::Assistant)
        .count();
    history.drain(..orphans);
    history
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
