//! Completion pipeline configuration.
//!
//! Every field has a default, so a missing or partial configuration source
//! still yields a usable value. [`CompletionSettings::normalized`] repairs
//! out-of-range values.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Configuration for the completion pipeline.
#[derive(Clone, Deserialize)]
pub struct CompletionSettings {
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Root of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the API, if required.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Maximum tokens to generate per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature, 0.0 to 2.0.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Number of history turns included in each prompt.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Number of turns the store keeps per user.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Absolute limit for a single attempt, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed pause between attempts, in seconds.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// System prompt placed first in every request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Reply returned when every attempt fails.
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

fn default_model() -> String {
    "google/gemini-2.0-flash-exp:free".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_history_limit() -> usize {
    6
}

fn default_history_capacity() -> usize {
    20
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_seconds() -> u64 {
    1
}

fn default_system_prompt() -> String {
    "You are a consultant for a company that provides professional services.

Your job:
- Find out what the client needs
- Ask clarifying questions to understand their problem
- Suggest suitable company services
- Stay friendly and professional

Keep answers short and to the point. If the client asks a general question, ask for details.
If you do not know the company's specific services, offer to connect the client with a manager."
        .to_string()
}

fn default_error_message() -> String {
    "Sorry, something went wrong while processing your request.

You can try to:
- Rephrase the question
- Repeat the request in a few minutes
- Contact our manager

We are working on fixing the problem!"
        .to_string()
}

const MAX_TEMPERATURE: f32 = 2.0;

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            history_limit: default_history_limit(),
            history_capacity: default_history_capacity(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            system_prompt: default_system_prompt(),
            error_message: default_error_message(),
        }
    }
}

impl CompletionSettings {
    /// Returns a copy with out-of-range values replaced.
    ///
    /// Each correction is logged at `warn`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.model.trim().is_empty() {
            warn!("llm.model is empty, using default");
            self.model = default_model();
        }
        if self.max_tokens == 0 {
            warn!("llm.max_tokens must be positive, using default");
            self.max_tokens = default_max_tokens();
        }
        if !self.temperature.is_finite() {
            warn!("llm.temperature is not a number, using default");
            self.temperature = default_temperature();
        } else if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            let clamped = self.temperature.clamp(0.0, MAX_TEMPERATURE);
            warn!(
                configured = self.temperature,
                clamped, "llm.temperature out of range"
            );
            self.temperature = clamped;
        }
        if self.history_capacity == 0 {
            warn!("llm.history_capacity must be positive, using default");
            self.history_capacity = default_history_capacity();
        }
        if self.history_limit > self.history_capacity {
            warn!(
                history_limit = self.history_limit,
                history_capacity = self.history_capacity,
                "llm.history_limit exceeds capacity, clamping"
            );
            self.history_limit = self.history_capacity;
        }
        if self.timeout_seconds == 0 {
            warn!("llm.timeout_seconds must be positive, using default");
            self.timeout_seconds = default_timeout_seconds();
        }
        self
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Returns the pause between attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    /// Returns the total number of attempts per exchange.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the worst-case time one exchange can take.
    #[must_use]
    pub fn worst_case_latency(&self) -> Duration {
        (self.timeout() + self.retry_delay()) * self.max_attempts()
    }
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("history_limit", &self.history_limit)
            .field("history_capacity", &self.history_capacity)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_seconds", &self.retry_delay_seconds)
            .finish_non_exhaustive()
    }
}
