//! Console assistant: wiring and the read-eval-print loop.

use crate::command::{Input, render_stats};
use crate::config::{ConsoleSettings, Prompts, Settings};
use parley_ai::{CompletionClient, LlmError, OpenAiCompatibleBackend};
use parley_conversation::ConversationStore;
use parley_core::UserKey;
use parley_telemetry::{DailyJsonlSink, TelemetryEmitter};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Reply to `/clear`.
pub const CLEARED_MESSAGE: &str = "Conversation history cleared. Let's start over!";

/// Answers console input for any number of users.
#[derive(Debug, Clone)]
pub struct Assistant {
    client: CompletionClient,
    prompts: Prompts,
}

impl Assistant {
    /// Creates an assistant around an existing client.
    #[must_use]
    pub fn new(client: CompletionClient, prompts: Prompts) -> Self {
        Self { client, prompts }
    }

    /// Builds the store, telemetry sink and HTTP backend from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP backend cannot be constructed.
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let llm = settings.completion_settings().normalized();

        let backend = OpenAiCompatibleBackend::new(llm.base_url.clone(), llm.api_key.clone())?;
        if !backend.has_api_key() {
            warn!("no API key configured; requests will be sent unauthenticated");
        }

        let telemetry = if settings.logging.telemetry_enabled {
            let sink = DailyJsonlSink::new(&settings.logging.directory);
            info!(dir = %sink.dir().display(), "writing telemetry");
            TelemetryEmitter::new(Arc::new(sink))
        } else {
            TelemetryEmitter::disabled()
        };

        let store = Arc::new(ConversationStore::with_capacity(llm.history_capacity));
        info!(
            model = %llm.model,
            endpoint = %backend.endpoint(),
            history_capacity = store.capacity(),
            worst_case_secs = llm.worst_case_latency().as_secs(),
            telemetry = telemetry.is_enabled(),
            "assistant ready"
        );

        let client = CompletionClient::new(Arc::new(backend), store, telemetry, llm);
        Ok(Self::new(client, settings.prompts.clone()))
    }

    /// Returns the completion client.
    #[must_use]
    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Returns the greeting.
    #[must_use]
    pub fn welcome(&self) -> &str {
        self.prompts.welcome_message()
    }

    /// Handles one line from `key`. Blank lines get no reply.
    pub async fn handle_line(
        &self,
        line: &str,
        key: UserKey,
        display_name: Option<&str>,
    ) -> Option<String> {
        let input = Input::parse(line)?;
        debug!(user_id = %key, ?input, "console input");

        let reply = match input {
            Input::Start => self.prompts.welcome_message().to_string(),
            Input::Help => self.prompts.help_message().to_string(),
            Input::Clear => {
                self.client.store().clear(key);
                info!(user_id = %key, "conversation cleared");
                CLEARED_MESSAGE.to_string()
            }
            Input::Stats => render_stats(&self.client.store().stats()),
            Input::Unknown(name) => {
                format!("Unknown command /{name}. Type /help to see the available commands.")
            }
            Input::Message(text) => self.client.get_response(text, key, display_name).await,
        };
        Some(reply)
    }
}

/// Reads lines until EOF, writing one reply per non-blank line.
///
/// # Errors
///
/// Returns an error if reading input or writing output fails.
pub async fn run<R, W>(
    assistant: &Assistant,
    console: &ConsoleSettings,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let display_name = console.display_name.as_deref();

    output
        .write_all(format!("{}\n\n", assistant.welcome()).as_bytes())
        .await?;
    output.flush().await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(reply) = assistant
            .handle_line(&line, console.user_key, display_name)
            .await
        else {
            continue;
        };
        output.write_all(format!("{reply}\n\n").as_bytes()).await?;
        output.flush().await?;
    }

    info!("input closed");
    Ok(())
}
