//! Application configuration.
//!
//! Settings are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. `<dir>/settings.yaml` (optional)
//! 3. `PARLEY__`-prefixed environment variables, `__` between path segments
//!    (e.g. `PARLEY__LLM__MODEL`, `PARLEY__CONSOLE__USER_KEY`)
//!
//! Prompt texts come from `<dir>/prompts.yaml` (optional, top-level keys),
//! with any `prompts` section from the layers above taking precedence.

use config::{Config, Environment, File, Map};
use parley_ai::CompletionSettings;
use parley_core::UserKey;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::{error, info};

/// Default directory holding configuration files.
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Environment variable consulted when no API key is configured.
pub const API_KEY_FALLBACK_VAR: &str = "OPENROUTER_API_KEY";

const ENV_PREFIX: &str = "PARLEY";
const ENV_SEPARATOR: &str = "__";

/// Errors from loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A source could not be read or parsed.
    LoadFailed { source: String, reason: String },
    /// The merged configuration does not fit the settings types.
    Invalid { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadFailed { source, reason } => {
                write!(f, "failed to load configuration from {source}: {reason}")
            }
            Self::Invalid { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bot: BotSettings,

    #[serde(default)]
    pub llm: CompletionSettings,

    #[serde(default)]
    pub prompts: Prompts,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub console: ConsoleSettings,
}

/// Identity of the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotSettings {
    #[serde(default = "default_bot_name")]
    pub name: String,

    #[serde(default = "default_bot_description")]
    pub description: String,
}

fn default_bot_name() -> String {
    "LLM Consultant".to_string()
}

fn default_bot_description() -> String {
    "Consultant for the company's services".to_string()
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            description: default_bot_description(),
        }
    }
}

/// User-facing texts.
///
/// `system_prompt` and `error_message` replace the `llm` values when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Prompts {
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub welcome_message: Option<String>,

    #[serde(default)]
    pub help_message: Option<String>,

    #[serde(default)]
    pub error_message: Option<String>,
}

const DEFAULT_WELCOME_MESSAGE: &str = "Welcome! I am the company's consultant.

I can help you find the right services for your needs.
Ask me a question or type /help to see what I can do.";

const DEFAULT_HELP_MESSAGE: &str = "Available commands:

/start - show the welcome message
/help - show this help
/clear - forget our conversation so far
/stats - show conversation memory statistics

Just type a message and I will answer your question!";

impl Prompts {
    /// Returns the greeting shown for `/start`.
    #[must_use]
    pub fn welcome_message(&self) -> &str {
        self.welcome_message
            .as_deref()
            .unwrap_or(DEFAULT_WELCOME_MESSAGE)
    }

    /// Returns the text shown for `/help`.
    #[must_use]
    pub fn help_message(&self) -> &str {
        self.help_message.as_deref().unwrap_or(DEFAULT_HELP_MESSAGE)
    }

    /// Returns `self` with every field that `other` sets replaced.
    #[must_use]
    pub fn overridden_by(self, other: Prompts) -> Self {
        Self {
            system_prompt: other.system_prompt.or(self.system_prompt),
            welcome_message: other.welcome_message.or(self.welcome_message),
            help_message: other.help_message.or(self.help_message),
            error_message: other.error_message.or(self.error_message),
        }
    }
}

/// Diagnostics and telemetry output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the daily telemetry files.
    #[serde(default = "default_log_directory")]
    pub directory: String,

    /// Whether telemetry records are written at all.
    #[serde(default = "default_telemetry_enabled")]
    pub telemetry_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_telemetry_enabled() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            telemetry_enabled: default_telemetry_enabled(),
        }
    }
}

/// Who is typing at the console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_user_key")]
    pub user_key: UserKey,

    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_user_key() -> UserKey {
    UserKey::new(1)
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            user_key: default_user_key(),
            display_name: None,
        }
    }
}

impl Settings {
    /// Loads settings from `dir` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value has
    /// the wrong type.
    pub fn load(dir: &Path) -> parley_core::Result<Self, ConfigError> {
        Self::load_with_env(dir, None)
    }

    /// Loads settings, falling back to defaults on any failure.
    #[must_use]
    pub fn load_or_default(dir: &Path) -> Self {
        Self::or_default(Self::load(dir))
    }

    /// Resolves a load result, logging the outcome.
    ///
    /// A failure is logged at `error` and replaced by the defaults. Callers
    /// that need the settings before logging is set up load first and
    /// resolve afterwards.
    #[must_use]
    pub fn or_default(loaded: parley_core::Result<Self, ConfigError>) -> Self {
        match loaded {
            Ok(settings) => {
                info!(model = %settings.llm.model, "configuration loaded");
                settings
            }
            Err(e) => {
                error!(error = %e, "failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Loads settings using `env` instead of the process environment when
    /// given.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::load`].
    pub fn load_with_env(
        dir: &Path,
        env: Option<Map<String, String>>,
    ) -> parley_core::Result<Self, ConfigError> {
        let settings_path = dir.join("settings.yaml");
        let mut settings: Settings = Config::builder()
            .add_source(File::from(settings_path.as_path()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env.clone()),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                source: settings_path.display().to_string(),
                reason: e.to_string(),
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid {
                reason: e.to_string(),
            })?;

        let prompts_path = dir.join("prompts.yaml");
        let file_prompts: Prompts = Config::builder()
            .add_source(File::from(prompts_path.as_path()).required(false))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigError::LoadFailed {
                source: prompts_path.display().to_string(),
                reason: e.to_string(),
            })?;
        settings.prompts = file_prompts.overridden_by(settings.prompts);

        if settings.llm.api_key.is_none() {
            settings.llm.api_key = match &env {
                Some(vars) => vars.get(API_KEY_FALLBACK_VAR).cloned(),
                None => std::env::var(API_KEY_FALLBACK_VAR).ok(),
            };
        }

        Ok(settings)
    }

    /// Returns the completion settings with prompt overrides applied.
    #[must_use]
    pub fn completion_settings(&self) -> CompletionSettings {
        let mut llm = self.llm.clone();
        if let Some(system_prompt) = &self.prompts.system_prompt {
            llm.system_prompt.clone_from(system_prompt);
        }
        if let Some(error_message) = &self.prompts.error_message {
            llm.error_message.clone_from(error_message);
        }
        llm
    }
}
