use parley_console::{
    app::{self, Assistant},
    config::{DEFAULT_CONFIG_DIR, Settings},
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let config_dir = std::env::var_os("PARLEY_CONFIG_DIR")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR), PathBuf::from);

    // Loaded before the subscriber exists so the configured level applies.
    let loaded = Settings::load(&config_dir);
    let level = loaded
        .as_ref()
        .map_or_else(|_| "info".to_string(), |s| s.logging.level.clone());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::or_default(loaded);
    tracing::info!(bot = %settings.bot.name, "starting console");

    let assistant = match Assistant::from_settings(&settings) {
        Ok(assistant) => assistant,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize assistant");
            return ExitCode::FAILURE;
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = app::run(&assistant, &settings.console, stdin, stdout) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "console I/O failed");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }

    ExitCode::SUCCESS
}
