// Middag dinner coordination bot
// Main entry point for the middag binary

use clap::Parser;
use middag_engine::cli::{Cli, Command, TokenAction};
use middag_engine::config::Config;
use middag_engine::handlers::{
    handle_doctor, handle_remind, handle_round, handle_start, handle_token_delete,
    handle_token_set, OutputFormat,
};
use middag_engine::telemetry::init_telemetry_with_level;

// All round state is mutated between await points on one thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Pick up TOKEN / CHANNEL_ID from a local .env file if present
    let dotenv = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Middag v{} ({} - {})", version, commit, timestamp);
    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Start => {
            tracing::info!("Starting bot...");
            handle_start(&config).await
        }

        Command::Round => {
            tracing::info!("Running one round now...");
            handle_round(&config, format).await
        }

        Command::Remind => {
            tracing::info!("Posting reminder...");
            handle_remind(&config, format).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }

        Command::Token { action } => {
            tracing::info!("Token management: {:?}", action);
            match action {
                TokenAction::Set => handle_token_set(),
                TokenAction::Delete => handle_token_delete(),
            }
        }
    }
}
