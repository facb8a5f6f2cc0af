//! Voice journal CLI
//!
#![doc = "Voice journal CLI"]
#![doc = "Main entry point for the journal application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use voice_journal::cli::{Cli, Commands};
use voice_journal::commands::{self, App};
use voice_journal::config::{Config, LoggingConfig};

const DEFAULT_CONFIG_PATH: &str = "config/journal.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing once the configured level is known
    init_tracing(&config.logging);

    // Validate configuration
    config.validate()?;

    let app = App::connect(config).await?;

    match cli.command {
        Commands::Auth { command } => {
            tracing::info!("Starting auth command");
            commands::auth::handle_auth(&app, command).await
        }
        Commands::New { name } => commands::journal::handle_new(&app, name).await,
        Commands::History { date, search, json } => {
            commands::journal::handle_history(&app, date, search, json).await
        }
        Commands::Show { id, page, all } => commands::journal::handle_show(&app, id, page, all).await,
        Commands::Record {
            conversation,
            file,
            silent,
        } => {
            tracing::info!("Starting recording");
            if let Some(path) = &file {
                tracing::debug!("Using prerecorded clip: {}", path.display());
            }
            commands::journal::handle_record(&app, conversation, file, silent).await
        }
        Commands::Watch { id } => {
            tracing::info!("Watching conversation {}", id);
            commands::journal::handle_watch(&app, id).await
        }
        Commands::Group { command } => commands::groups::handle_group(&app, command).await,
        Commands::Profile { command } => commands::profile::handle_profile(&app, command).await,
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays clean.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voice_journal={}", logging.level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
