//! jdrelay - streaming relay for the Gemini generative-language API
//!
//! Streams generated text to HTTP clients and extracts structured fields
//! from job descriptions.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jdrelay::config::{Config, KeySource};

#[derive(Parser)]
#[command(name = "jdrelay")]
#[command(about = "Streaming relay for the Gemini generative-language API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and show the resolved upstream settings
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("jdrelay={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut settings, key_source) = Config::from_file_with_env(&config)?;
            init_tracing(&settings.logging.level);

            tracing::info!(config = %config, key_source = %key_source, "Loaded configuration");

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                settings.server.listen = addr;
            }

            jdrelay::relay::run_server(settings).await
        }

        Commands::Check { config } => {
            let (settings, key_source) = Config::from_file_with_env(&config)?;
            init_tracing(&settings.logging.level);

            println!("Configuration OK: {}", config);
            println!("  listen:          {}", settings.server.listen);
            println!("  upstream:        {}", settings.upstream.base_url);
            println!("  model:           {}", settings.upstream.model);
            println!("  timeout:         {}s", settings.upstream.timeout_secs);
            println!("  api key source:  {}", key_source);
            println!("  extract mode:    {:?}", settings.extract.response);

            if key_source == KeySource::None {
                tracing::warn!("No upstream API key - /generate and /api/extract-jd will fail");
            }
            Ok(())
        }
    }
}
