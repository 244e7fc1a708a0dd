//! Asset Tracker - Main Server
//!
//! Multi-tenant JSON:API over Neo4j.

use anyhow::Result;
use asset_tracker::{AppState, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "asset-tracker")]
#[command(about = "Multi-tenant asset tracking API")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on (overrides config.yaml / SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply pending Cypher migrations and exit
    Migrate {
        /// Directory holding `<YYYYMMDD>_<n>[_label].cypher` files
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,asset_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            asset_tracker::start_server(config).await
        }
        Commands::Migrate { path } => {
            let dir = path.unwrap_or_else(|| config.migrations_path.clone());
            run_migrate(config, dir).await
        }
    }
}

async fn run_migrate(config: Config, dir: PathBuf) -> Result<()> {
    tracing::info!("Migrating from {}", dir.display());

    let state = AppState::new(config).await?;
    let applied = state.run_migrations(&dir).await?;

    tracing::info!("Migration complete: {} applied", applied.len());
    Ok(())
}
