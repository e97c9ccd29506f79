//! Model manager
//!
//! Catalogs local AI model files and enriches them with metadata from civitai.com.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use database::Catalog;
use model_manager::commands;
use model_structs::ModelType;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

/// Model manager
#[derive(Parser)]
#[command(name = "model-manager")]
#[command(about = "Catalog local AI model files and enrich them with Civitai metadata")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the model folders and update the catalog
    Scan {
        /// Re-fingerprint every file, even unchanged ones
        #[arg(short, long)]
        force: bool,
    },

    /// List catalogued models, grouped by type
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Only list one type (checkpoint, lora, embedding, diffusion_model)
        #[arg(short = 't', long = "type")]
        model_type: Option<ModelType>,
    },

    /// Filter models by name, type, path, trigger words or tags
    Search {
        /// Case-insensitive search text; empty matches everything
        query: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Look models up on Civitai by full file hash
    Enrich {
        /// Model ids to enrich, in order
        #[arg(required_unless_present = "unchecked", conflicts_with = "unchecked")]
        ids: Vec<String>,

        /// Enrich every model never looked up before
        #[arg(long)]
        unchecked: bool,
    },

    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(cli.verbose, config.log_dir.as_deref())?;

    let catalog = Catalog::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open catalog at {}", config.database_url))?;
    catalog
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    match cli.command {
        Commands::Scan { force } => {
            commands::scan::run(&catalog, &config, force).await?;
        }
        Commands::List { json, model_type } => {
            commands::list::run(&catalog, &config, model_type, json).await?;
        }
        Commands::Search { query, json } => {
            commands::search::run(&catalog, &query, json).await?;
        }
        Commands::Enrich { ids, unchecked } => {
            commands::enrich::run(&catalog, &config, ids, unchecked).await?;
        }
        Commands::Migrate => {
            info!("Migrations completed successfully");
        }
    }

    Ok(())
}

/// Installs a console layer and, if a log directory is configured, a file layer.
///
/// `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    // File layer
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let log_file = File::create(dir.join("debug.log"))
                .context("Failed to create debug log file")?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Arc::new(log_file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
