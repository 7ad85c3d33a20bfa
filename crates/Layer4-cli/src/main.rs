//! Nexus CLI - Main entry point

mod demo;
mod plugins;

use clap::{Parser, Subcommand};
use nexus_core::{DeclarativeModuleLoader, HttpManifestSource, NexusConfig, Orchestrator};
use nexus_foundation::FileStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Nexus - in-process service orchestration host
#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding config.json and plugin data (defaults to global + project config)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an end-to-end demo with two cooperating services
    Demo,
    /// Manage installed plugins
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum PluginAction {
    /// List installed plugins
    List,
    /// Install a plugin from a manifest URL
    Install {
        url: String,
        /// Enable right after installing
        #[arg(long)]
        enable: bool,
    },
    /// Enable an installed plugin
    Enable { id: String },
    /// Disable an installed plugin
    Disable { id: String },
    /// Uninstall a plugin
    Uninstall { id: String },
    /// Update one plugin, or every plugin with a newer version
    Update {
        id: Option<String>,
    },
    /// Check every plugin for updates
    CheckUpdates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = match &args.config_dir {
        Some(dir) => NexusConfig::load_from(dir)?,
        None => NexusConfig::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}", e);
            NexusConfig::default()
        }),
    };

    match args.command {
        Command::Demo => {
            let nexus = Orchestrator::builder().config(config).build()?;
            demo::run(&nexus).await?;
            nexus.shutdown().await;
        }
        Command::Plugins { action } => {
            let store = match &args.config_dir {
                Some(dir) => FileStore::new(dir.join("data")),
                None => FileStore::global()?,
            };
            let nexus = Orchestrator::new(
                config,
                Arc::new(HttpManifestSource::new()),
                Arc::new(DeclarativeModuleLoader::new()),
                Arc::new(store),
            )?;
            plugins::run(&nexus, action).await?;
            nexus.shutdown().await;
        }
    }

    Ok(())
}
