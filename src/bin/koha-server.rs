//! Koha server binary
//!
//! Hosts the package catalog, or publishes a file into it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use koha::{Catalog, Server, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "koha-server")]
#[command(about = "Package distribution server", long_about = None)]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, default_value = "koha.toml")]
    config: PathBuf,

    /// Override the bind address from the configuration
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the catalog (default)
    Serve,
    /// Publish a file under a package name
    Publish {
        /// Package name
        name: String,
        /// File to publish
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load_or_create(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    env_logger::Builder::from_env(
        Env::default().default_filter_or(config.server.log_level.as_str()),
    )
    .init();

    let catalog = Catalog::open(&config.server.storage)
        .with_context(|| format!("Failed to open catalog at {:?}", config.server.storage))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Publish { name, file } => {
            let digest = catalog
                .publish_file(&name, &file)
                .with_context(|| format!("Failed to publish {:?}", file))?;
            println!("{}  {}", digest, name);
            Ok(())
        }
        Command::Serve => {
            for package in &config.packages {
                catalog
                    .publish_file(&package.name, &package.file)
                    .with_context(|| {
                        format!("Failed to host {:?} from {:?}", package.name, package.file)
                    })?;
            }

            let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());
            log::info!("Starting Koha server v{}", koha::protocol::VERSION);
            log::info!("  Bind address: {}", bind);
            log::info!("  Storage path: {:?}", config.server.storage);

            Server::new(Arc::new(catalog))
                .run(&bind, shutdown_signal())
                .await
                .with_context(|| format!("Server error on {}", bind))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
