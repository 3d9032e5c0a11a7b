//! Mochi: command-line client for a Koha server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use koha::{Client, ClientConfig, ClientError, ClientSettings};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "mochi")]
#[command(about = "Fetch packages from a Koha server", long_about = None)]
struct Cli {
    /// Configuration file (defaults to mochi.toml next to the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ping the server
    Touch,
    /// Compare client and server versions
    Version,
    /// List available packages
    List,
    /// Fetch a package into the working directory
    Fetch {
        /// Package name
        package: String,
    },
    /// Set the API token
    Token {
        token: String,
    },
    /// Set the server URL
    Server {
        url: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => match e.downcast_ref::<ClientError>() {
            Some(client_error) => {
                eprintln!("Error: {}", client_error);
                client_error.exit_code()
            }
            None => {
                eprintln!("Error: {:#}", e);
                1
            }
        },
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = ClientConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    match cli.command {
        Command::Token { token } => {
            config.token = Some(token);
            config.save(&config_path)?;
            println!("Token updated");
            return Ok(());
        }
        Command::Server { url } => {
            config.server = url;
            config.save(&config_path)?;
            println!("Server updated -> {}", config.server);
            return Ok(());
        }
        _ => {}
    }

    let client = Client::new(ClientSettings::from(&config))?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        match cli.command {
            Command::Touch => {
                client.touch().await?;
                println!("Server online: {}", client.base_url());
            }
            Command::Version => {
                let server = client.version().await?;
                let local = koha::protocol::VERSION;
                if server != local {
                    return Err(ClientError::Protocol(format!(
                        "version mismatch: local {}, server {}",
                        local, server
                    ))
                    .into());
                }
                println!("Version match: {}", local);
            }
            Command::List => {
                let records = client.list().await?;
                if records.is_empty() {
                    println!("No packages found");
                }
                for record in records {
                    println!("{}  {}  {}", record.name, record.digest, record.size);
                }
            }
            Command::Fetch { package } => {
                let cwd = std::env::current_dir().context("Failed to read working directory")?;
                println!("Fetching {}", package);
                let fetched = client.fetch(&package, &cwd).await?;
                println!(
                    "Done -> {} ({} bytes, sha1 {})",
                    fetched.path.display(),
                    fetched.size,
                    fetched.digest
                );
            }
            Command::Token { .. } | Command::Server { .. } => {}
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join("mochi.toml"))
}
