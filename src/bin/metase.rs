//! CLI binary for metase.

use clap::{Parser, Subcommand};
use metase::{MetaseConfig, Server};
use std::path::PathBuf;

/// metase: distributed metasearch service.
#[derive(Parser)]
#[command(name = "metase", about)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start the server.
    Run(RunArgs),

    /// Print the version and exit.
    Version,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, e.g. `info` or `debug`. Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Bind address. Overrides the config file.
    #[arg(long)]
    host: Option<String>,

    /// Bind port. Overrides the config file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Version => {
            println!("metase version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => MetaseConfig::from_file(path)?,
        None => MetaseConfig::default(),
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(file) = args.log_file {
        config.log_file = Some(file);
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let _log_guard = metase::logging::init(Some(&config.log_level), config.log_file.as_deref());
    if let Some(path) = &args.config {
        tracing::info!(path = %path.display(), "loaded configuration");
    }

    let server = Server::bind(&config).await?;
    server.serve().await?;
    Ok(())
}
