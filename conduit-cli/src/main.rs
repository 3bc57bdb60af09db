//! Conduit CLI
//!
//! Command-line interface for interacting with a Conduit engine.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Conduit pipeline engine CLI", long_about = None)]
struct Cli {
    /// Engine URL
    #[arg(long, env = "CONDUIT_ENGINE_URL", default_value = "http://localhost:8080")]
    engine_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        engine_url: cli.engine_url,
    };

    handle_command(cli.command, &config).await
}
