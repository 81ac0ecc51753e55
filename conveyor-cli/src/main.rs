//! Conveyor CLI
//!
//! Command-line interface for creating, inspecting and cancelling jobs.

mod commands;
mod config;
mod id_resolver;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Conveyor job pipeline CLI", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(long, env = "CONVEYOR_SERVER_URL", default_value = "http://localhost:8080")]
    server_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        server_url: cli.server_url,
    };

    handle_command(cli.command, &config).await
}
