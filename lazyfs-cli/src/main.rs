//! Lazyfs CLI - Command-line interface
//!
//! Runs request scripts, generates random ones and replays built-in
//! scenarios through the lazyfs coordinator.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use lazyfs_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "lazyfs")]
#[command(about = "Simulates many users sharing a fixed set of files")]
struct Cli {
    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full debug log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.into(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await
}
