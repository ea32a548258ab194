//! Clipforge CLI - Command-line interface
//!
//! Provides command-line access to Clipforge functionality.

mod commands;

use clap::Parser;
use clipforge_core::logging::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(about = "A media fetch-and-mux server")]
struct Cli {
    /// Console log verbosity
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // full debug logs on disk only for the long-running server
    let logs_dir = match &cli.command {
        commands::Commands::Serve { .. } => Some(std::path::Path::new("logs")),
        _ => None,
    };
    init_tracing(cli.log_level.as_tracing_level(), logs_dir)?;

    commands::handle_command(cli.command).await?;

    Ok(())
}
