//! MePak CLI - Command-line interface for Mass Effect packages

pub mod commands;
pub mod progress;

use clap::{ArgAction, Parser};
use commands::Commands;
use tracing::Level;

#[derive(Parser)]
#[command(name = "mepak")]
#[command(about = "MePak: Unreal package tools for the Mass Effect trilogy", long_about = None)]
#[command(version)]
struct Cli {
    /// Log more detail about package I/O (-v open/save, -vv chunks and relocation)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Log level for the package engine's tracing output.
    fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Run the MePak CLI
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `info --json` output stays clean
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    cli.command.execute()?;

    Ok(())
}
