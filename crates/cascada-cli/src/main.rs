//! Cascada CLI - drive any output backend from the command line.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cascada")]
#[command(author, version, about = "Cascada output device CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play (or render) a sine tone through an output backend
    Tone(commands::tone::ToneArgs),

    /// Open a device and report what was negotiated
    Probe(commands::probe::ProbeArgs),

    /// Show or create an output configuration file
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tone(args) => commands::tone::run(args),
        Commands::Probe(args) => commands::probe::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
