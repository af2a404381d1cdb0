//! Voz CLI - render, analyze, and stream monophonic vocals.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voz")]
#[command(author, version, about = "Voice analysis/resynthesis engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a note: analyze a vocal WAV, shift its pitch, resynthesize
    Render(commands::render::RenderArgs),

    /// Analyze a vocal WAV and print parameter stream statistics
    Analyze(commands::analyze::AnalyzeArgs),

    /// Render a note in streaming mode, chunk by chunk
    Stream(commands::stream::StreamArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?std::mem::discriminant(&cli.command), "dispatching command");

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Stream(args) => commands::stream::run(args),
    }
}
