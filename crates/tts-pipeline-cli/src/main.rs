//! tts-pipeline CLI
//!
//! Text-to-speech from the command line or over HTTP.

use anyhow::Result;
use clap::Parser;

use tts_pipeline_cli::commands;

/// tts-pipeline - text-to-speech with optional reference-voice conditioning
#[derive(Parser)]
#[command(
    name = "tts-pipeline-cli",
    author,
    version,
    about = "Text-to-speech synthesis pipeline",
    long_about = "Turns text into a WAV file through a configurable model and vocoder.\n\n\
                  Run one-off synthesis with `generate` or expose the pipeline\n\
                  over HTTP with `serve`."
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Generate audio from text
    ///
    /// Synthesizes speech for TEXT and writes it to OUTPUT_FILE, or to a
    /// generated name under the configured output directory.
    Generate(commands::generate::GenerateArgs),

    /// Start the HTTP API server
    ///
    /// Serves /health, /api/tts and /infer.
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        // Generate is CPU-bound, run synchronously
        Commands::Generate(cmd_args) => commands::generate::run(cmd_args),
        Commands::Serve(cmd_args) => commands::serve::run(cmd_args).await,
    }
}
