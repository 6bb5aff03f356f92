//! Generate command implementation
//!
//! Provides `tts-pipeline-cli generate` for one-off synthesis.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::time::Duration;
use tts_pipeline::{Config, EnginePipeline, SynthesisRequest, VocoderAdapter};

use super::DEFAULT_CONFIG;
use crate::reference;

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Text to synthesize
    pub text: String,

    /// Reference audio for voice conditioning. Can be:
    /// - Path to a .wav file
    /// - HuggingFace URL: hf://owner/repo/file.wav
    /// - Base64 audio: data:audio/wav;base64,...
    pub reference_audio: Option<String>,

    /// Language tag (e.g. en-us)
    pub language: Option<String>,

    /// Output WAV path (default: generated name under the output directory)
    pub output_file: Option<PathBuf>,

    /// Configuration file (.yaml, .json or .toml), created with defaults if missing
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Output sample rate in Hz (default: audio.sample_rate from the config)
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Print styled message (respects quiet mode)
macro_rules! info {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let quiet = args.quiet;

    if !quiet {
        print_banner();
    }

    let config = Config::load_or_init(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    crate::logging::init(if quiet { "error" } else { config.logging.filter.as_str() });

    info!(
        quiet,
        "{} Loading {:?} engine...",
        "▶".cyan(),
        config.engine.kind
    );
    let pipeline =
        EnginePipeline::from_config(&config).context("Failed to load synthesis engines")?;
    info!(
        quiet,
        "  {} Engine loaded (sample rate: {}Hz)",
        "✓".green(),
        pipeline.vocoder().sample_rate()
    );

    let reference = args
        .reference_audio
        .as_deref()
        .filter(|spec| !spec.trim().is_empty())
        .map(|spec| reference::resolve(&config, spec))
        .transpose()?;

    let mut request = SynthesisRequest::new(args.text.as_str())?
        .with_sample_rate(args.sample_rate.unwrap_or(config.audio.sample_rate));
    if let Some(reference) = &reference {
        info!(
            quiet,
            "{} Using reference: {}",
            "▶".cyan(),
            reference.path().display().yellow()
        );
        request = request.with_reference_audio(reference.path());
    }
    if let Some(language) = &args.language {
        request = request.with_language(language.as_str());
    }

    info!(
        quiet,
        "{} Generating: \"{}\"",
        "▶".cyan(),
        truncate_text(&args.text, 60).italic()
    );

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")?);
        pb.set_message("synthesizing...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let result = match &args.output_file {
        Some(path) => pipeline.synthesize_to(&request, path),
        None => pipeline.synthesize(&request),
    };
    pb.finish_and_clear();
    let result = result?;

    if !quiet {
        println!();
        println!(
            "  {} {}",
            "✓".green().bold(),
            "Audio generated successfully!".green().bold()
        );
        println!(
            "    Duration: {:.2}s ({} samples @ {}Hz)",
            result.audio.duration_secs(),
            result.audio.len(),
            result.audio.sample_rate
        );
        println!("    Output:   {}", result.output_path.display().cyan());
        println!();
        println!(
            "  {}",
            format!("Play with: ffplay -autoexit {:?}", result.output_path).dimmed()
        );
    }

    Ok(())
}

/// Print startup banner
fn print_banner() {
    println!();
    println!("  {}", "tts-pipeline".bold().cyan());
    println!(
        "      {}",
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!();
}

/// Truncate text for display
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 60), "short");
        assert_eq!(truncate_text("abcdefghij", 8), "abcde...");
        // multi-byte characters must not be split
        assert_eq!(truncate_text("ééééé", 4), "é...");
    }

    #[test]
    fn test_positional_arguments() {
        let args = GenerateArgs::try_parse_from([
            "generate",
            "Hello there",
            "voice.wav",
            "en-us",
            "out.wav",
        ])
        .unwrap();
        assert_eq!(args.text, "Hello there");
        assert_eq!(args.reference_audio.as_deref(), Some("voice.wav"));
        assert_eq!(args.language.as_deref(), Some("en-us"));
        assert_eq!(args.output_file, Some(PathBuf::from("out.wav")));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));
        assert!(!args.quiet);
    }
}
