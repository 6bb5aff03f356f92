use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::PathBuf;

use super::DEFAULT_CONFIG;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Configuration file (.yaml, .json or .toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Host to bind (default: server.host from the config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (default: server.port from the config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Fail instead of writing a default config when the file is missing
    #[arg(long)]
    pub strict_config: bool,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    crate::server::start_server(args).await
}

/// Print the routes the server exposes
pub fn print_endpoints(host: &str, port: u16) {
    let base = format!("http://{}:{}", host, port);
    println!();
    println!("  {} Listening on {}", "▶".cyan(), base.yellow());
    println!("    {}  {}/health", "GET ".green(), base);
    println!("    {}  {}/api/tts?text=...", "GET ".green(), base);
    println!("    {}  {}/infer", "POST".green(), base);
    println!();
}
