//! HTTP API Server
//!
//! Axum-based server exposing the synthesis pipeline.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::{info, warn};
use tts_pipeline::{Config, EnginePipeline, VocoderAdapter};

use crate::commands::serve::{ServeArgs, print_endpoints};

pub mod handlers;
pub mod routes;
pub mod state;

pub async fn start_server(args: ServeArgs) -> Result<()> {
    let mut config = if args.strict_config {
        Config::load(&args.config)
    } else {
        Config::load_or_init(&args.config)
    }
    .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    crate::logging::init(&config.logging.filter);

    // Engines load once; a failure here is fatal
    info!(engine = ?config.engine.kind, "Loading synthesis engines");
    let pipeline =
        EnginePipeline::from_config(&config).context("Failed to load synthesis engines")?;
    println!(
        "  {} Engines loaded (sample rate: {}Hz)",
        "✓".green(),
        pipeline.vocoder().sample_rate()
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    print_endpoints(&config.server.host, config.server.port);

    let ctx = state::ServerContext::new(pipeline, config);
    let app = routes::create_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
