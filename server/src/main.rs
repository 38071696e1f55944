//! IDC Inference Server
//!
//! HTTP API that classifies breast histopathology tiles as IDC positive
//! (malignant) or negative (benign) and returns a Grad-CAM overlay.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use idc_gradcam::backend::{backend_name, default_device};
use idc_gradcam::inference::DefaultEngine;
use idc_gradcam::utils::logging::{init_logging, LogConfig, LogLevel};
use idc_gradcam::{DEFAULT_GRADCAM_LAYER, VERSION};

use crate::state::{AppState, ServerConfig};

/// IDC Inference Server
#[derive(Parser, Debug)]
#[command(name = "idc-server")]
#[command(version)]
#[command(about = "HTTP API for IDC classification with Grad-CAM")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "IDC_PORT", default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "IDC_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Model record (.mpk)
    #[arg(short, long, env = "IDC_MODEL_PATH", default_value = "Model/idc_classifier.mpk")]
    model: PathBuf,

    /// Model config JSON (defaults to the file next to the record)
    #[arg(long, env = "IDC_MODEL_CONFIG")]
    model_config: Option<PathBuf>,

    /// Convolutional layer explained by Grad-CAM
    #[arg(long, env = "IDC_GRADCAM_LAYER", default_value = DEFAULT_GRADCAM_LAYER)]
    layer: String,

    /// Maximum upload size in MiB
    #[arg(long, env = "IDC_MAX_UPLOAD_MB", default_value = "16")]
    max_upload_mb: usize,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::production().with_level(LogLevel::parse(&cli.log_level));
    init_logging(&log_config).map_err(|e| anyhow::anyhow!(e))?;

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        model_path: cli.model,
        model_config: cli.model_config,
        gradcam_layer: cli.layer,
        max_upload_bytes: cli.max_upload_mb * 1024 * 1024,
    };

    info!("IDC Inference Server v{}", VERSION);
    info!("Configuration:");
    info!("  Model:       {:?}", config.model_path);
    info!("  Grad-CAM:    {}", config.gradcam_layer);
    info!("  Backend:     {}", backend_name());
    info!("  Max upload:  {} MiB", cli.max_upload_mb);

    // A missing model or unknown layer is fatal; no request could succeed
    let engine = DefaultEngine::load(
        &config.model_path,
        config.model_config.as_deref(),
        &config.gradcam_layer,
        default_device(),
    )
    .with_context(|| format!("Failed to load model from {:?}", config.model_path))?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config, engine));
    let app = routes::build_router(state);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
