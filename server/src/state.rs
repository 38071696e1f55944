//! Application state for the IDC inference server
//!
//! Holds the loaded Grad-CAM engine and server configuration.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use idc_gradcam::inference::DefaultEngine;
use idc_gradcam::DEFAULT_GRADCAM_LAYER;
use tracing::warn;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Model record (.mpk)
    pub model_path: PathBuf,
    /// Model config JSON; `None` means the file next to the record
    pub model_config: Option<PathBuf>,
    /// Convolutional layer explained by Grad-CAM
    pub gradcam_layer: String,
    /// Request body limit in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from("Model/idc_classifier.mpk"),
            model_config: None,
            gradcam_layer: DEFAULT_GRADCAM_LAYER.to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded engine; one inference runs at a time
    pub engine: Mutex<DefaultEngine>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, engine: DefaultEngine) -> Self {
        Self {
            config,
            engine: Mutex::new(engine),
            started_at: Instant::now(),
        }
    }

    /// Exclusive access to the engine
    ///
    /// The engine is never mutated, so a lock poisoned by a panicking
    /// request holds no broken state and is taken over.
    pub fn lock_engine(&self) -> MutexGuard<'_, DefaultEngine> {
        self.engine.lock().unwrap_or_else(|poisoned| {
            warn!("Inference engine lock was poisoned by an earlier panic; recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
