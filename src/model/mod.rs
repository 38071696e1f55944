//! Model module for the IDC classifier built with the Burn framework
//!
//! This module provides:
//! - The CNN architecture with named feature layers
//! - Model configuration
//! - Loading and saving model artifacts (full-precision `.mpk` records)

pub mod cnn;
pub mod config;

use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use tracing::{info, warn};

use crate::utils::error::{IdcError, Result};

// Re-export main types for convenience
pub use cnn::{FeatureLayer, IdcClassifier};
pub use config::IdcClassifierConfig;

/// Record format of model artifacts; weights are kept as f32 so a reloaded
/// model reproduces the saved one exactly
pub type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Layer Grad-CAM explains by default (the last separable block)
pub const DEFAULT_GRADCAM_LAYER: &str = "separable_conv2d_1";

/// Resolve the architecture config for a model record
///
/// Uses `config_path` when given, otherwise the JSON file next to the record,
/// falling back to defaults when neither exists.
pub fn resolve_config(model_path: &Path, config_path: Option<&Path>) -> Result<IdcClassifierConfig> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                return Err(IdcError::PathNotFound(path.to_path_buf()));
            }
            IdcClassifierConfig::load(path)
        }
        None => {
            let sibling = IdcClassifierConfig::path_for_model(model_path);
            if sibling.exists() {
                IdcClassifierConfig::load(&sibling)
            } else {
                warn!("No model config at {:?}, using defaults", sibling);
                Ok(IdcClassifierConfig::default())
            }
        }
    }
}

/// Load a model record from disk
pub fn load_model<B: Backend>(
    model_path: &Path,
    config: &IdcClassifierConfig,
    device: &B::Device,
) -> Result<IdcClassifier<B>> {
    config.validate()?;

    let record_path = model_path.with_extension("mpk");
    if !record_path.exists() {
        return Err(IdcError::PathNotFound(record_path));
    }

    let model: IdcClassifier<B> = IdcClassifier::new(config, device);
    let recorder = ModelRecorder::new();

    let model = model
        .load_file(model_path, &recorder, device)
        .map_err(|e| IdcError::Model(format!("Failed to load model: {:?}", e)))?;

    info!("Loaded model from {:?}", record_path);
    Ok(model)
}

/// Save a model record and its config next to it
pub fn save_model<B: Backend>(
    model: &IdcClassifier<B>,
    config: &IdcClassifierConfig,
    model_path: &Path,
) -> Result<()> {
    if let Some(parent) = model_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let recorder = ModelRecorder::new();
    model
        .clone()
        .save_file(model_path, &recorder)
        .map_err(|e| IdcError::Model(format!("Failed to save model: {:?}", e)))?;

    config.save(&IdcClassifierConfig::path_for_model(model_path))?;

    info!("Saved model to {:?}", model_path.with_extension("mpk"));
    Ok(())
}

/// Create a randomly initialised model
///
/// There is no training in this crate; this produces an artifact with the
/// right shape for smoke tests and demos.
pub fn init_model<B: Backend>(
    config: &IdcClassifierConfig,
    seed: u64,
    device: &B::Device,
) -> Result<IdcClassifier<B>> {
    config.validate()?;
    B::seed(seed);
    Ok(IdcClassifier::new(config, device))
}
