//! # IDC Grad-CAM
//!
//! Invasive ductal carcinoma (IDC) classification of histopathology tiles with
//! Grad-CAM explanations, built on the Burn framework.
//!
//! ## Modules
//!
//! - `model`: the binary CNN classifier, its config and checkpoint I/O
//! - `gradcam`: gradient capture at a named conv layer and saliency maps
//! - `overlay`: jet colormap, blending and PNG/base64 encoding
//! - `inference`: the per-request pipeline (`GradCamEngine`)
//! - `api`: JSON wire types shared by the server and the client
//! - `client`: HTTP client and sample gallery used by the `idc` CLI
//! - `utils`: logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use idc_gradcam::inference::DefaultEngine;
//! use idc_gradcam::backend::default_device;
//!
//! let engine = DefaultEngine::load(
//!     "Model/idc_classifier.mpk".as_ref(),
//!     None,
//!     "separable_conv2d_1",
//!     default_device(),
//! )?;
//! let response = engine.respond(&std::fs::read("tile.png")?)?;
//! println!("{} ({})", response.prediction, response.malignant_probability);
//! ```

pub mod api;
pub mod backend;
pub mod client;
pub mod gradcam;
pub mod inference;
pub mod model;
pub mod overlay;
pub mod utils;

// Re-export commonly used items for convenience
pub use api::{ErrorResponse, LivenessResponse, PredictionResponse};
pub use client::{ConnectionStatus, IdcClient};
pub use gradcam::{GradCam, SaliencyMap};
pub use inference::{DefaultEngine, Diagnosis, GradCamEngine, Prediction};
pub use model::{IdcClassifier, IdcClassifierConfig, DEFAULT_GRADCAM_LAYER};
pub use utils::error::{IdcError, Result};

/// Crate version, reported by `/health`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
