//! Inference module: the per-request prediction pipeline
//!
//! This module provides:
//! - Decoding and normalising uploads
//! - The malignant/benign decision rule
//! - `GradCamEngine`, which ties classification, Grad-CAM and overlay
//!   rendering together behind one call

pub mod engine;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use engine::{GradCamEngine, PipelineOutput};
pub use predictor::{classify, Diagnosis, Prediction, DECISION_THRESHOLD};
pub use preprocess::PreparedImage;

/// Engine on the compile-time default backend
pub type DefaultEngine = GradCamEngine<crate::backend::GradBackend>;

/// Upload extensions accepted by the client and the sample gallery
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
