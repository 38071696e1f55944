//! Error Handling Module
//!
//! Defines the error type shared by the model, Grad-CAM pipeline and client.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for IDC Grad-CAM operations
#[derive(Error, Debug)]
pub enum IdcError {
    /// Uploaded bytes could not be decoded as an image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Model construction, loading or forward pass failed
    #[error("Model error: {0}")]
    Model(String),

    /// The configured Grad-CAM layer does not exist in the model
    #[error("Layer '{layer}' not found in model (available: {})", available.join(", "))]
    LayerNotFound {
        layer: String,
        available: Vec<String>,
    },

    /// Gradient or saliency computation produced an unusable result
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Encoding the overlay to PNG/base64 failed
    #[error("Encoding error: {0}")]
    Encode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure talking to the inference service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The inference service answered with a non-success status
    #[error("Backend returned status {0}")]
    Backend(u16),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience Result type for IDC Grad-CAM operations
pub type Result<T> = std::result::Result<T, IdcError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| IdcError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| IdcError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| IdcError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| IdcError::InvalidInput(f()))
    }
}
