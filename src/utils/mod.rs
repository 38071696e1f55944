//! Utilities module for logging, error handling and small helpers
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{IdcError, Result, ResultExt};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Round a probability to three decimal places
pub fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Format a duration in milliseconds in a human-readable way
pub fn format_millis(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}
