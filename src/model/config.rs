//! Model Configuration Module
//!
//! Architecture hyper-parameters of the IDC classifier. They are stored as
//! JSON next to the weight record so a model artifact can be rebuilt with the
//! same shape it was saved with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{IdcError, Result};

/// Configuration for the IDC classifier CNN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdcClassifierConfig {
    /// Input image size (width and height, assumed square)
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    pub in_channels: usize,

    /// Output filters of each convolutional block
    pub conv_filters: Vec<usize>,

    /// Index of the first depthwise-separable block; earlier blocks are plain convolutions
    pub separable_from: usize,

    /// Kernel size for convolutional layers
    pub kernel_size: usize,

    /// Units in the hidden dense layer
    pub hidden_units: usize,
}

impl Default for IdcClassifierConfig {
    fn default() -> Self {
        Self {
            input_size: 128,
            in_channels: 3,
            conv_filters: vec![32, 64, 128],
            separable_from: 1,
            kernel_size: 3,
            hidden_units: 64,
        }
    }
}

impl IdcClassifierConfig {
    /// Create a configuration for a given input size
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 {
            return Err(IdcError::Config("in_channels must be greater than 0".to_string()));
        }

        if self.conv_filters.is_empty() {
            return Err(IdcError::Config(
                "conv_filters must have at least one layer".to_string(),
            ));
        }

        if self.conv_filters.contains(&0) {
            return Err(IdcError::Config("conv_filters must be non-zero".to_string()));
        }

        // Every block halves the spatial size
        let divisor = u32::try_from(self.conv_filters.len())
            .ok()
            .and_then(|blocks| 1usize.checked_shl(blocks))
            .ok_or_else(|| {
                IdcError::Config(format!(
                    "{} convolutional blocks is too deep",
                    self.conv_filters.len()
                ))
            })?;
        if self.input_size == 0 || self.input_size % divisor != 0 {
            return Err(IdcError::Config(format!(
                "input_size must be a positive multiple of {}",
                divisor
            )));
        }

        if self.kernel_size < 1 || self.kernel_size % 2 == 0 {
            return Err(IdcError::Config(
                "kernel_size must be a positive odd number".to_string(),
            ));
        }

        if self.hidden_units == 0 {
            return Err(IdcError::Config("hidden_units must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IdcError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| IdcError::Config(format!("Invalid config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Conventional config location for a model record: same stem, `.json`
    pub fn path_for_model(model_path: &Path) -> PathBuf {
        model_path.with_extension("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = IdcClassifierConfig::default();
        assert_eq!(config.input_size, 128);
        assert_eq!(config.conv_filters, vec![32, 64, 128]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = IdcClassifierConfig::default();
        config.conv_filters.clear();
        assert!(config.validate().is_err());

        config = IdcClassifierConfig::default();
        config.input_size = 100; // not a multiple of 8
        assert!(config.validate().is_err());

        config = IdcClassifierConfig::default();
        config.kernel_size = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_too_many_blocks_is_config_error() {
        let config = IdcClassifierConfig {
            conv_filters: vec![8; 64],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IdcError::Config(_))));

        let config = IdcClassifierConfig {
            conv_filters: vec![8; 200],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(IdcError::Config(_))));
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");

        let config = IdcClassifierConfig::new(64);
        config.save(&path).unwrap();

        let loaded = IdcClassifierConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_path_for_model() {
        let path = IdcClassifierConfig::path_for_model(Path::new("Model/idc.mpk"));
        assert_eq!(path, PathBuf::from("Model/idc.json"));
    }
}
