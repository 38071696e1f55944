//! Sample Gallery
//!
//! A fixed set of example tissue images the user can send instead of
//! uploading their own: every jpg/jpeg/png file directly inside a directory.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::inference::IMAGE_EXTENSIONS;
use crate::utils::error::{IdcError, Result, ResultExt};

/// Default gallery location, relative to the working directory
pub const DEFAULT_SAMPLES_DIR: &str = "samples";

/// One gallery entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleImage {
    /// File name, used as the selection key
    pub name: String,
    pub path: PathBuf,
}

impl SampleImage {
    /// Read the image bytes
    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }
}

/// Images available for selection, sorted by name
#[derive(Debug, Clone)]
pub struct SampleGallery {
    pub dir: PathBuf,
    pub samples: Vec<SampleImage>,
}

/// Whether a path has one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl SampleGallery {
    /// Scan `dir` (non-recursively) for sample images
    pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(IdcError::PathNotFound(dir));
        }

        let mut samples: Vec<SampleImage> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
            .map(|e| SampleImage {
                name: e.file_name().to_string_lossy().to_string(),
                path: e.path().to_path_buf(),
            })
            .collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Found {} sample images in {:?}", samples.len(), dir);
        Ok(Self { dir, samples })
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Look up a sample by file name
    pub fn find(&self, name: &str) -> Result<&SampleImage> {
        self.samples
            .iter()
            .find(|s| s.name == name)
            .with_context(|| format!("No sample named '{}' in {:?}", name, self.dir))
    }
}
