//! Backend Selection
//!
//! Picks the numerical backend at compile time:
//! - CUDA when the `cuda` feature is enabled
//! - NdArray (CPU) otherwise
//!
//! Classification runs on the plain backend; Grad-CAM needs gradients with
//! respect to an internal layer, so it runs on the `Autodiff` wrapper.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// Backend used for Grad-CAM gradient capture
pub type GradBackend = Autodiff<DefaultBackend>;

/// Get the default device for the current backend
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    <DefaultBackend as Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
