//! Grad-CAM: Gradient-weighted Class Activation Mapping
//!
//! Explains a prediction by weighting the feature map of one convolutional
//! layer with the gradient of the malignant probability flowing into it.
//!
//! The gradient is captured by cutting the network at the chosen layer: the
//! feature map is detached and marked as requiring gradients, so it becomes a
//! leaf of a fresh autodiff graph that covers only the rest of the network.

use burn::tensor::activation::sigmoid;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use tracing::debug;

use crate::model::{FeatureLayer, IdcClassifier};
use crate::utils::error::{IdcError, Result};

/// Added to the maximum before normalising so an all-zero map stays zero
pub const DEFAULT_EPSILON: f32 = 1e-8;

/// Single-channel saliency map with values in [0, 1], row-major
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl SaliencyMap {
    /// Build a map from row-major values
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 || values.len() != width * height {
            return Err(IdcError::Numerical(format!(
                "saliency map of {}x{} cannot hold {} values",
                width,
                height,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at column `x`, row `y`
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Largest value in the map
    pub fn max(&self) -> f32 {
        self.values.iter().cloned().fold(0.0, f32::max)
    }
}

/// Tensors captured from one forward/backward pass
#[derive(Debug, Clone)]
pub struct GradCamCapture<B: Backend> {
    /// Feature map of the chosen layer `[1, C, H', W']`
    pub features: Tensor<B, 4>,
    /// Gradient of the probability w.r.t. the feature map, same shape
    pub gradients: Tensor<B, 4>,
    /// Malignant probability computed on the same pass
    pub probability: f32,
}

/// Run the network split at `layer` and collect features and their gradients
pub fn capture<B: AutodiffBackend>(
    model: &IdcClassifier<B>,
    input: Tensor<B, 4>,
    layer: &FeatureLayer,
) -> Result<GradCamCapture<B::InnerBackend>> {
    let features = model
        .forward_features(input, layer)
        .detach()
        .require_grad();

    let probability = sigmoid(model.forward_head(features.clone(), layer));
    let grads = probability.clone().sum().backward();

    let gradients = features.grad(&grads).ok_or_else(|| {
        IdcError::Numerical(format!(
            "no gradient reached layer '{}'",
            layer.name()
        ))
    })?;

    let probability: f32 = probability.inner().into_scalar().elem();

    Ok(GradCamCapture {
        features: features.inner(),
        gradients,
        probability,
    })
}

/// Reduce a feature map and its gradient into a normalised saliency map
///
/// 1. mean of the gradient over the spatial axes gives one weight per channel
/// 2. weighted sum of the feature channels
/// 3. ReLU
/// 4. divide by `max + epsilon`
pub fn grad_cam<B: Backend>(
    features: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
    epsilon: f32,
) -> Result<SaliencyMap> {
    let dims = features.dims();
    if gradients.dims() != dims {
        return Err(IdcError::Numerical(format!(
            "gradient shape {:?} does not match feature shape {:?}",
            gradients.dims(),
            dims
        )));
    }

    let [batch, channels, height, width] = dims;
    if batch != 1 {
        return Err(IdcError::Numerical(format!(
            "expected a single image, got a batch of {}",
            batch
        )));
    }

    // [1, C, H, W] -> [1, C, 1, 1]
    let weights = gradients.mean_dim(3).mean_dim(2);

    // [1, C, H, W] * [1, C, 1, 1] -> [1, 1, H, W]
    let cam = (features * weights).sum_dim(1).clamp_min(0.0);

    let max: f32 = cam.clone().max().into_scalar().elem();
    let cam = cam.div_scalar(max + epsilon);

    let values: Vec<f32> = cam
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| IdcError::Numerical(format!("failed to read saliency map: {:?}", e)))?;

    if values.iter().any(|v| !v.is_finite()) {
        return Err(IdcError::Numerical(
            "saliency map contains non-finite values".to_string(),
        ));
    }

    debug!(
        "Grad-CAM over {} channels, {}x{} map, raw max {:.6}",
        channels, width, height, max
    );

    SaliencyMap::new(width, height, values)
}

/// Grad-CAM generator bound to one layer of a model
#[derive(Debug, Clone)]
pub struct GradCam {
    layer: FeatureLayer,
    epsilon: f32,
}

impl GradCam {
    /// Resolve `layer_name` against the model; unknown names fail here
    pub fn new<B: Backend>(model: &IdcClassifier<B>, layer_name: &str) -> Result<Self> {
        Ok(Self {
            layer: model.feature_layer(layer_name)?,
            epsilon: DEFAULT_EPSILON,
        })
    }

    /// Override the normalisation epsilon
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn layer(&self) -> &FeatureLayer {
        &self.layer
    }

    /// Compute the saliency map for one normalised image `[1, 3, H, W]`
    ///
    /// Returns the probability seen on the gradient pass alongside the map.
    pub fn generate<B: AutodiffBackend>(
        &self,
        model: &IdcClassifier<B>,
        input: Tensor<B, 4>,
    ) -> Result<(f32, SaliencyMap)> {
        let captured = capture(model, input, &self.layer)?;
        let map = grad_cam(captured.features, captured.gradients, self.epsilon)?;
        Ok((captured.probability, map))
    }
}
