//! Grad-CAM Engine
//!
//! Owns the loaded model and runs the per-request pipeline:
//! decode → resize → normalise → classify → Grad-CAM → overlay → encode.

use std::path::Path;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;
use tracing::{debug, info};

use super::preprocess::PreparedImage;
use super::predictor::{classify, Prediction};
use crate::api::PredictionResponse;
use crate::gradcam::{GradCam, SaliencyMap};
use crate::model::{self, IdcClassifier, IdcClassifierConfig};
use crate::overlay;
use crate::utils::error::Result;

/// Everything one pipeline run produces before encoding
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub prediction: Prediction,
    pub saliency: SaliencyMap,
    /// Overlay at the upload's original size
    pub overlay: RgbImage,
    /// Decoded upload
    pub original: RgbImage,
    pub elapsed_ms: f64,
}

impl PipelineOutput {
    /// Encode into the HTTP response body
    pub fn into_response(self) -> Result<PredictionResponse> {
        let gradcam = overlay::encode_png_base64(&self.overlay)?;
        Ok(PredictionResponse::new(&self.prediction, gradcam))
    }
}

/// Model plus Grad-CAM layer, loaded once and reused for every request
pub struct GradCamEngine<B: AutodiffBackend> {
    /// Autodiff copy used for gradient capture
    grad_model: IdcClassifier<B>,
    /// Plain copy used for classification
    classifier: IdcClassifier<B::InnerBackend>,
    gradcam: GradCam,
    config: IdcClassifierConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> GradCamEngine<B> {
    /// Wrap an already constructed model; fails if `layer_name` does not exist
    pub fn from_model(
        model: IdcClassifier<B>,
        config: IdcClassifierConfig,
        layer_name: &str,
        device: B::Device,
    ) -> Result<Self> {
        let gradcam = GradCam::new(&model, layer_name)?;
        let classifier = model.valid();

        Ok(Self {
            grad_model: model,
            classifier,
            gradcam,
            config,
            device,
        })
    }

    /// Load a model artifact and bind the Grad-CAM layer
    pub fn load(
        model_path: &Path,
        config_path: Option<&Path>,
        layer_name: &str,
        device: B::Device,
    ) -> Result<Self> {
        let config = model::resolve_config(model_path, config_path)?;
        let model = model::load_model::<B>(model_path, &config, &device)?;
        let engine = Self::from_model(model, config, layer_name, device)?;

        info!(
            "Grad-CAM engine ready: layer '{}', input {}x{}",
            engine.layer_name(),
            engine.input_size(),
            engine.input_size()
        );
        Ok(engine)
    }

    /// Name of the explained layer
    pub fn layer_name(&self) -> &str {
        self.gradcam.layer().name()
    }

    /// Square input size of the model
    pub fn input_size(&self) -> usize {
        self.config.input_size
    }

    pub fn config(&self) -> &IdcClassifierConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Run the full pipeline on raw upload bytes
    pub fn run(&self, bytes: &[u8]) -> Result<PipelineOutput> {
        let start = Instant::now();

        let prepared = PreparedImage::from_bytes(bytes, self.input_size())?;
        let (width, height) = prepared.original_dimensions();
        debug!("Decoded {}x{} upload", width, height);

        let input = prepared.to_tensor::<B::InnerBackend>(&self.device);
        let probability = classify(&self.classifier, input)?;
        let prediction = Prediction::from_probability(probability)?;
        debug!("Classified: p = {:.4} ({})", probability, prediction.diagnosis);

        let grad_input = prepared.to_tensor::<B>(&self.device);
        let (_, saliency) = self.gradcam.generate(&self.grad_model, grad_input)?;
        debug!(
            "Saliency map {}x{} from '{}'",
            saliency.width(),
            saliency.height(),
            self.layer_name()
        );

        let overlay = overlay::render_for_upload(&prepared.resized, &saliency, width, height);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(PipelineOutput {
            prediction,
            saliency,
            overlay,
            original: prepared.original,
            elapsed_ms,
        })
    }

    /// Run the pipeline and encode the HTTP response body
    pub fn respond(&self, bytes: &[u8]) -> Result<PredictionResponse> {
        self.run(bytes)?.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradcam::DEFAULT_EPSILON;
    use crate::utils::error::IdcError;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Param;
    use burn::nn::conv::Conv2d;
    use burn::nn::Linear;
    use burn::tensor::Tensor;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn small_config() -> IdcClassifierConfig {
        IdcClassifierConfig {
            input_size: 32,
            conv_filters: vec![4, 8, 8],
            hidden_units: 8,
            ..Default::default()
        }
    }

    fn engine() -> GradCamEngine<TestBackend> {
        let device = Default::default();
        let config = small_config();
        let model = IdcClassifier::new(&config, &device);
        GradCamEngine::from_model(model, config, "separable_conv2d_1", device).unwrap()
    }

    fn fill_conv(conv: &mut Conv2d<TestBackend>, value: f32) {
        let device = conv.weight.device();
        conv.weight = Param::from_tensor(Tensor::full(conv.weight.dims(), value, &device));
        conv.bias = conv
            .bias
            .take()
            .map(|bias| Param::from_tensor(bias.val().zeros_like()));
    }

    fn fill_linear(linear: &mut Linear<TestBackend>, value: f32) {
        let device = linear.weight.device();
        linear.weight = Param::from_tensor(Tensor::full(linear.weight.dims(), value, &device));
        linear.bias = linear
            .bias
            .take()
            .map(|bias| Param::from_tensor(bias.val().zeros_like()));
    }

    /// Small model with positive constant weights and zero biases: every
    /// activation on a positive image is positive, so every channel gets a
    /// positive Grad-CAM weight and the logit stays away from saturation.
    fn constant_engine() -> GradCamEngine<TestBackend> {
        let device = Default::default();
        let config = small_config();
        let mut model = IdcClassifier::<TestBackend>::new(&config, &device);

        for block in model.blocks.iter_mut() {
            if let Some(depthwise) = block.depthwise.as_mut() {
                fill_conv(depthwise, 0.2);
            }
            fill_conv(&mut block.pointwise, 0.2);
        }
        fill_linear(&mut model.dense, 0.01);
        fill_linear(&mut model.output, 0.1);

        GradCamEngine::from_model(model, config, "separable_conv2d_1", device).unwrap()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 3) as u8, (y * 5) as u8, ((x + y) % 256) as u8])
        });
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Jpeg).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_pipeline_output_matches_upload_size() {
        let engine = engine();
        let output = engine.run(&jpeg_bytes(70, 45)).unwrap();

        assert_eq!(output.overlay.dimensions(), (70, 45));
        assert_eq!(output.original.dimensions(), (70, 45));
        assert_eq!((output.saliency.width(), output.saliency.height()), (8, 8));
        assert!(output
            .saliency
            .values()
            .iter()
            .all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_classifier_and_gradient_pass_agree() {
        let engine = engine();
        let prepared = PreparedImage::from_bytes(&jpeg_bytes(32, 32), 32).unwrap();

        let plain = classify(&engine.classifier, prepared.to_tensor(engine.device())).unwrap();
        let (grad_p, _) = engine
            .gradcam
            .clone()
            .with_epsilon(DEFAULT_EPSILON)
            .generate(&engine.grad_model, prepared.to_tensor(engine.device()))
            .unwrap();

        assert!((plain - grad_p).abs() < 1e-5);
    }

    #[test]
    fn test_respond_encodes_overlay() {
        let engine = engine();
        let response = engine.respond(&jpeg_bytes(256, 256)).unwrap();

        let sum = response.malignant_probability + response.benign_probability;
        assert!((sum - 1.0).abs() < 1e-6);

        let decoded = overlay::decode_png_base64(&response.gradcam).unwrap();
        assert_eq!(decoded.dimensions(), (256, 256));
    }

    #[test]
    fn test_non_image_is_decode_error() {
        let engine = engine();
        let result = engine.run(b"%PDF-1.4 not an image");
        assert!(matches!(result, Err(IdcError::Decode(_))));
    }

    #[test]
    fn test_unknown_layer_fails_at_construction() {
        let device = Default::default();
        let config = small_config();
        let model = IdcClassifier::<TestBackend>::new(&config, &device);
        let result = GradCamEngine::from_model(model, config, "block5_conv3", device);
        assert!(matches!(result, Err(IdcError::LayerNotFound { .. })));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("idc.mpk");
        let device = Default::default();
        let config = small_config();

        let model = model::init_model::<TestBackend>(&config, 42, &device).unwrap();
        model::save_model(&model, &config, &path).unwrap();

        let engine =
            GradCamEngine::<TestBackend>::load(&path, None, "separable_conv2d", device).unwrap();
        assert_eq!(engine.layer_name(), "separable_conv2d");
        assert_eq!(engine.input_size(), 32);
    }

    #[test]
    fn test_saliency_is_normalised_for_positive_model() {
        let engine = constant_engine();
        let image = RgbImage::from_pixel(48, 48, Rgb([200, 120, 160]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();

        let output = engine.run(&buffer.into_inner()).unwrap();
        let values = output.saliency.values();

        assert!((output.saliency.max() - 1.0).abs() < 1e-4);
        assert!(values.iter().all(|v| *v > 0.0 && *v <= 1.0));
        assert!(output.prediction.raw_probability > 0.5);
        assert!(output.prediction.raw_probability < 0.99);
        assert_eq!(output.overlay.dimensions(), (48, 48));
    }
}
