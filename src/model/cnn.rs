//! CNN Model Architecture for IDC Classification
//!
//! A small convolutional network producing one sigmoid output: the probability
//! that a tissue patch shows invasive ductal carcinoma. The first block is a
//! plain convolution, the following ones are depthwise-separable. Each block
//! is addressable by name so Grad-CAM can split the network at it.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

use super::config::IdcClassifierConfig;
use crate::utils::error::{IdcError, Result};

/// Naming prefix for plain convolution blocks
const CONV_PREFIX: &str = "conv2d";
/// Naming prefix for depthwise-separable blocks
const SEPARABLE_PREFIX: &str = "separable_conv2d";

/// A convolutional block: (depthwise) conv, pointwise/plain conv, ReLU, MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    /// Present for separable blocks only
    pub depthwise: Option<Conv2d<B>>,
    /// 1x1 projection for separable blocks, full kxk conv for plain blocks
    pub pointwise: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a plain convolution block
    pub fn plain(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            depthwise: None,
            pointwise: conv,
            relu: Relu::new(),
            pool: Self::pool(),
        }
    }

    /// Create a depthwise-separable convolution block
    pub fn separable(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let depthwise = Conv2dConfig::new([in_channels, in_channels], [kernel_size, kernel_size])
            .with_groups(in_channels)
            .with_padding(PaddingConfig2d::Same)
            .with_bias(false)
            .init(device);

        let pointwise = Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device);

        Self {
            depthwise: Some(depthwise),
            pointwise,
            relu: Relu::new(),
            pool: Self::pool(),
        }
    }

    fn pool() -> MaxPool2d {
        MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
    }

    /// Whether this block is depthwise-separable
    pub fn is_separable(&self) -> bool {
        self.depthwise.is_some()
    }

    /// Convolution and activation; this is the block's feature map
    pub fn activate(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.depthwise {
            Some(depthwise) => depthwise.forward(x),
            None => x,
        };
        let x = self.pointwise.forward(x);
        self.relu.forward(x)
    }

    /// Forward pass through the whole block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.pool.forward(self.activate(x))
    }
}

/// A block of the network selected by name, used to split forward passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayer {
    index: usize,
    name: String,
}

impl FeatureLayer {
    /// Block index inside the network
    pub fn index(&self) -> usize {
        self.index
    }

    /// Layer name (e.g. `separable_conv2d_1`)
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// IDC Classifier CNN
///
/// Architecture:
/// - 1 plain conv block, then depthwise-separable blocks (conv, ReLU, 2x2 MaxPool)
/// - Global Average Pooling
/// - Dense hidden layer with ReLU
/// - Single-logit output, sigmoid for the malignant probability
#[derive(Module, Debug)]
pub struct IdcClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub dense: Linear<B>,
    pub relu: Relu,
    pub output: Linear<B>,
}

impl<B: Backend> IdcClassifier<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &IdcClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.conv_filters.len());
        let mut in_channels = config.in_channels;

        for (index, &filters) in config.conv_filters.iter().enumerate() {
            let block = if index < config.separable_from {
                ConvBlock::plain(in_channels, filters, config.kernel_size, device)
            } else {
                ConvBlock::separable(in_channels, filters, config.kernel_size, device)
            };
            blocks.push(block);
            in_channels = filters;
        }

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let dense = LinearConfig::new(in_channels, config.hidden_units).init(device);
        let output = LinearConfig::new(config.hidden_units, 1).init(device);

        Self {
            blocks,
            global_pool,
            dense,
            relu: Relu::new(),
            output,
        }
    }

    /// Names of all feature layers, in forward order
    ///
    /// Plain blocks are `conv2d`, `conv2d_1`, ...; separable blocks are
    /// `separable_conv2d`, `separable_conv2d_1`, ...
    pub fn layer_names(&self) -> Vec<String> {
        let mut plain = 0usize;
        let mut separable = 0usize;

        self.blocks
            .iter()
            .map(|block| {
                let (prefix, counter) = if block.is_separable() {
                    (SEPARABLE_PREFIX, &mut separable)
                } else {
                    (CONV_PREFIX, &mut plain)
                };
                let name = match *counter {
                    0 => prefix.to_string(),
                    n => format!("{}_{}", prefix, n),
                };
                *counter += 1;
                name
            })
            .collect()
    }

    /// Look up a feature layer by name
    pub fn feature_layer(&self, name: &str) -> Result<FeatureLayer> {
        let names = self.layer_names();
        match names.iter().position(|n| n == name) {
            Some(index) => Ok(FeatureLayer {
                index,
                name: name.to_string(),
            }),
            None => Err(IdcError::LayerNotFound {
                layer: name.to_string(),
                available: names,
            }),
        }
    }

    /// Run the network up to `layer` and return its feature map `[B, C, H', W']`
    pub fn forward_features(&self, x: Tensor<B, 4>, layer: &FeatureLayer) -> Tensor<B, 4> {
        let x = self.blocks[..layer.index]
            .iter()
            .fold(x, |x, block| block.forward(x));
        self.blocks[layer.index].activate(x)
    }

    /// Continue from the feature map of `layer` to the output logit `[B, 1]`
    pub fn forward_head(&self, features: Tensor<B, 4>, layer: &FeatureLayer) -> Tensor<B, 2> {
        let x = self.blocks[layer.index].pool.forward(features);
        let x = self.blocks[layer.index + 1..]
            .iter()
            .fold(x, |x, block| block.forward(x));
        self.classify(x)
    }

    fn classify(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        // Global pooling: [B, C, H, W] -> [B, C, 1, 1]
        let x = self.global_pool.forward(x);

        // Flatten: [B, C, 1, 1] -> [B, C]
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dense.forward(x);
        let x = self.relu.forward(x);
        self.output.forward(x)
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width], values in [0, 1]
    ///
    /// # Returns
    /// * Logit tensor of shape [batch_size, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        self.classify(x)
    }

    /// Forward pass with sigmoid: probability of the malignant class
    pub fn forward_probability(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(x))
    }
}
