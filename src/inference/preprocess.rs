//! Image preprocessing: decode, resize and normalise uploads for the model.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::utils::error::{IdcError, Result};

/// Decode image bytes (format sniffed from content) into RGB
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(IdcError::Decode("empty upload".to_string()));
    }
    let image = image::load_from_memory(bytes).map_err(|e| IdcError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Resize to the model's square input size (bicubic)
pub fn resize_for_model(image: &RgbImage, size: u32) -> RgbImage {
    imageops::resize(image, size, size, FilterType::CatmullRom)
}

/// Scale pixels to [0, 1] in CHW layout
pub fn normalize(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let num_pixels = (width * height) as usize;
    let mut normalized = vec![0.0f32; 3 * num_pixels];

    for (i, pixel) in image.pixels().enumerate() {
        normalized[i] = pixel[0] as f32 / 255.0;
        normalized[num_pixels + i] = pixel[1] as f32 / 255.0;
        normalized[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    normalized
}

/// An upload after decoding and resizing
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Decoded upload at its original size
    pub original: RgbImage,
    /// Upload resized to the model's input size
    pub resized: RgbImage,
}

impl PreparedImage {
    /// Decode `bytes` and resize them for a model with `input_size` inputs
    pub fn from_bytes(bytes: &[u8], input_size: usize) -> Result<Self> {
        let original = decode_image(bytes)?;
        let resized = resize_for_model(&original, input_size as u32);
        Ok(Self { original, resized })
    }

    /// Original upload dimensions
    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original.dimensions()
    }

    /// Normalised `[1, 3, H, W]` tensor of the resized image
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let (width, height) = self.resized.dimensions();
        let data = TensorData::new(
            normalize(&self.resized),
            [1, 3, height as usize, width as usize],
        );
        Tensor::from_data(data, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([255, 0, 51]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_rejects_non_images() {
        assert!(matches!(decode_image(b""), Err(IdcError::Decode(_))));
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(IdcError::Decode(_))
        ));
    }

    #[test]
    fn test_normalize_chw_layout() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 51]));
        let normalized = normalize(&image);

        assert_eq!(normalized.len(), 12);
        assert!(normalized[..4].iter().all(|v| *v == 1.0));
        assert!(normalized[4..8].iter().all(|v| *v == 0.0));
        assert!(normalized[8..].iter().all(|v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_prepare_keeps_original_and_resizes() {
        let prepared = PreparedImage::from_bytes(&png_bytes(40, 25), 16).unwrap();
        assert_eq!(prepared.original_dimensions(), (40, 25));
        assert_eq!(prepared.resized.dimensions(), (16, 16));

        let tensor = prepared.to_tensor::<NdArray>(&Default::default());
        assert_eq!(tensor.dims(), [1, 3, 16, 16]);

        let max: f32 = tensor.max().into_scalar();
        assert!(max <= 1.0);
    }
}
