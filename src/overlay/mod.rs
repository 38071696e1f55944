//! Overlay Renderer
//!
//! Turns a low-resolution saliency map into a jet-coloured heatmap blended
//! over the image the classifier saw, then scales the result back to the
//! upload's dimensions and encodes it for transport.

use std::io::Cursor;

use base64::Engine;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};

use crate::gradcam::SaliencyMap;
use crate::utils::error::{IdcError, Result};

/// Weight of the original pixel in the blend
pub const IMAGE_WEIGHT: f32 = 0.6;
/// Weight of the heatmap pixel in the blend
pub const HEATMAP_WEIGHT: f32 = 0.4;

/// Resize a saliency map with bilinear interpolation
///
/// Pixel centres are aligned (half-pixel offset) and samples outside the
/// map are clamped to the border.
pub fn resize_saliency(map: &SaliencyMap, width: u32, height: u32) -> Vec<f32> {
    let (src_w, src_h) = (map.width(), map.height());
    let (dst_w, dst_h) = (width as usize, height as usize);
    let scale_x = src_w as f32 / dst_w as f32;
    let scale_y = src_h as f32 / dst_h as f32;

    let mut out = Vec::with_capacity(dst_w * dst_h);

    for dy in 0..dst_h {
        let sy = ((dy as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (sy.floor() as usize).min(src_h - 1);
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;

        for dx in 0..dst_w {
            let sx = ((dx as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (sx.floor() as usize).min(src_w - 1);
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;

            let top = map.get(x0, y0) * (1.0 - fx) + map.get(x1, y0) * fx;
            let bottom = map.get(x0, y1) * (1.0 - fx) + map.get(x1, y1) * fx;
            out.push(top * (1.0 - fy) + bottom * fy);
        }
    }

    out
}

/// Scale a [0, 1] value to 8 bits (truncating)
pub fn to_u8(value: f32) -> u8 {
    (255.0 * value.clamp(0.0, 1.0)) as u8
}

/// Jet palette: blue for low intensities, red for high
pub fn jet(intensity: u8) -> Rgb<u8> {
    let x = intensity as f32 / 255.0;
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Blend one channel value, saturating to the 8-bit range
fn blend(original: u8, heat: u8) -> u8 {
    (IMAGE_WEIGHT * original as f32 + HEATMAP_WEIGHT * heat as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Colour-map `map` and blend it onto `base`; the result has `base`'s size
pub fn render_overlay(base: &RgbImage, map: &SaliencyMap) -> RgbImage {
    let (width, height) = base.dimensions();
    let heat = resize_saliency(map, width, height);

    RgbImage::from_fn(width, height, |x, y| {
        let original = base.get_pixel(x, y);
        let color = jet(to_u8(heat[(y * width + x) as usize]));
        Rgb([
            blend(original[0], color[0]),
            blend(original[1], color[1]),
            blend(original[2], color[2]),
        ])
    })
}

/// Render on the model-sized image, then scale back to the upload size
pub fn render_for_upload(
    model_input: &RgbImage,
    map: &SaliencyMap,
    original_width: u32,
    original_height: u32,
) -> RgbImage {
    let overlay = render_overlay(model_input, map);
    if overlay.dimensions() == (original_width, original_height) {
        overlay
    } else {
        imageops::resize(&overlay, original_width, original_height, FilterType::Triangle)
    }
}

/// Place two images next to each other on a white canvas
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, left, 0, 0);
    imageops::replace(&mut canvas, right, left.width() as i64, 0);
    canvas
}

/// Encode an image as PNG bytes
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| IdcError::Encode(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Encode an image as base64 PNG for embedding in JSON
pub fn encode_png_base64(image: &RgbImage) -> Result<String> {
    let png = encode_png(image)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}

/// Decode a base64 PNG payload back into an image
pub fn decode_png_base64(payload: &str) -> Result<RgbImage> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| IdcError::Decode(format!("invalid base64 payload: {}", e)))?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|e| IdcError::Decode(format!("invalid PNG payload: {}", e)))?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_map(value: f32, size: usize) -> SaliencyMap {
        SaliencyMap::new(size, size, vec![value; size * size]).unwrap()
    }

    #[test]
    fn test_jet_endpoints() {
        // Low intensities are blue, high intensities red
        let low = jet(0);
        assert_eq!(low[0], 0);
        assert_eq!(low[1], 0);
        assert!(low[2] >= 127);

        let high = jet(255);
        assert!(high[0] >= 127);
        assert_eq!(high[1], 0);
        assert_eq!(high[2], 0);

        let mid = jet(128);
        assert_eq!(mid[1], 255);
    }

    #[test]
    fn test_to_u8_clamps() {
        assert_eq!(to_u8(0.0), 0);
        assert_eq!(to_u8(1.0), 255);
        assert_eq!(to_u8(1.7), 255);
        assert_eq!(to_u8(-0.3), 0);
        assert_eq!(to_u8(0.5), 127);
    }

    #[test]
    fn test_resize_uniform_map_stays_uniform() {
        let map = uniform_map(0.5, 4);
        let resized = resize_saliency(&map, 17, 9);
        assert_eq!(resized.len(), 17 * 9);
        assert!(resized.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_resize_interpolates_between_samples() {
        let map = SaliencyMap::new(2, 1, vec![0.0, 1.0]).unwrap();
        let resized = resize_saliency(&map, 4, 1);
        // Outer pixels clamp to the border, inner ones are interpolated
        assert_eq!(resized[0], 0.0);
        assert!((resized[1] - 0.25).abs() < 1e-6);
        assert!((resized[2] - 0.75).abs() < 1e-6);
        assert_eq!(resized[3], 1.0);
    }

    #[test]
    fn test_blend_weights() {
        assert_eq!(blend(100, 200), 140);
        assert_eq!(blend(255, 255), 255);
        assert_eq!(blend(0, 0), 0);
    }

    #[test]
    fn test_render_overlay_keeps_base_size() {
        let base = RgbImage::from_pixel(12, 10, Rgb([200, 100, 50]));
        let overlay = render_overlay(&base, &uniform_map(0.0, 3));
        assert_eq!(overlay.dimensions(), (12, 10));

        // Zero saliency blends the jet blue into every pixel
        let blue = jet(0);
        let pixel = overlay.get_pixel(5, 5);
        assert_eq!(pixel[0], blend(200, blue[0]));
        assert_eq!(pixel[2], blend(50, blue[2]));
    }

    #[test]
    fn test_render_for_upload_restores_original_size() {
        let model_input = RgbImage::new(16, 16);
        let map = uniform_map(1.0, 4);

        let overlay = render_for_upload(&model_input, &map, 50, 30);
        assert_eq!(overlay.dimensions(), (50, 30));

        let same = render_for_upload(&model_input, &map, 16, 16);
        assert_eq!(same.dimensions(), (16, 16));
    }

    #[test]
    fn test_side_by_side() {
        let left = RgbImage::new(10, 8);
        let right = RgbImage::new(6, 12);
        let canvas = side_by_side(&left, &right);
        assert_eq!(canvas.dimensions(), (16, 12));
        assert_eq!(*canvas.get_pixel(2, 10), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_base64_png_decodes_to_same_size() {
        let image = RgbImage::from_fn(23, 11, |x, y| Rgb([x as u8, y as u8, 7]));
        let payload = encode_png_base64(&image).unwrap();
        assert!(!payload.is_empty());

        let decoded = decode_png_base64(&payload).unwrap();
        assert_eq!(decoded.dimensions(), (23, 11));
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_png_base64("not base64 !!").is_err());
        let not_png = base64::engine::general_purpose::STANDARD.encode(b"hello");
        assert!(decode_png_base64(&not_png).is_err());
    }
}
