//! Deterministic image preprocessing for the feature extractor.
//!
//! Mirrors the ImageNet evaluation transform the backbone was trained with:
//! short side to 256, center crop 224, scale to [0, 1], per-channel mean/std.

use image::{imageops, imageops::FilterType, RgbImage};

use super::EmbedError;

pub const RESIZE_SHORT_SIDE: u32 = 256;
pub const CROP_SIZE: u32 = 224;
/// Extra resized pixels kept on each side of the crop so the filter sees real neighbours
const WINDOW_PAD: u32 = 8;
/// Anything smaller is a thumbnail or tracking pixel, not a product photo
pub const MIN_SOURCE_DIMENSION: u32 = 16;

/// ImageNet channel statistics (RGB)
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A single normalized image in NCHW layout.
#[derive(Debug, Clone)]
pub struct PixelTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

/// Decode raw bytes into an RGB raster. Alpha is dropped.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, EmbedError> {
    let img = image::load_from_memory(bytes).map_err(|e| EmbedError::Decode(e.to_string()))?;
    Ok(img.to_rgb8())
}

/// Full pipeline: size check, resize, crop, normalize.
pub fn preprocess(img: &RgbImage) -> Result<PixelTensor, EmbedError> {
    let (width, height) = img.dimensions();
    if width < MIN_SOURCE_DIMENSION || height < MIN_SOURCE_DIMENSION {
        return Err(EmbedError::TooSmall {
            width,
            height,
            min: MIN_SOURCE_DIMENSION,
        });
    }

    let cropped = resize_and_crop(img, RESIZE_SHORT_SIDE, CROP_SIZE);
    Ok(to_normalized_chw(&cropped))
}

/// Target size after scaling the short side to `short`, keeping aspect ratio.
/// The long side is truncated, matching torchvision's `Resize(int)`.
pub fn short_side_dimensions(width: u32, height: u32, short: u32) -> (u32, u32) {
    if width <= height {
        let long = (height as u64 * short as u64 / width as u64) as u32;
        (short, long.max(short))
    } else {
        let long = (width as u64 * short as u64 / height as u64) as u32;
        (long.max(short), short)
    }
}

pub fn resize_short_side(img: &RgbImage, short: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = short_side_dimensions(width, height, short);

    if (new_w, new_h) == (width, height) {
        return img.clone();
    }

    imageops::resize(img, new_w, new_h, FilterType::Triangle)
}

/// Short-side resize followed by a center crop, without resizing what the crop throws away.
///
/// Only the source strip along the long side that lands inside the crop (plus
/// `WINDOW_PAD`) is resampled, so a 16x65535 strip costs the same as a square.
pub fn resize_and_crop(img: &RgbImage, short: u32, crop: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let (new_w, new_h) = short_side_dimensions(width, height, short);
    let portrait = width <= height;
    let (long_src, long_scaled) = if portrait {
        (height, new_h)
    } else {
        (width, new_w)
    };

    if long_scaled <= crop + 2 * WINDOW_PAD {
        return center_crop(&resize_short_side(img, short), crop);
    }

    // crop offset along the long side in resized space, as `center_crop` would pick it
    let offset = ((long_scaled - crop) as f32 / 2.0).round() as u32;
    let scale = long_src as f64 / long_scaled as f64;

    let src_start = ((offset - WINDOW_PAD) as f64 * scale).floor() as u32;
    let src_end = (((offset + crop + WINDOW_PAD) as f64 * scale).ceil() as u32).min(long_src);
    let src_len = (src_end - src_start).max(1);

    let window_len = ((src_len as f64 / scale).round() as u32).max(crop);
    let inner = ((offset as f64 - src_start as f64 / scale).round() as u32).min(window_len - crop);

    let (window, target, left, top) = if portrait {
        (
            imageops::crop_imm(img, 0, src_start, width, src_len).to_image(),
            (new_w, window_len),
            ((new_w - crop) as f32 / 2.0).round() as u32,
            inner,
        )
    } else {
        (
            imageops::crop_imm(img, src_start, 0, src_len, height).to_image(),
            (window_len, new_h),
            inner,
            ((new_h - crop) as f32 / 2.0).round() as u32,
        )
    };

    let resized = imageops::resize(&window, target.0, target.1, FilterType::Triangle);
    imageops::crop_imm(&resized, left, top, crop, crop).to_image()
}

/// Crop a `size`x`size` square from the middle. Expects both sides >= `size`.
pub fn center_crop(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let left = ((width.saturating_sub(size)) as f32 / 2.0).round() as u32;
    let top = ((height.saturating_sub(size)) as f32 / 2.0).round() as u32;

    imageops::crop_imm(img, left, top, size.min(width), size.min(height)).to_image()
}

/// Convert to planar RGB floats with channel-wise standardization.
pub fn to_normalized_chw(img: &RgbImage) -> PixelTensor {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, px) in img.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = (px[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    PixelTensor {
        shape: [1, 3, height as usize, width as usize],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn gradient(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_short_side_dimensions_landscape() {
        assert_eq!(short_side_dimensions(640, 480, 256), (341, 256));
    }

    #[test]
    fn test_short_side_dimensions_portrait() {
        assert_eq!(short_side_dimensions(300, 900, 256), (256, 768));
    }

    #[test]
    fn test_short_side_dimensions_square() {
        assert_eq!(short_side_dimensions(100, 100, 256), (256, 256));
    }

    #[test]
    fn test_center_crop_offsets() {
        let img = gradient(300, 260);
        let cropped = center_crop(&img, 224);

        assert_eq!(cropped.dimensions(), (224, 224));
        // left = round(76 / 2) = 38, top = round(36 / 2) = 18
        assert_eq!(cropped.get_pixel(0, 0), img.get_pixel(38, 18));
    }

    #[test]
    fn test_preprocess_shape_for_any_aspect_ratio() {
        for (w, h) in [(16, 16), (640, 480), (300, 1200), (2000, 17)] {
            let tensor = preprocess(&gradient(w, h)).unwrap();
            assert_eq!(tensor.shape, [1, 3, 224, 224]);
            assert_eq!(tensor.data.len(), 3 * 224 * 224);
        }
    }

    #[test]
    fn test_preprocess_extreme_strip_is_bounded() {
        let strip: RgbImage = ImageBuffer::from_pixel(16, 65535, Rgb([200, 40, 90]));

        let started = std::time::Instant::now();
        let tensor = preprocess(&strip).unwrap();

        assert_eq!(tensor.shape, [1, 3, 224, 224]);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        let expected = (200.0 / 255.0 - MEAN[0]) / STD[0];
        assert!((tensor.data[0] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_windowed_crop_matches_full_resize() {
        // smooth along both axes so sub-pixel window alignment stays within tolerance
        let smooth = |w: u32, h: u32| -> RgbImage {
            ImageBuffer::from_fn(w, h, |x, y| {
                Rgb([(x * 200 / w) as u8, (y * 200 / h) as u8, ((x + y) * 100 / (w + h)) as u8])
            })
        };

        for (w, h) in [(300, 1200), (1500, 400), (64, 2000)] {
            let img = smooth(w, h);
            let full = center_crop(&resize_short_side(&img, 256), 224);
            let windowed = resize_and_crop(&img, 256, 224);
            assert_eq!(windowed.dimensions(), (224, 224));

            let diff: f64 = full
                .pixels()
                .zip(windowed.pixels())
                .flat_map(|(a, b)| (0..3).map(move |c| (a[c] as f64 - b[c] as f64).abs()))
                .sum::<f64>()
                / (224.0 * 224.0 * 3.0);
            assert!(diff < 2.0, "{w}x{h}: mean channel diff {diff}");
        }
    }

    #[test]
    fn test_preprocess_too_small() {
        let result = preprocess(&gradient(15, 400));
        assert!(matches!(
            result,
            Err(EmbedError::TooSmall {
                width: 15,
                height: 400,
                ..
            })
        ));
    }

    #[test]
    fn test_normalization_constants() {
        let img: RgbImage = ImageBuffer::from_pixel(2, 2, Rgb([255, 0, 128]));
        let tensor = to_normalized_chw(&img);

        let plane = 4;
        assert!((tensor.data[0] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((tensor.data[plane] - (0.0 - 0.456) / 0.224).abs() < 1e-5);
        assert!((tensor.data[2 * plane] - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-5);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let img = gradient(500, 333);
        let a = preprocess(&img).unwrap();
        let b = preprocess(&img).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_decode_rgb_png() {
        let decoded = decode_rgb(&png_bytes(&gradient(40, 30))).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn test_decode_rgb_garbage() {
        let result = decode_rgb(&[1, 2, 3, 4, 5]);
        assert!(matches!(result, Err(EmbedError::Decode(_))));
    }

    #[test]
    fn test_decode_drops_alpha() {
        let rgba = image::RgbaImage::from_pixel(20, 20, image::Rgba([10, 20, 30, 0]));
        let mut buf = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();

        let decoded = decode_rgb(&buf).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }
}
