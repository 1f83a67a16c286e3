//! Image decoding and normalization
//!
//! Every backend that looks at pixels goes through [`normalize`], on both the
//! prediction and the training path, so a model always sees inputs at the
//! geometry it was trained at.

use freshcheck_core::{ColorMode, Error, ImageGeometry, Result};
use image::{imageops::FilterType, DynamicImage};

/// Decode raster bytes (PNG, JPEG, ...) into an in-memory image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::input(format!("Failed to decode image: {}", e)))
}

/// Resize to the target size and convert to the target colour mode.
///
/// Returns the raw 8-bit pixel data in row-major, channel-last order. The
/// length is always `geometry.input_len()`.
pub fn normalize(image: &DynamicImage, geometry: &ImageGeometry) -> Result<Vec<u8>> {
    if geometry.width == 0 || geometry.height == 0 {
        return Err(Error::config(format!(
            "cannot normalize to empty geometry {}",
            geometry
        )));
    }

    let resized = image.resize_exact(geometry.width, geometry.height, FilterType::Triangle);

    let pixels = match geometry.color_mode {
        ColorMode::Luma => resized.to_luma8().into_raw(),
        ColorMode::Rgb => resized.to_rgb8().into_raw(),
        ColorMode::Rgba => resized.to_rgba8().into_raw(),
    };

    debug_assert_eq!(pixels.len(), geometry.input_len());
    Ok(pixels)
}

/// Normalize a batch, concatenating the pixel vectors
pub fn normalize_batch<'a>(
    images: impl IntoIterator<Item = &'a DynamicImage>,
    geometry: &ImageGeometry,
) -> Result<Vec<u8>> {
    let mut batch = Vec::new();
    for image in images {
        batch.extend(normalize(image, geometry)?);
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn red_square(size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([255, 0, 0])))
    }

    #[test]
    fn test_normalize_rgb() {
        let geometry = ImageGeometry::new(4, 2, ColorMode::Rgb);
        let pixels = normalize(&red_square(16), &geometry).unwrap();
        assert_eq!(pixels.len(), 4 * 2 * 3);
        assert_eq!(&pixels[..3], &[255, 0, 0]);
    }

    #[test]
    fn test_normalize_luma() {
        let geometry = ImageGeometry::new(3, 3, ColorMode::Luma);
        let pixels = normalize(&red_square(9), &geometry).unwrap();
        assert_eq!(pixels.len(), 9);
        assert!(pixels.iter().all(|p| *p == pixels[0]));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let geometry = ImageGeometry::new(5, 7, ColorMode::Rgba);
        let image = red_square(13);
        assert_eq!(
            normalize(&image, &geometry).unwrap(),
            normalize(&image, &geometry).unwrap()
        );
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let geometry = ImageGeometry::new(0, 0, ColorMode::Luma);
        assert!(normalize(&red_square(2), &geometry).is_err());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_image(b"not an image"), Err(Error::Input(_))));
    }
}
