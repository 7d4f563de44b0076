//! Image preprocessing
//!
//! resize -> RGB floats in [0, 1] -> per-channel ImageNet normalisation,
//! laid out as CHW.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, ImageReader};

use crate::utils::error::{Result, UniTrainError};
use crate::IMAGE_SIZE;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed preprocessing applied to every training, evaluation and inference image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageTransform {
    pub image_size: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            image_size: IMAGE_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl ImageTransform {
    pub fn with_image_size(image_size: usize) -> Self {
        Self {
            image_size,
            ..Self::default()
        }
    }

    /// Tensor dimensions of one transformed image
    pub fn shape(&self) -> [usize; 3] {
        [3, self.image_size, self.image_size]
    }

    /// Resize and normalise into a flat CHW vector of `3 * size * size` floats
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let size = self.image_size as u32;
        let rgb = image
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();
        let num_pixels = self.image_size * self.image_size;

        let mut out = vec![0.0f32; 3 * num_pixels];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                out[c * num_pixels + i] = (value - self.mean[c]) / self.std[c];
            }
        }
        out
    }

    /// Decode an image file and transform it
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let image = ImageReader::open(path)
            .map_err(|e| UniTrainError::Dataset(format!("{}: {}", path.display(), e)))?
            .decode()
            .map_err(|e| UniTrainError::Dataset(format!("{}: {}", path.display(), e)))?;
        Ok(self.apply(&image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_output_is_chw_sized() {
        let transform = ImageTransform::with_image_size(8);
        let image = DynamicImage::ImageRgb8(RgbImage::new(20, 10));

        assert_eq!(transform.apply(&image).len(), 3 * 8 * 8);
        assert_eq!(transform.shape(), [3, 8, 8]);
    }

    #[test]
    fn test_imagenet_normalisation_per_channel() {
        let transform = ImageTransform::with_image_size(2);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));

        let data = transform.apply(&image);
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];

        assert!((data[0] - red).abs() < 1e-5);
        assert!((data[3] - red).abs() < 1e-5);
        assert!((data[4] - green).abs() < 1e-5);
    }

    #[test]
    fn test_default_size() {
        assert_eq!(ImageTransform::default().image_size, 224);
    }

    #[test]
    fn test_loading_missing_file_is_a_dataset_error() {
        let result = ImageTransform::default().load(Path::new("/no/such/image.png"));
        assert!(matches!(result, Err(UniTrainError::Dataset(_))));
    }
}
