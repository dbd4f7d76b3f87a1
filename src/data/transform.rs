// ============================================================
// Layer 4 — Grayscale Transform
// ============================================================
// The default SampleTransform. For every sample it:
//
//   1. decodes the file with the `image` crate
//   2. converts to a single 8-bit luminance channel
//   3. resizes to the configured (height, width)
//   4. scales intensities from [0, 255] to [0, 1]
//
// The trailing channel dimension of size 1 is implicit in the
// flat layout: one value per pixel.
//
// Reference: image crate documentation (imageops::resize)

use std::path::Path;

use image::imageops::{self, FilterType};

use crate::domain::error::PipelineError;
use crate::domain::traits::SampleTransform;

#[derive(Debug, Clone, Copy)]
pub struct GrayscaleTransform {
    height: usize,
    width:  usize,
}

impl GrayscaleTransform {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
}

impl SampleTransform for GrayscaleTransform {
    fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    fn load(&self, path: &Path) -> Result<Vec<f32>, PipelineError> {
        let decoded = image::open(path).map_err(|e| PipelineError::SampleDecode {
            path:   path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let gray    = decoded.to_luma8();
        let resized = imageops::resize(
            &gray,
            self.width as u32,
            self.height as u32,
            FilterType::Nearest,
        );

        Ok(resized
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    #[test]
    fn test_resizes_and_normalises() {
        let tmp  = TempDir::new().unwrap();
        let path = tmp.path().join("white.png");
        GrayImage::from_pixel(8, 6, Luma([255u8])).save(&path).unwrap();

        let pixels = GrayscaleTransform::new(4, 5).load(&path).unwrap();

        assert_eq!(pixels.len(), 4 * 5);
        assert!(pixels.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_intensities_in_unit_range() {
        let tmp  = TempDir::new().unwrap();
        let path = tmp.path().join("ramp.png");
        let img  = GrayImage::from_fn(16, 16, |x, y| Luma([((x * 16 + y) % 256) as u8]));
        img.save(&path).unwrap();

        let pixels = GrayscaleTransform::new(16, 16).load(&path).unwrap();
        assert!(pixels.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(pixels[0], 0.0);
    }

    #[test]
    fn test_corrupt_file_names_the_path() {
        let tmp  = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        match GrayscaleTransform::new(4, 4).load(&path) {
            Err(PipelineError::SampleDecode { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected SampleDecode, got {other:?}"),
        }
    }
}
