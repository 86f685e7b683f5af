//! Colour-threshold detector for a uniformly coloured landing target.
//!
//! The "model" is a small YAML file:
//!
//! ```yaml
//! class: landing_pad
//! rgb_min: [200, 0, 0]
//! rgb_max: [255, 80, 80]
//! min_fraction: 0.001
//! full_confidence_fraction: 0.02
//! ```

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::capture::RawImage;

use super::detector::{Detection, Detector};

#[derive(Debug, Clone, Deserialize)]
pub struct ColorBlobModel {
    /// Class name reported for matches.
    pub class: String,
    /// Inclusive per-channel lower bound.
    pub rgb_min: [u8; 3],
    /// Inclusive per-channel upper bound.
    pub rgb_max: [u8; 3],
    /// Share of sampled pixels that must match before anything is reported.
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f32,
    /// Share of matching pixels at which confidence saturates at 1.0.
    #[serde(default = "default_full_confidence_fraction")]
    pub full_confidence_fraction: f32,
    /// Sample every n-th pixel in both directions.
    #[serde(default = "default_stride")]
    pub stride: u32,
}

fn default_min_fraction() -> f32 {
    0.001
}

fn default_full_confidence_fraction() -> f32 {
    0.02
}

fn default_stride() -> u32 {
    1
}

impl ColorBlobModel {
    fn validate(&self) -> Result<()> {
        if self.class.trim().is_empty() {
            bail!("model class name is empty");
        }
        if (0..3).any(|c| self.rgb_min[c] > self.rgb_max[c]) {
            bail!("rgb_min {:?} exceeds rgb_max {:?}", self.rgb_min, self.rgb_max);
        }
        if !(0.0..=1.0).contains(&self.min_fraction) {
            bail!("min_fraction must be within 0..=1, got {}", self.min_fraction);
        }
        if self.full_confidence_fraction <= 0.0 {
            bail!("full_confidence_fraction must be positive");
        }
        if self.stride == 0 {
            bail!("stride must be at least 1");
        }
        Ok(())
    }

    fn matches(&self, rgb: [u8; 3]) -> bool {
        (0..3).all(|c| rgb[c] >= self.rgb_min[c] && rgb[c] <= self.rgb_max[c])
    }
}

/// Reports at most one detection: the centroid of all in-range pixels.
pub struct ColorBlobDetector {
    model: ColorBlobModel,
}

impl ColorBlobDetector {
    pub fn new(model: ColorBlobModel) -> Result<Self> {
        model.validate()?;
        Ok(Self { model })
    }

    /// Load the model description from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open model {}", path.display()))?;
        let model: ColorBlobModel = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse model {}", path.display()))?;
        Self::new(model)
    }

    pub fn model(&self) -> &ColorBlobModel {
        &self.model
    }
}

impl Detector for ColorBlobDetector {
    fn detect(&mut self, image: &RawImage) -> Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let stride = self.model.stride;

        let mut sampled = 0u64;
        let mut hits = 0u64;
        let mut sum_x = 0f64;
        let mut sum_y = 0f64;
        for y in (0..height).step_by(stride as usize) {
            for x in (0..width).step_by(stride as usize) {
                sampled += 1;
                if self.model.matches(image.get_pixel(x, y).0) {
                    hits += 1;
                    sum_x += x as f64 + 0.5;
                    sum_y += y as f64 + 0.5;
                }
            }
        }

        let fraction = hits as f32 / sampled as f32;
        if hits == 0 || fraction < self.model.min_fraction {
            return Ok(Vec::new());
        }

        Ok(vec![Detection {
            object_class: self.model.class.clone(),
            confidence: (fraction / self.model.full_confidence_fraction).min(1.0),
            x: (sum_x / hits as f64 / width as f64) as f32,
            y: (sum_y / hits as f64 / height as f64) as f32,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;

    fn red_model() -> ColorBlobModel {
        ColorBlobModel {
            class: "landing_pad".into(),
            rgb_min: [200, 0, 0],
            rgb_max: [255, 60, 60],
            min_fraction: 0.001,
            full_confidence_fraction: 0.02,
            stride: 1,
        }
    }

    #[test]
    fn test_blob_centroid() {
        let mut img = RawImage::from_pixel(100, 50, Rgb([20, 120, 20]));
        // 10x10 red square with top-left corner at (70, 10)
        for y in 10..20 {
            for x in 70..80 {
                img.put_pixel(x, y, Rgb([230, 10, 10]));
            }
        }
        let mut detector = ColorBlobDetector::new(red_model()).unwrap();
        let found = detector.detect(&img).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object_class, "landing_pad");
        assert_abs_diff_eq!(found[0].x, 0.75, epsilon = 1e-4);
        assert_abs_diff_eq!(found[0].y, 0.3, epsilon = 1e-4);
        // 100 of 5000 pixels = 2%, saturates
        assert_abs_diff_eq!(found[0].confidence, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_nothing_found_is_empty() {
        let img = RawImage::from_pixel(64, 64, Rgb([0, 0, 255]));
        let mut detector = ColorBlobDetector::new(red_model()).unwrap();
        assert!(detector.detect(&img).unwrap().is_empty());
    }

    #[test]
    fn test_below_min_fraction_ignored() {
        let mut img = RawImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        img.put_pixel(5, 5, Rgb([255, 0, 0]));
        let mut model = red_model();
        model.min_fraction = 0.01;
        let mut detector = ColorBlobDetector::new(model).unwrap();
        assert!(detector.detect(&img).unwrap().is_empty());
    }

    #[test]
    fn test_load_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.yaml");
        std::fs::write(
            &path,
            "class: landing_pad\nrgb_min: [200, 0, 0]\nrgb_max: [255, 80, 80]\n",
        )
        .unwrap();
        let detector = ColorBlobDetector::load(&path).unwrap();
        assert_eq!(detector.model().stride, 1);
        assert_abs_diff_eq!(detector.model().min_fraction, 0.001);

        std::fs::write(&path, "class: x\nrgb_min: [9, 0, 0]\nrgb_max: [1, 0, 0]\n").unwrap();
        assert!(ColorBlobDetector::load(&path).is_err());
        assert!(ColorBlobDetector::load(dir.path().join("missing.yaml")).is_err());
    }
}
