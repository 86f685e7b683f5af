use anyhow::Result;

use crate::capture::RawImage;

/// One object found in one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub object_class: String,
    /// 0..=1
    pub confidence: f32,
    /// Normalized bounding-box center, (0, 0) is the top-left corner.
    pub x: f32,
    pub y: f32,
}

/// Synchronous, CPU-bound object detector.
pub trait Detector: Send {
    fn detect(&mut self, image: &RawImage) -> Result<Vec<Detection>>;
}
