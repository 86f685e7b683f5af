//! Queue payloads exchanged between the capture, detection and
//! orchestrator threads.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::detection::Detection;

/// One captured frame on durable storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// Monotonic, assigned by the capture worker.
    pub sequence_number: u64,
    pub path: PathBuf,
    pub captured_at: SystemTime,
}

impl ImageRecord {
    /// Capture time as milliseconds since the Unix epoch.
    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Enable or disable the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraCommand {
    StartCapture,
    StopCapture,
}

/// Image handed to the detection worker.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    pub sequence_number: u64,
    pub path: PathBuf,
}

/// Detector output for one image. An empty list means nothing was found.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub sequence_number: u64,
    pub detections: Vec<Detection>,
}
