//! Runtime configuration.
//!
//! Everything is read from one YAML file. Every section and field has a
//! default, so an empty file is a valid (if not very useful) configuration.
//!
//! ```yaml
//! capture:
//!   rate_hz: 2.0
//!   output_dir: /data/images
//!   replay_dir: /data/replay
//! detection:
//!   model_path: /etc/scout/landing_pad.yaml
//! vehicle:
//!   address: 127.0.0.1:14550
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::link::messages::CHUNK_SIZE;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub capture: CaptureConfig,
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub vehicle: VehicleConfig,
    pub transfer: TransferConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames per second.
    pub rate_hz: f64,
    /// Where captured frames are stored.
    pub output_dir: PathBuf,
    /// Directory of images replayed as camera frames.
    pub replay_dir: PathBuf,
    /// Frame size requested from the camera.
    pub resolution: (u32, u32),
    /// Capture from startup instead of waiting for a start command.
    pub start_enabled: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1.0,
            output_dir: PathBuf::from("images"),
            replay_dir: PathBuf::from("replay"),
            resolution: (1280, 960),
            start_enabled: true,
        }
    }
}

/// Field of view of the downward-facing camera, degrees.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub hfov_deg: f64,
    pub vfov_deg: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            hfov_deg: 62.2,
            vfov_deg: 48.8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: PathBuf,
    /// Class that triggers landing. Defaults to the class the model reports.
    pub target_class: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Autopilot endpoint. Without one the pipeline runs unlinked.
    pub address: Option<String>,
    /// Local socket address.
    pub bind: String,
    /// How long to wait for first telemetry at startup.
    pub connect_timeout_ms: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            address: None,
            bind: "0.0.0.0:14551".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub ack_timeout_ms: u64,
    pub chunk_delay_ms: u64,
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5000,
            chunk_delay_ms: 500,
            max_width: 320,
            max_height: 240,
            jpeg_quality: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Sleep of a tick that found no work.
    pub idle_sleep_ms: u64,
    /// Send a status text for every captured image.
    pub announce_images: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: 100,
            announce_images: false,
        }
    }
}

impl ScoutConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open config {}", path.display()))?;
        // serde_yaml reads an empty document as unit, not as an empty map
        if file.metadata()?.len() == 0 {
            return Ok(Self::default());
        }
        serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rate = self.capture.rate_hz;
        if !(rate.is_finite() && rate > 0.0) {
            bail!("capture.rate_hz must be positive, got {}", rate);
        }
        let (w, h) = self.capture.resolution;
        if w == 0 || h == 0 {
            bail!("capture.resolution must be non-zero, got {}x{}", w, h);
        }

        for (name, fov) in [
            ("camera.hfov_deg", self.camera.hfov_deg),
            ("camera.vfov_deg", self.camera.vfov_deg),
        ] {
            if !(fov > 0.0 && fov < 180.0) {
                bail!("{} must be within (0, 180), got {}", name, fov);
            }
        }

        if !self.detection.model_path.is_file() {
            bail!(
                "detection model not found at {}",
                self.detection.model_path.display()
            );
        }

        let t = &self.transfer;
        if !(1..=100).contains(&t.jpeg_quality) {
            bail!("transfer.jpeg_quality must be within 1..=100, got {}", t.jpeg_quality);
        }
        if t.max_width == 0 || t.max_height == 0 {
            bail!("transfer.max_width and max_height must be non-zero");
        }
        // a JPEG never exceeds the raw RGB size at these dimensions
        let worst_case = t.max_width as u64 * t.max_height as u64 * 3;
        if worst_case.div_ceil(CHUNK_SIZE as u64) > u16::MAX as u64 {
            bail!(
                "transfer.max_width x max_height of {}x{} needs more than {} chunks",
                t.max_width,
                t.max_height,
                u16::MAX
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid(dir: &Path) -> ScoutConfig {
        let model = dir.join("model.yaml");
        std::fs::write(&model, "class: pad\nrgb_min: [0, 0, 0]\nrgb_max: [255, 255, 255]\n")
            .unwrap();
        let mut config = ScoutConfig::default();
        config.detection.model_path = model;
        config
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "capture:\n  rate_hz: 4.0\n  resolution: [640, 480]\nvehicle:\n  address: 10.0.0.2:14550"
        )
        .unwrap();

        let config = ScoutConfig::load(file.path()).unwrap();
        assert_eq!(config.capture.rate_hz, 4.0);
        assert_eq!(config.capture.resolution, (640, 480));
        assert!(config.capture.start_enabled);
        assert_eq!(config.vehicle.address.as_deref(), Some("10.0.0.2:14550"));
        assert_eq!(config.vehicle.connect_timeout_ms, 10_000);
        assert_eq!(config.transfer.ack_timeout_ms, 5000);
        assert_eq!(config.transfer.chunk_delay_ms, 500);
        assert_eq!(config.orchestrator.idle_sleep_ms, 100);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ScoutConfig::load(file.path()).unwrap();
        assert_eq!(config.camera.hfov_deg, 62.2);
        assert!(config.detection.target_class.is_none());
    }

    #[test]
    fn test_unknown_file_is_error() {
        assert!(ScoutConfig::load("/nonexistent/scout.yaml").is_err());
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid(dir.path()).validate().is_ok());

        let mut config = valid(dir.path());
        config.detection.model_path = dir.path().join("missing.yaml");
        assert!(config.validate().is_err());

        let mut config = valid(dir.path());
        config.capture.rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = valid(dir.path());
        config.camera.vfov_deg = 180.0;
        assert!(config.validate().is_err());

        let mut config = valid(dir.path());
        config.transfer.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = valid(dir.path());
        config.transfer.max_width = 4000;
        config.transfer.max_height = 3000;
        assert!(config.validate().is_err());
    }
}
