//! Camera capability and a replay implementation backed by a directory of
//! still images.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use image::RgbImage;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};

/// Uncompressed 8-bit RGB frame.
pub type RawImage = RgbImage;

/// Frame source.
pub trait Camera: Send {
    /// Apply output resolution and frame rate before the first capture.
    fn configure(&mut self, resolution: (u32, u32), fps: f64) -> Result<()>;

    /// Grab one frame. `None` when the backend has nothing to deliver.
    fn capture_frame(&mut self) -> Option<RawImage>;
}

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Cycles through the images of a directory in file-name order.
pub struct ReplayCamera {
    frames: Vec<PathBuf>,
    next: usize,
    resolution: Option<(u32, u32)>,
}

impl ReplayCamera {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read replay directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            bail!("no images found in {}", dir.display());
        }
        frames.sort();

        Ok(Self {
            frames,
            next: 0,
            resolution: None,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Camera for ReplayCamera {
    fn configure(&mut self, resolution: (u32, u32), fps: f64) -> Result<()> {
        if resolution.0 == 0 || resolution.1 == 0 {
            bail!("invalid resolution {}x{}", resolution.0, resolution.1);
        }
        debug!(?resolution, fps, "replay camera configured");
        self.resolution = Some(resolution);
        Ok(())
    }

    fn capture_frame(&mut self) -> Option<RawImage> {
        let path = &self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();

        let frame = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("replay frame {} unreadable: {}", path.display(), e);
                return None;
            }
        };

        match self.resolution {
            Some((w, h)) if frame.dimensions() != (w, h) => {
                Some(imageops::resize(&frame, w, h, FilterType::Triangle))
            }
            _ => Some(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_replay_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RawImage::from_pixel(4, 4, Rgb([2, 2, 2])).save(dir.path().join("b.png")).unwrap();
        RawImage::from_pixel(4, 4, Rgb([1, 1, 1])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut cam = ReplayCamera::open(dir.path()).unwrap();
        assert_eq!(cam.len(), 2);
        let first = cam.capture_frame().unwrap();
        let second = cam.capture_frame().unwrap();
        let third = cam.capture_frame().unwrap();
        assert_eq!(first.get_pixel(0, 0).0, [1, 1, 1]);
        assert_eq!(second.get_pixel(0, 0).0, [2, 2, 2]);
        assert_eq!(third.get_pixel(0, 0).0, [1, 1, 1]);
    }

    #[test]
    fn test_configure_resizes_output() {
        let dir = tempfile::tempdir().unwrap();
        RawImage::from_pixel(40, 20, Rgb([9, 9, 9])).save(dir.path().join("f.png")).unwrap();
        let mut cam = ReplayCamera::open(dir.path()).unwrap();
        cam.configure((10, 5), 2.0).unwrap();
        assert_eq!(cam.capture_frame().unwrap().dimensions(), (10, 5));
        assert!(cam.configure((0, 5), 2.0).is_err());
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReplayCamera::open(dir.path()).is_err());
    }

    #[test]
    fn test_corrupt_frame_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        let mut cam = ReplayCamera::open(dir.path()).unwrap();
        assert!(cam.capture_frame().is_none());
    }
}
