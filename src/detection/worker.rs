//! Detection worker thread.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::system::messages::{DetectionRequest, DetectionResult};
use crate::system::shutdown::ShutdownSignal;

use super::detector::Detector;

/// Timeout for receiving requests. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub struct DetectionWorker {
    /// Model behind the capability trait.
    detector: Box<dyn Detector>,

    /// Requests answered so far, for the shutdown log line.
    processed: u64,
}

impl DetectionWorker {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        Self {
            detector,
            processed: 0,
        }
    }

    /// Main thread loop: one request at a time until shutdown or until
    /// either queue is closed.
    pub fn run(
        &mut self,
        requests: Receiver<DetectionRequest>,
        results: Sender<DetectionResult>,
        shutdown: ShutdownSignal,
    ) {
        info!("detection worker started");
        loop {
            if shutdown.is_requested() {
                break;
            }

            match requests.recv_timeout(RECV_TIMEOUT) {
                Ok(request) => {
                    let result = self.process(&request);
                    if results.send(result).is_err() {
                        info!("detection result channel closed");
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("detection request channel disconnected");
                    break;
                }
            }
        }
        info!(processed = self.processed, "detection worker stopped");
    }

    /// Load and analyze one image.
    ///
    /// Always yields a result. An unreadable image or a detector failure is
    /// logged and reported as "nothing found" so that every request gets an
    /// answer.
    pub fn process(&mut self, request: &DetectionRequest) -> DetectionResult {
        let sequence_number = request.sequence_number;
        let detections = match image::open(&request.path) {
            Ok(img) => match self.detector.detect(&img.to_rgb8()) {
                Ok(d) => d,
                Err(e) => {
                    warn!(sequence_number, "detector failed: {:#}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(sequence_number, "failed to load {}: {}", request.path.display(), e);
                Vec::new()
            }
        };

        self.processed += 1;
        debug!(sequence_number, count = detections.len(), "image analyzed");
        DetectionResult {
            sequence_number,
            detections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawImage;
    use crate::detection::Detection;
    use anyhow::Result;
    use crossbeam_channel::unbounded;
    use image::Rgb;
    use std::path::Path;
    use std::thread;

    /// Reports one detection per image whose top-left pixel is white.
    struct CornerDetector;

    impl Detector for CornerDetector {
        fn detect(&mut self, image: &RawImage) -> Result<Vec<Detection>> {
            if image.get_pixel(0, 0).0 == [255, 255, 255] {
                Ok(vec![Detection {
                    object_class: "corner".into(),
                    confidence: 1.0,
                    x: 0.0,
                    y: 0.0,
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> std::path::PathBuf {
        let path = dir.join(name);
        RawImage::from_pixel(8, 8, Rgb(color)).save(&path).unwrap();
        path
    }

    #[test]
    fn test_empty_result_is_still_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "black.png", [0, 0, 0]);
        let mut worker = DetectionWorker::new(Box::new(CornerDetector));

        let result = worker.process(&DetectionRequest {
            sequence_number: 4,
            path,
        });
        assert_eq!(result.sequence_number, 4);
        assert!(result.detections.is_empty());
    }

    #[test]
    fn test_unreadable_image_reports_nothing_found() {
        let mut worker = DetectionWorker::new(Box::new(CornerDetector));
        let result = worker.process(&DetectionRequest {
            sequence_number: 1,
            path: "/nonexistent/frame.png".into(),
        });
        assert_eq!(result.sequence_number, 1);
        assert!(result.detections.is_empty());
    }

    /// Fails on every image.
    struct BrokenDetector;

    impl Detector for BrokenDetector {
        fn detect(&mut self, _image: &RawImage) -> Result<Vec<Detection>> {
            anyhow::bail!("model not loaded")
        }
    }

    #[test]
    fn test_detector_failure_still_emits_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "white.png", [255, 255, 255]);
        let (req_tx, req_rx) = unbounded();
        let (res_tx, res_rx) = unbounded();
        req_tx
            .send(DetectionRequest {
                sequence_number: 8,
                path,
            })
            .unwrap();
        drop(req_tx);

        DetectionWorker::new(Box::new(BrokenDetector)).run(req_rx, res_tx, ShutdownSignal::new());

        let results: Vec<_> = res_rx.try_iter().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sequence_number, 8);
        assert!(results[0].detections.is_empty());
    }

    #[test]
    fn test_run_preserves_order_and_stops_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let (req_tx, req_rx) = unbounded();
        let (res_tx, res_rx) = unbounded();

        for seq in 0..6u64 {
            let color = if seq % 2 == 0 { [255, 255, 255] } else { [0, 0, 0] };
            let path = write_image(dir.path(), &format!("{seq}.png"), color);
            req_tx
                .send(DetectionRequest {
                    sequence_number: seq,
                    path,
                })
                .unwrap();
        }
        drop(req_tx);

        let handle = thread::spawn(move || {
            DetectionWorker::new(Box::new(CornerDetector)).run(req_rx, res_tx, ShutdownSignal::new());
        });
        handle.join().unwrap();

        let results: Vec<_> = res_rx.try_iter().collect();
        let order: Vec<u64> = results.iter().map(|r| r.sequence_number).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(results[2].detections.len(), 1);
        assert!(results[3].detections.is_empty());
    }
}
