//! Fixed-rate capture loop.
//!
//! Each tick drains pending camera commands, captures and stores one frame
//! if capture is enabled, then sleeps for whatever is left of the period. A
//! slow capture shortens the following sleep instead of skipping a tick.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::system::messages::{CameraCommand, ImageRecord};
use crate::system::shutdown::ShutdownSignal;

use super::camera::Camera;

const IMAGE_EXTENSION: &str = "jpg";

/// Longest uninterrupted wait between shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Remaining sleep of a tick that took `elapsed`, never negative.
pub fn tick_sleep(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

pub struct CaptureWorker {
    /// Frame source.
    camera: Box<dyn Camera>,

    /// Target time between ticks, `1 / rate`.
    period: Duration,

    /// Where frames are written as `NNNNNN.jpg`.
    output_dir: PathBuf,

    /// Sequence number of the next stored frame.
    next_sequence: u64,

    /// Toggled by `CameraCommand`s.
    capture_enabled: bool,
}

impl CaptureWorker {
    /// Create a worker writing frames into `output_dir`.
    ///
    /// Sequence numbers continue after the highest one already present in
    /// the directory, so a restart never overwrites earlier frames.
    pub fn new<P: AsRef<Path>>(
        camera: Box<dyn Camera>,
        rate_hz: f64,
        output_dir: P,
        start_enabled: bool,
    ) -> Result<Self> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            bail!("capture rate must be positive, got {}", rate_hz);
        }
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        let next_sequence = next_free_sequence(&output_dir)?;

        Ok(Self {
            camera,
            period: Duration::from_secs_f64(1.0 / rate_hz),
            output_dir,
            next_sequence,
            capture_enabled: start_enabled,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    /// Main thread loop.
    ///
    /// Between ticks the worker waits on its command queue, so commands
    /// apply as soon as they arrive and shutdown is noticed within
    /// `RECV_TIMEOUT` at any capture rate.
    pub fn run(
        &mut self,
        commands: Receiver<CameraCommand>,
        images: Sender<ImageRecord>,
        shutdown: ShutdownSignal,
    ) {
        info!(period = ?self.period, enabled = self.capture_enabled, "capture worker started");
        loop {
            if shutdown.is_requested() {
                break;
            }
            let tick_start = Instant::now();

            self.drain_commands(&commands);

            if self.capture_enabled {
                if let Some(record) = self.capture_one() {
                    if images.send(record).is_err() {
                        info!("image channel closed");
                        break;
                    }
                }
            }

            // Sleep out the rest of the period
            self.wait_for_next_tick(tick_start, &commands, &shutdown);
        }
        info!(next_sequence = self.next_sequence, "capture worker stopped");
    }

    /// Block until `period` has passed since `tick_start` or shutdown is
    /// requested, applying camera commands as they arrive.
    fn wait_for_next_tick(
        &mut self,
        tick_start: Instant,
        commands: &Receiver<CameraCommand>,
        shutdown: &ShutdownSignal,
    ) {
        loop {
            if shutdown.is_requested() {
                return;
            }
            let remaining = tick_sleep(self.period, tick_start.elapsed());
            if remaining.is_zero() {
                return;
            }
            let wait = remaining.min(RECV_TIMEOUT);
            match commands.recv_timeout(wait) {
                Ok(command) => self.apply_command(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => thread::sleep(wait),
            }
        }
    }

    fn drain_commands(&mut self, commands: &Receiver<CameraCommand>) {
        loop {
            match commands.try_recv() {
                Ok(command) => self.apply_command(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply_command(&mut self, command: CameraCommand) {
        match command {
            CameraCommand::StartCapture => {
                if !self.capture_enabled {
                    info!("capture started");
                }
                self.capture_enabled = true;
            }
            CameraCommand::StopCapture => {
                if self.capture_enabled {
                    info!("capture stopped");
                }
                self.capture_enabled = false;
            }
        }
    }

    /// Capture and store one frame. A missing frame or failed write is
    /// logged and consumes no sequence number.
    pub fn capture_one(&mut self) -> Option<ImageRecord> {
        let Some(frame) = self.camera.capture_frame() else {
            warn!("camera returned no frame, skipping tick");
            return None;
        };
        let captured_at = SystemTime::now();

        let sequence_number = self.next_sequence;
        let path = self
            .output_dir
            .join(format!("{:06}.{}", sequence_number, IMAGE_EXTENSION));
        if let Err(e) = frame.save(&path) {
            warn!(sequence_number, "failed to write {}: {}", path.display(), e);
            return None;
        }
        self.next_sequence += 1;

        debug!(sequence_number, "frame captured");
        Some(ImageRecord {
            sequence_number,
            path,
            captured_at,
        })
    }
}

/// One past the highest numbered frame in `dir`, or 0.
fn next_free_sequence(dir: &Path) -> Result<u64> {
    let mut next = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
            continue;
        }
        if let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            next = next.max(seq + 1);
        }
    }
    Ok(next)
}
