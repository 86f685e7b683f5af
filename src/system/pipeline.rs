//! Pipeline - thread setup and lifecycle.
//!
//! Wires the capture worker, detection worker and orchestrator together
//! with FIFO queues and runs each on its own thread. Vehicle commands reach
//! the orchestrator through a bounded queue filled by a link listener.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, bounded, unbounded};
use tracing::{info, warn};

use crate::capture::{Camera, CaptureWorker};
use crate::config::ScoutConfig;
use crate::detection::{DetectionWorker, Detector};
use crate::link::{ListenerId, VehicleLink, install_command_listener};
use crate::telemetry::TelemetryLogger;

use super::messages::CameraCommand;
use super::orchestrator::{Orchestrator, OrchestratorChannels};
use super::shutdown::ShutdownSignal;

/// Capacity of the command queue between the link listener and the
/// orchestrator. The listener blocks when it is full, which holds up every
/// other listener on the link's receive thread (transfer acks included), so
/// this is sized well above any burst an operator can produce.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Telemetry log file name inside the capture output directory.
pub const TELEMETRY_LOG_NAME: &str = "telemetry.csv";

/// Running pipeline. Stops and joins its threads when dropped.
pub struct Pipeline {
    /// Shared with every worker thread.
    shutdown: ShutdownSignal,

    /// Start/stop requests for the capture worker.
    camera_commands: Sender<CameraCommand>,

    /// Removed from the link on shutdown so the link stops feeding a
    /// queue nobody drains.
    command_listener: Option<(Arc<dyn VehicleLink>, ListenerId)>,

    /// Capture, detection and orchestrator threads, in spawn order.
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Configure the camera and spawn all workers.
    ///
    /// `target_class` is the detection class that triggers landing.
    pub fn start(
        config: &ScoutConfig,
        mut camera: Box<dyn Camera>,
        detector: Box<dyn Detector>,
        target_class: String,
        link: Option<Arc<dyn VehicleLink>>,
    ) -> Result<Self> {
        let capture = &config.capture;
        camera
            .configure(capture.resolution, capture.rate_hz)
            .context("Failed to configure camera")?;
        let mut capture_worker = CaptureWorker::new(
            camera,
            capture.rate_hz,
            &capture.output_dir,
            capture.start_enabled,
        )?;
        let telemetry =
            TelemetryLogger::create(capture.output_dir.join(TELEMETRY_LOG_NAME), link.clone())?;
        if let Some(path) = telemetry.path() {
            info!(path = %path.display(), "logging telemetry");
        }

        let (camera_tx, camera_rx) = unbounded();
        let (image_tx, image_rx) = unbounded();
        let (request_tx, request_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let (command_tx, command_rx) = bounded(COMMAND_CHANNEL_CAPACITY);

        let mut orchestrator = Orchestrator::new(
            OrchestratorChannels {
                images: image_rx,
                results: result_rx,
                commands: command_rx,
                detection: request_tx,
            },
            telemetry,
            target_class,
            config.camera,
            &config.orchestrator,
        );
        let command_listener = match link {
            Some(link) => {
                let id = install_command_listener(link.as_ref(), command_tx);
                orchestrator = orchestrator.with_link(link.clone(), &config.transfer);
                Some((link, id))
            }
            None => {
                warn!("no vehicle link, running without telemetry or commands");
                None
            }
        };

        let shutdown = ShutdownSignal::new();
        let mut detection_worker = DetectionWorker::new(detector);

        let mut handles = Vec::with_capacity(3);
        let stop = shutdown.clone();
        handles.push(
            thread::Builder::new()
                .name("capture".into())
                .spawn(move || capture_worker.run(camera_rx, image_tx, stop))?,
        );
        let stop = shutdown.clone();
        handles.push(
            thread::Builder::new()
                .name("detection".into())
                .spawn(move || detection_worker.run(request_rx, result_tx, stop))?,
        );
        let stop = shutdown.clone();
        handles.push(
            thread::Builder::new()
                .name("orchestrator".into())
                .spawn(move || orchestrator.run(stop))?,
        );

        info!("pipeline started");
        Ok(Self {
            shutdown,
            camera_commands: camera_tx,
            command_listener,
            handles,
        })
    }

    /// Start or stop image capture.
    pub fn set_capture(&self, enabled: bool) {
        let command = if enabled {
            CameraCommand::StartCapture
        } else {
            CameraCommand::StopCapture
        };
        if self.camera_commands.send(command).is_err() {
            warn!("capture worker gone, {:?} dropped", command);
        }
    }

    /// Block until every worker has exited.
    pub fn join(mut self) {
        self.join_workers();
    }

    /// Signal all workers to finish and wait for them.
    pub fn shutdown(&mut self) {
        self.shutdown.request();
        if let Some((link, id)) = self.command_listener.take() {
            link.unsubscribe(id);
        }
        self.join_workers();
    }

    fn join_workers(&mut self) {
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "worker thread panicked");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
