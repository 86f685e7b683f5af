//! Orchestrator - owner of the flight state.
//!
//! Runs a polling loop on its own thread. Each tick, in this order:
//! 1. applies pending vehicle commands
//! 2. drains new images: telemetry stamp, optional status text, forward to
//!    detection while in `LandingSearch`
//! 3. drains detection results: georeference and, on the landing target,
//!    switch `LandingSearch -> Landing`
//! 4. relays the latest image if one was requested
//!
//! Nothing but this loop writes the flight state or the relay flag. The
//! relay runs synchronously, so a transfer delays image and result handling
//! for its duration (up to two ack timeouts plus streaming time).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::{CameraConfig, OrchestratorConfig, TransferConfig};
use crate::flight::FlightState;
use crate::geometry::{GeoReferencedDetection, locate};
use crate::link::{LinkMessage, VehicleCommand, VehicleLink};
use crate::telemetry::TelemetryLogger;
use crate::transfer::ImageTransfer;

use super::messages::{DetectionRequest, DetectionResult, ImageRecord};
use super::shutdown::ShutdownSignal;

/// Queue ends owned by the orchestrator.
pub struct OrchestratorChannels {
    /// Captured frames from the capture worker.
    pub images: Receiver<ImageRecord>,
    /// Detection output, one result per request.
    pub results: Receiver<DetectionResult>,
    /// Operator commands forwarded by the link listener.
    pub commands: Receiver<VehicleCommand>,
    /// Work for the detection worker.
    pub detection: Sender<DetectionRequest>,
}

pub struct Orchestrator {
    /// Current flight phase. Only this loop writes it.
    state: FlightState,

    /// Queue ends to and from the other workers.
    channels: OrchestratorChannels,

    /// Per-image telemetry, looked up again when results arrive.
    telemetry: TelemetryLogger,

    /// Outbound status channel; `None` when running unlinked.
    link: Option<Arc<dyn VehicleLink>>,
    transfer: Option<ImageTransfer>,

    /// Detection class that ends the landing search.
    target_class: String,

    /// Field of view used to georeference detections.
    camera: CameraConfig,

    /// Sleep after a tick that found no work.
    idle_sleep: Duration,
    announce_images: bool,

    /// Set by a relay command, cleared once the relay has been attempted.
    relay_requested: bool,

    /// Most recent capture, the candidate for a relay.
    latest_image: Option<ImageRecord>,
    landing_target: Option<GeoReferencedDetection>,
}

impl Orchestrator {
    /// Create an unlinked orchestrator in `Idle`.
    pub fn new(
        channels: OrchestratorChannels,
        telemetry: TelemetryLogger,
        target_class: impl Into<String>,
        camera: CameraConfig,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            state: FlightState::default(),
            channels,
            telemetry,
            link: None,
            transfer: None,
            target_class: target_class.into(),
            camera,
            idle_sleep: Duration::from_millis(config.idle_sleep_ms),
            announce_images: config.announce_images,
            relay_requested: false,
            latest_image: None,
            landing_target: None,
        }
    }

    /// Send status and relayed images over `link`.
    pub fn with_link(mut self, link: Arc<dyn VehicleLink>, transfer: &TransferConfig) -> Self {
        self.transfer = Some(ImageTransfer::new(link.clone(), transfer));
        self.link = Some(link);
        self
    }

    pub fn state(&self) -> FlightState {
        self.state
    }

    pub fn relay_pending(&self) -> bool {
        self.relay_requested
    }

    pub fn latest_image(&self) -> Option<&ImageRecord> {
        self.latest_image.as_ref()
    }

    /// Detection that triggered the switch to `Landing`, if any.
    pub fn landing_target(&self) -> Option<&GeoReferencedDetection> {
        self.landing_target.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryLogger {
        &self.telemetry
    }

    /// Main thread loop. Sleeps between ticks that found no work.
    pub fn run(&mut self, shutdown: ShutdownSignal) {
        info!(state = %self.state, target = %self.target_class, "orchestrator started");
        while !shutdown.is_requested() {
            if !self.tick() {
                thread::sleep(self.idle_sleep);
            }
        }
        info!(state = %self.state, "orchestrator stopped");
    }

    /// One pass over all inputs. Never blocks except for a relay.
    ///
    /// Returns whether anything was processed.
    pub fn tick(&mut self) -> bool {
        // Commands first so a mode change applies to this tick's images
        let mut worked = self.drain_commands();

        // Stamp telemetry and hand frames to detection
        worked |= self.drain_images();

        // Georeference results, maybe switch to Landing
        worked |= self.drain_results();

        // Relay last, it blocks on acks
        worked |= self.relay_if_requested();
        worked
    }

    fn drain_commands(&mut self) -> bool {
        let mut worked = false;
        while let Ok(command) = self.channels.commands.try_recv() {
            worked = true;
            self.apply_command(command);
        }
        worked
    }

    fn apply_command(&mut self, command: VehicleCommand) {
        match command {
            VehicleCommand::SetMode(state) => self.set_state(state, "operator"),
            VehicleCommand::SetIndicator(pattern) => {
                debug!(pattern, "indicator request ignored");
            }
            VehicleCommand::RequestImageRelay => {
                if !self.relay_requested {
                    info!("image relay requested");
                }
                self.relay_requested = true;
            }
        }
    }

    fn set_state(&mut self, state: FlightState, cause: &str) {
        if state == self.state {
            debug!(%state, cause, "already in requested state");
            return;
        }
        info!(from = %self.state, to = %state, cause, "flight state changed");
        self.state = state;
    }

    fn drain_images(&mut self) -> bool {
        let mut worked = false;
        while let Ok(record) = self.channels.images.try_recv() {
            worked = true;
            self.handle_image(record);
        }
        worked
    }

    fn handle_image(&mut self, record: ImageRecord) {
        let seq = record.sequence_number;
        if self.telemetry.log_capture(seq).is_none() {
            debug!(seq, "no telemetry for image");
        }

        if self.announce_images {
            self.send_status(format!("image {} captured", seq));
        }

        if self.state.analyzes_images() {
            let request = DetectionRequest {
                sequence_number: seq,
                path: record.path.clone(),
            };
            if self.channels.detection.send(request).is_err() {
                warn!(seq, "detection worker gone, image not analyzed");
            }
        }

        self.latest_image = Some(record);
    }

    fn drain_results(&mut self) -> bool {
        let mut worked = false;
        while let Ok(result) = self.channels.results.try_recv() {
            worked = true;
            self.handle_result(result);
        }
        worked
    }

    fn handle_result(&mut self, result: DetectionResult) {
        let seq = result.sequence_number;
        if self.state != FlightState::LandingSearch {
            debug!(seq, state = %self.state, "detection result discarded");
            return;
        }
        let Some(snapshot) = self.telemetry.get(seq).copied() else {
            debug!(seq, "no telemetry for detection result");
            return;
        };

        let mut target = None;
        for detection in &result.detections {
            let Some(position) =
                locate(&snapshot, detection, self.camera.hfov_deg, self.camera.vfov_deg)
            else {
                debug!(seq, class = %detection.object_class, "detection not locatable");
                continue;
            };
            let located = GeoReferencedDetection::new(detection, position);
            debug!(
                seq,
                class = %located.object_class,
                confidence = located.confidence,
                lat = located.lat,
                lon = located.lon,
                "detection located"
            );
            if target.is_none() && located.object_class == self.target_class {
                target = Some(located);
            }
        }

        if let Some(target) = target {
            self.set_state(FlightState::Landing, "landing target found");
            self.send_status(format!(
                "landing target {} at {:.7},{:.7}",
                target.object_class, target.lat, target.lon
            ));
            self.landing_target = Some(target);
        }
    }

    fn relay_if_requested(&mut self) -> bool {
        if !self.relay_requested {
            return false;
        }
        let Some(record) = self.latest_image.as_ref() else {
            return false;
        };

        match self.transfer.as_ref() {
            Some(transfer) => match transfer.relay(record) {
                Ok(report) => info!(
                    seq = report.sequence_number,
                    bytes = report.bytes,
                    chunks = report.chunks,
                    "image relay complete"
                ),
                Err(e) => warn!(seq = record.sequence_number, "image relay failed: {}", e),
            },
            None => warn!("image relay requested without a vehicle link"),
        }
        self.relay_requested = false;
        true
    }

    fn send_status(&self, text: String) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        if let Err(e) = link.send(&LinkMessage::StatusText(text)) {
            warn!("failed to send status text: {:#}", e);
        }
    }
}
