//! Pipeline orchestration and thread management.
//!
//! This module contains the `Orchestrator` state machine, the `Pipeline`
//! that spawns and joins the worker threads, and the queue payloads they
//! exchange.

pub mod messages;
pub mod orchestrator;
mod pipeline;
pub mod shutdown;

pub use messages::{CameraCommand, DetectionRequest, DetectionResult, ImageRecord};
pub use orchestrator::{Orchestrator, OrchestratorChannels};
pub use pipeline::{Pipeline, TELEMETRY_LOG_NAME};
pub use shutdown::ShutdownSignal;
