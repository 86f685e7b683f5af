//! Vehicle telemetry captured alongside each image.
//!
//! Snapshots are stored in the flight controller's native fixed-point units
//! and only scaled when a consumer (the georeferencer) needs SI values.

pub mod logger;
pub mod snapshot;

pub use logger::{TelemetryLogger, load_telemetry_log};
pub use snapshot::TelemetrySnapshot;
