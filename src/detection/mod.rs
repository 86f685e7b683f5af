//! Object detection stage.
//!
//! The detector itself is a capability behind [`Detector`]; the worker only
//! moves requests and results between queues and has no notion of flight
//! state.

pub mod color_blob;
pub mod detector;
pub mod worker;

pub use color_blob::{ColorBlobDetector, ColorBlobModel};
pub use detector::{Detection, Detector};
pub use worker::DetectionWorker;
