//! Image capture: the camera capability and the fixed-rate capture worker.

pub mod camera;
pub mod worker;

pub use camera::{Camera, RawImage, ReplayCamera};
pub use worker::{CaptureWorker, tick_sleep};
