//! Geometry: UTM projection and georeferencing of detections.

pub mod georef;
pub mod utm;

pub use georef::{GeoCoordinate, GeoReferencedDetection, locate};
pub use utm::{UtmPoint, UtmZone};
