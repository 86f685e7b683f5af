//! Georeferencing of detections.
//!
//! Projects the ray through a detection's pixel position onto a flat ground
//! plane at the vehicle's height above home, then moves the vehicle's own
//! position by that offset in the UTM grid.

use nalgebra::{Rotation2, Vector2};

use crate::detection::Detection;
use crate::telemetry::TelemetrySnapshot;

use super::utm::{self, UtmZone};

/// Rays steeper than this from nadir never reach a useful ground point.
pub const MAX_VIEW_ANGLE_DEG: f64 = 80.0;

/// Absolute position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lon: f64,
}

/// A detection placed on the ground.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoReferencedDetection {
    pub object_class: String,
    pub confidence: f32,
    pub lat: f64,
    pub lon: f64,
}

impl GeoReferencedDetection {
    pub fn new(detection: &Detection, position: GeoCoordinate) -> Self {
        Self {
            object_class: detection.object_class.clone(),
            confidence: detection.confidence,
            lat: position.lat,
            lon: position.lon,
        }
    }
}

/// Angular offset of a detection from the camera boresight, degrees,
/// corrected by vehicle roll (x) and pitch (y). Positive y is forward.
pub fn view_angles(
    telemetry: &TelemetrySnapshot,
    detection: &Detection,
    hfov_deg: f64,
    vfov_deg: f64,
) -> (f64, f64) {
    let angle_x = (detection.x as f64 - 0.5) * hfov_deg + telemetry.roll_deg();
    let angle_y = -(detection.y as f64 - 0.5) * vfov_deg + telemetry.pitch_deg();
    (angle_x, angle_y)
}

/// Ground position of `detection`, or `None` when it cannot be placed:
/// no position fix, vehicle below home, a ray too close to the horizon,
/// or a vehicle position outside UTM coverage.
pub fn locate(
    telemetry: &TelemetrySnapshot,
    detection: &Detection,
    hfov_deg: f64,
    vfov_deg: f64,
) -> Option<GeoCoordinate> {
    if !telemetry.has_position_fix() {
        return None;
    }
    let altitude = telemetry.relative_alt_m();
    if altitude < 0.0 {
        return None;
    }

    let (angle_x, angle_y) = view_angles(telemetry, detection, hfov_deg, vfov_deg);
    if !angle_x.is_finite()
        || !angle_y.is_finite()
        || angle_x.abs() >= MAX_VIEW_ANGLE_DEG
        || angle_y.abs() >= MAX_VIEW_ANGLE_DEG
    {
        return None;
    }

    // x = right, y = forward in the body frame
    let body_offset = Vector2::new(
        altitude * angle_x.to_radians().tan(),
        altitude * angle_y.to_radians().tan(),
    );
    // yaw is clockwise from north, Rotation2 is counter-clockwise
    let east_north = Rotation2::new(-telemetry.yaw_deg().to_radians()) * body_offset;

    let (lat, lon) = (telemetry.lat_deg(), telemetry.lon_deg());
    let zone = UtmZone::containing(lat, lon)?;
    let target = utm::to_utm(lat, lon, zone).offset(east_north.x, east_north.y);
    let (lat, lon) = utm::from_utm(&target);

    (lat.is_finite() && lon.is_finite()).then_some(GeoCoordinate { lat, lon })
}
