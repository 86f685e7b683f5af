use serde::{Deserialize, Serialize};

/// Latitude / longitude scale: degrees * 1e7.
pub const DEG_E7: f64 = 1e-7;

/// Altitude scale: millimetres.
pub const MM_TO_M: f64 = 1e-3;

/// GPS fix type below which a position is not trusted (2 = 2D fix).
pub const MIN_GPS_FIX: u8 = 2;

/// Vehicle state at the moment an image was captured.
///
/// Position and altitude use the integer encodings of the global-position
/// message, attitude is in radians as reported by the attitude message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Flight controller time since boot, milliseconds.
    pub timestamp_ms: u64,
    /// GPS fix type (0 = no GPS, 1 = no fix, 2 = 2D, 3 = 3D, ...).
    pub gps_fix_quality: u8,
    /// Latitude, degrees * 1e7.
    pub lat_e7: i32,
    /// Longitude, degrees * 1e7.
    pub lon_e7: i32,
    /// Altitude above home, millimetres.
    pub relative_alt_mm: i32,
    /// Altitude above mean sea level, millimetres.
    pub absolute_alt_mm: i32,
    /// Pitch, radians, nose up positive.
    pub pitch: f32,
    /// Roll, radians, right wing down positive.
    pub roll: f32,
    /// Yaw, radians clockwise from north.
    pub yaw: f32,
}

impl TelemetrySnapshot {
    pub fn lat_deg(&self) -> f64 {
        self.lat_e7 as f64 * DEG_E7
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon_e7 as f64 * DEG_E7
    }

    pub fn relative_alt_m(&self) -> f64 {
        self.relative_alt_mm as f64 * MM_TO_M
    }

    pub fn absolute_alt_m(&self) -> f64 {
        self.absolute_alt_mm as f64 * MM_TO_M
    }

    pub fn pitch_deg(&self) -> f64 {
        (self.pitch as f64).to_degrees()
    }

    pub fn roll_deg(&self) -> f64 {
        (self.roll as f64).to_degrees()
    }

    pub fn yaw_deg(&self) -> f64 {
        (self.yaw as f64).to_degrees()
    }

    /// True if the GPS reported at least a 2D fix.
    pub fn has_position_fix(&self) -> bool {
        self.gps_fix_quality >= MIN_GPS_FIX
    }

    /// Build a snapshot from SI values, rounding to the native encoding.
    pub fn from_degrees(
        timestamp_ms: u64,
        gps_fix_quality: u8,
        lat_deg: f64,
        lon_deg: f64,
        relative_alt_m: f64,
        absolute_alt_m: f64,
        attitude_deg: (f64, f64, f64),
    ) -> Self {
        let (pitch, roll, yaw) = attitude_deg;
        Self {
            timestamp_ms,
            gps_fix_quality,
            lat_e7: (lat_deg / DEG_E7).round() as i32,
            lon_e7: (lon_deg / DEG_E7).round() as i32,
            relative_alt_mm: (relative_alt_m / MM_TO_M).round() as i32,
            absolute_alt_mm: (absolute_alt_m / MM_TO_M).round() as i32,
            pitch: pitch.to_radians() as f32,
            roll: roll.to_radians() as f32,
            yaw: yaw.to_radians() as f32,
        }
    }
}
