//! Universal Transverse Mercator projection on the WGS84 ellipsoid.
//!
//! Series expansions after Snyder, "Map Projections: A Working Manual"
//! (USGS PP 1395), eqs. 8-9 to 8-25. Sub-millimetre within a zone.

/// WGS84 semi-major axis (m).
const A: f64 = 6_378_137.0;
/// WGS84 flattening.
const F: f64 = 1.0 / 298.257_223_563;
/// Central meridian scale factor.
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// UTM is defined between these latitudes; polar regions use UPS.
pub const MIN_LAT: f64 = -80.0;
pub const MAX_LAT: f64 = 84.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    /// 1..=60
    pub number: u8,
    pub northern: bool,
}

impl UtmZone {
    /// Zone containing the given point, `None` outside UTM coverage.
    pub fn containing(lat_deg: f64, lon_deg: f64) -> Option<Self> {
        if !(MIN_LAT..=MAX_LAT).contains(&lat_deg) || !(-180.0..=180.0).contains(&lon_deg) {
            return None;
        }
        let number = (((lon_deg + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8;
        Some(Self {
            number,
            northern: lat_deg >= 0.0,
        })
    }

    pub fn central_meridian_deg(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    fn false_northing(&self) -> f64 {
        if self.northern { 0.0 } else { FALSE_NORTHING_SOUTH }
    }
}

/// Planar position in a specific zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmPoint {
    pub easting: f64,
    pub northing: f64,
    pub zone: UtmZone,
}

impl UtmPoint {
    /// Same zone, shifted by `east` / `north` metres of grid distance.
    pub fn offset(&self, east: f64, north: f64) -> Self {
        Self {
            easting: self.easting + east,
            northing: self.northing + north,
            zone: self.zone,
        }
    }
}

fn eccentricity_sq() -> f64 {
    F * (2.0 - F)
}

/// Meridian arc length from the equator to latitude `phi` (radians).
fn meridian_arc(phi: f64) -> f64 {
    let e2 = eccentricity_sq();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    A * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
        - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Project latitude / longitude (degrees) into `zone`.
///
/// The zone is an explicit argument so that a point and its offsets are
/// always expressed in the same grid, even across a zone boundary.
pub fn to_utm(lat_deg: f64, lon_deg: f64, zone: UtmZone) -> UtmPoint {
    let e2 = eccentricity_sq();
    let ep2 = e2 / (1.0 - e2);

    let phi = lat_deg.to_radians();
    let dlambda = (lon_deg - zone.central_meridian_deg()).to_radians();

    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = phi.tan();

    let n = A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = dlambda * cos_phi;
    let m = meridian_arc(phi);

    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_phi
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0))
        + zone.false_northing();

    UtmPoint {
        easting,
        northing,
        zone,
    }
}

/// Inverse projection back to latitude / longitude (degrees), using the
/// point's own zone.
pub fn from_utm(point: &UtmPoint) -> (f64, f64) {
    let e2 = eccentricity_sq();
    let ep2 = e2 / (1.0 - e2);
    let sqrt_1me2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);

    let x = point.easting - FALSE_EASTING;
    let y = point.northing - point.zone.false_northing();

    let m = y / K0;
    let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin_phi1, cos_phi1) = phi1.sin_cos();
    let tan_phi1 = phi1.tan();
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - e2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let dlambda = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
            / 120.0)
        / cos_phi1;

    (
        phi.to_degrees(),
        point.zone.central_meridian_deg() + dlambda.to_degrees(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_zone_lookup() {
        let zurich = UtmZone::containing(47.3977, 8.5456).unwrap();
        assert_eq!(zurich.number, 32);
        assert!(zurich.northern);
        assert_abs_diff_eq!(zurich.central_meridian_deg(), 9.0);

        let sydney = UtmZone::containing(-33.86, 151.21).unwrap();
        assert_eq!(sydney.number, 56);
        assert!(!sydney.northern);

        assert_eq!(UtmZone::containing(0.0, 180.0).unwrap().number, 60);
        assert!(UtmZone::containing(85.0, 0.0).is_none());
    }

    #[test]
    fn test_central_meridian_on_false_easting() {
        let zone = UtmZone::containing(45.0, 9.0).unwrap();
        let p = to_utm(45.0, 9.0, zone);
        assert_abs_diff_eq!(p.easting, 500_000.0, epsilon = 1e-6);
        // reference northing of 45N on a central meridian
        assert_abs_diff_eq!(p.northing, 4_982_950.4, epsilon = 0.5);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let points = [
            (47.397742, 8.545594),
            (-33.8688, 151.2093),
            (0.5, -78.4),
            (64.1466, -21.9426),
            (-45.0, 170.9),
        ];
        for (lat, lon) in points {
            let zone = UtmZone::containing(lat, lon).unwrap();
            let (lat2, lon2) = from_utm(&to_utm(lat, lon, zone));
            assert_abs_diff_eq!(lat, lat2, epsilon = 1e-6);
            assert_abs_diff_eq!(lon, lon2, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_offset_stays_in_zone() {
        // near the eastern edge of zone 32
        let zone = UtmZone::containing(47.0, 11.999).unwrap();
        let p = to_utm(47.0, 11.999, zone).offset(500.0, 0.0);
        assert_eq!(p.zone, zone);
        let (_, lon) = from_utm(&p);
        assert!(lon > 12.0);
    }
}
