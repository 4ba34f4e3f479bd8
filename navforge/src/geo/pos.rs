//! Geodetic position type.

use std::fmt;

use super::{normalize_course, EARTH_RADIUS_METER};

/// Valid latitude range
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// A geodetic position: longitude/latitude in degrees, altitude in feet.
///
/// The default value sits at the null island origin (0/0/0) which is
/// treated as "not set" by the spatial structures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pos {
    /// Longitude (east-west), positive east
    pub lonx: f64,
    /// Latitude (north-south), positive north
    pub laty: f64,
    /// Altitude in feet
    pub altitude: f64,
}

impl Pos {
    /// Creates a position at zero altitude.
    pub fn new(lonx: f64, laty: f64) -> Self {
        Self {
            lonx,
            laty,
            altitude: 0.0,
        }
    }

    /// Creates a position with an altitude in feet.
    pub fn with_altitude(lonx: f64, laty: f64, altitude: f64) -> Self {
        Self {
            lonx,
            laty,
            altitude,
        }
    }

    /// True if both coordinates are exactly zero.
    ///
    /// Positions at the null island origin are excluded from spatial
    /// indexing and nearest queries.
    pub fn is_null(&self) -> bool {
        self.lonx == 0.0 && self.laty == 0.0
    }

    /// True if both coordinates are inside the valid ranges.
    pub fn is_valid(&self) -> bool {
        (MIN_LON..=MAX_LON).contains(&self.lonx) && (MIN_LAT..=MAX_LAT).contains(&self.laty)
    }

    /// Wraps the longitude into `[-180, 180]` and clamps the latitude.
    pub fn normalize(mut self) -> Self {
        while self.lonx > MAX_LON {
            self.lonx -= 360.0;
        }
        while self.lonx < MIN_LON {
            self.lonx += 360.0;
        }
        self.laty = self.laty.clamp(MIN_LAT, MAX_LAT);
        self
    }

    /// Great-circle distance to another position in meters (haversine).
    pub fn distance_meter_to(&self, other: &Pos) -> f64 {
        let lat1 = self.laty.to_radians();
        let lat2 = other.laty.to_radians();
        let dlat = (other.laty - self.laty).to_radians();
        let dlon = (other.lonx - self.lonx).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METER * c
    }

    /// Initial great-circle course to another position in degrees.
    pub fn course_to(&self, other: &Pos) -> f64 {
        let lat1 = self.laty.to_radians();
        let lat2 = other.laty.to_radians();
        let dlon = (other.lonx - self.lonx).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        normalize_course(y.atan2(x).to_degrees())
    }

    /// Projects a new position along a great circle.
    ///
    /// # Arguments
    ///
    /// * `distance_meter` - Distance to travel
    /// * `course_deg` - Initial true course in degrees
    ///
    /// The resulting position keeps this position's altitude.
    pub fn endpoint(&self, distance_meter: f64, course_deg: f64) -> Pos {
        let dist = distance_meter / EARTH_RADIUS_METER;
        let brg = course_deg.to_radians();
        let lat1 = self.laty.to_radians();
        let lon1 = self.lonx.to_radians();

        let lat2 = (lat1.sin() * dist.cos() + lat1.cos() * dist.sin() * brg.cos()).asin();
        let lon2 = lon1
            + (brg.sin() * dist.sin() * lat1.cos()).atan2(dist.cos() - lat1.sin() * lat2.sin());

        Pos {
            lonx: lon2.to_degrees(),
            laty: lat2.to_degrees(),
            altitude: self.altitude,
        }
    }

    /// Cartesian unit-sphere vector for spatial indexing.
    pub(crate) fn to_cartesian(self) -> [f64; 3] {
        let lat = self.laty.to_radians();
        let lon = self.lonx.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({:.6}, {:.6}, {:.1} ft)", self.lonx, self.laty, self.altitude)
    }
}
