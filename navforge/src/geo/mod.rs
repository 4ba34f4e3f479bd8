//! Geodetic primitives and bearing math.
//!
//! Provides the position and rectangle types shared by every compiler
//! component plus course normalization and unit conversions. All angles
//! are degrees, all positions are WGS84 longitude/latitude, altitudes
//! are feet.

mod pos;
mod rect;
pub mod spatial;

pub use pos::{Pos, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};
pub use rect::Rect;

/// Mean earth radius used for all great-circle math.
pub const EARTH_RADIUS_METER: f64 = 6_371_000.0;

/// Roughly 100 meters expressed in degrees at the equator.
///
/// Used as the minimum half-extent of an airport bounding rectangle.
pub const POS_EPSILON_100M: f64 = 0.0009;

/// Converts feet to meters.
#[inline]
pub fn feet_to_meter(feet: f64) -> f64 {
    feet * 0.3048
}

/// Converts meters to feet.
#[inline]
pub fn meter_to_feet(meter: f64) -> f64 {
    meter / 0.3048
}

/// Converts nautical miles to meters.
#[inline]
pub fn nm_to_meter(nm: f64) -> f64 {
    nm * 1852.0
}

/// Converts meters to nautical miles.
#[inline]
pub fn meter_to_nm(meter: f64) -> f64 {
    meter / 1852.0
}

/// Normalizes a course to the range `[0, 360)` degrees.
#[inline]
pub fn normalize_course(course: f64) -> f64 {
    let mut c = course % 360.0;
    if c < 0.0 {
        c += 360.0;
    }
    c
}

/// Returns the reciprocal of a course in degrees, normalized.
#[inline]
pub fn opposed_course(course: f64) -> f64 {
    normalize_course(course + 180.0)
}
