//! ILS feather geometry.
//!
//! Maps render a localizer as a triangular feather opening away from the
//! runway. The three polygon points are derived from the localizer
//! origin, its true heading and the angular beam width.

use crate::geo::{nm_to_meter, opposed_course, Pos};

/// Default feather length in nautical miles.
pub const ILS_FEATHER_LEN_NM: f64 = 9.0;

/// The three points of the feather polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feather {
    pub end1: Pos,
    pub mid: Pos,
    pub end2: Pos,
}

/// Computes the feather polygon.
///
/// The feather points along the reciprocal of the localizer heading into
/// the approach cone. The two corners are projected at half the beam
/// width to either side; the midpoint sits on the centerline pulled back
/// from the corner line by half the corner-to-corner distance.
pub fn feather_geometry(origin: Pos, loc_heading: f64, width_deg: f64, length_nm: f64) -> Feather {
    let length = nm_to_meter(length_nm);
    let heading = opposed_course(loc_heading);

    let end1 = origin.endpoint(length, heading - width_deg / 2.0).normalize();
    let end2 = origin.endpoint(length, heading + width_deg / 2.0).normalize();

    let feather_width = end1.distance_meter_to(&end2);
    let mid = origin
        .endpoint(length - feather_width / 2.0, heading)
        .normalize();

    Feather { end1, mid, end2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::meter_to_nm;

    #[test]
    fn test_feather_points_away_from_runway() {
        // Localizer at the origin pointing east: the feather extends west
        let origin = Pos::new(0.0, 0.0);
        let feather = feather_geometry(origin, 90.0, 4.0, 9.0);

        let c1 = origin.course_to(&feather.end1);
        let c2 = origin.course_to(&feather.end2);
        assert!((c1 - 268.0).abs() < 0.1, "corner 1 bearing {c1}");
        assert!((c2 - 272.0).abs() < 0.1, "corner 2 bearing {c2}");

        let d1 = meter_to_nm(origin.distance_meter_to(&feather.end1));
        let d2 = meter_to_nm(origin.distance_meter_to(&feather.end2));
        assert!((d1 - 9.0).abs() < 0.01, "corner 1 distance {d1}");
        assert!((d2 - 9.0).abs() < 0.01, "corner 2 distance {d2}");
    }

    #[test]
    fn test_midpoint_pulled_towards_origin() {
        let origin = Pos::new(0.0, 0.0);
        let feather = feather_geometry(origin, 90.0, 4.0, 9.0);

        let mid_course = origin.course_to(&feather.mid);
        assert!((mid_course - 270.0).abs() < 0.1, "mid bearing {mid_course}");

        // On the centerline, short of the corner line by half the feather
        // width, so east of the corners' midpoint
        let mid_dist = meter_to_nm(origin.distance_meter_to(&feather.mid));
        let feather_width = meter_to_nm(feather.end1.distance_meter_to(&feather.end2));
        assert!((mid_dist - (9.0 - feather_width / 2.0)).abs() < 0.01);
        assert!(mid_dist < 9.0);
        assert!(mid_dist > 8.0);
    }

    #[test]
    fn test_feather_symmetric_about_centerline() {
        let origin = Pos::new(8.5, 50.0);
        let feather = feather_geometry(origin, 250.0, 5.0, ILS_FEATHER_LEN_NM);

        let d1 = origin.distance_meter_to(&feather.end1);
        let d2 = origin.distance_meter_to(&feather.end2);
        assert!((d1 - d2).abs() < 1.0);
    }
}
