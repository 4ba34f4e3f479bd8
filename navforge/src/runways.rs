//! Runway end pairing and geometry.
//!
//! Sources deliver runways as single ends (`RW13L` with its own bearing
//! and threshold). The output schema wants full runways with a primary
//! and a secondary end, so opposing ends are matched by designator
//! arithmetic: the opposite of `13L` is `31R`. An end whose opposite is
//! missing from the source gets a synthesized closed stub so the runway
//! is still complete.

use crate::geo::{feet_to_meter, opposed_course, Pos, Rect, POS_EPSILON_100M};

/// One runway end as delivered by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RunwayEndInput {
    /// Source identifier including the `RW` prefix, e.g. `RW13L`
    pub ident: String,
    pub magnetic_bearing: f64,
    pub true_bearing: f64,
    pub threshold_pos: Pos,
    /// Landing threshold elevation in feet
    pub threshold_elevation: i32,
    /// Displaced threshold distance in feet
    pub displaced_threshold: i32,
    pub length: i32,
    pub width: i32,
    pub ils_ident: Option<String>,
    pub is_closed: bool,
}

impl RunwayEndInput {
    /// The designator without the `RW` prefix, e.g. `13L`.
    pub fn name(&self) -> &str {
        self.ident.strip_prefix("RW").unwrap_or(&self.ident)
    }
}

/// Computes the geometrically opposite designator.
///
/// Numeric part maps as `(n + 18) mod 36` with 0 remapped to 36; the
/// side letter swaps L and R while C and empty stay put.
pub fn opposed_runway_name(name: &str) -> String {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    let designator: String = name.chars().skip_while(|c| c.is_ascii_digit()).collect();

    let number: i32 = digits.parse().unwrap_or(0);
    let mut opposed = (number + 18) % 36;
    if opposed == 0 {
        opposed = 36;
    }

    let opposed_designator = match designator.as_str() {
        "L" => "R",
        "R" => "L",
        other => other,
    };

    format!("{opposed:02}{opposed_designator}")
}

/// Opposite of a full source identifier including the `RW` prefix.
pub fn opposed_runway_ident(ident: &str) -> String {
    let name = ident.strip_prefix("RW").unwrap_or(ident);
    format!("RW{}", opposed_runway_name(name))
}

/// Matches opposing runway ends into (primary, secondary) pairs.
///
/// Ends whose opposite exists in the set are paired once, in input
/// order. For an orphan end a closed stub is synthesized: same metrics,
/// opposite identifier and bearing, displaced threshold zeroed and ILS
/// cleared.
pub fn pair_runways(ends: &[RunwayEndInput]) -> Vec<(RunwayEndInput, RunwayEndInput)> {
    let mut pairs = Vec::new();
    let mut consumed: Vec<&str> = Vec::new();

    for end in ends {
        if consumed.contains(&end.ident.as_str()) {
            continue;
        }

        let opposed_ident = opposed_runway_ident(&end.ident);
        if let Some(other) = ends.iter().find(|o| o.ident == opposed_ident) {
            consumed.push(end.ident.as_str());
            consumed.push(other.ident.as_str());
            pairs.push((end.clone(), other.clone()));
        } else {
            let mut stub = end.clone();
            stub.ident = opposed_ident;
            stub.displaced_threshold = 0;
            stub.ils_ident = None;
            stub.true_bearing = opposed_course(end.true_bearing);
            stub.magnetic_bearing = opposed_course(end.magnetic_bearing);
            stub.is_closed = true;
            pairs.push((end.clone(), stub));
        }
    }

    pairs
}

/// Threshold positions of a paired runway.
///
/// The primary end sits opposite the landing heading, so it is projected
/// along the reciprocal course from the center.
pub fn runway_end_positions(center: Pos, length_feet: i32, true_heading: f64) -> (Pos, Pos) {
    let half = feet_to_meter(f64::from(length_feet)) / 2.0;
    let primary = center.endpoint(half, opposed_course(true_heading)).normalize();
    let secondary = center.endpoint(half, true_heading).normalize();
    (primary, secondary)
}

/// Starting rectangle for an airport: at least 100 m around the
/// reference point, to be extended by every runway endpoint.
pub fn initial_airport_rect(reference: Pos) -> Rect {
    let mut rect = Rect::from_pos(reference);
    rect.inflate(POS_EPSILON_100M, POS_EPSILON_100M);
    rect
}
