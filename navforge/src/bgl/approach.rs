//! Approach, transition and leg records.

use std::io::{Read, Seek};

use crate::io::{BinaryReader, ReadError, RecordHeader};

use super::converter::{int_to_icao, runway_to_str};
use super::rec;

/// Leg record layout generation, derived from the record tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegVariant {
    Legacy,
    Msfs,
    Msfs116,
    Msfs118,
}

impl LegVariant {
    /// Layout for a leg-list record tag, `None` for foreign tags.
    pub fn from_tag(tag: u16) -> Option<(LegVariant, bool)> {
        match tag {
            rec::LEGS => Some((LegVariant::Legacy, false)),
            rec::MISSED_LEGS => Some((LegVariant::Legacy, true)),
            rec::LEGS_MSFS => Some((LegVariant::Msfs, false)),
            rec::MISSED_LEGS_MSFS => Some((LegVariant::Msfs, true)),
            rec::LEGS_MSFS_116 => Some((LegVariant::Msfs116, false)),
            rec::MISSED_LEGS_MSFS_116 => Some((LegVariant::Msfs116, true)),
            rec::LEGS_MSFS_118 => Some((LegVariant::Msfs118, false)),
            rec::MISSED_LEGS_MSFS_118 => Some((LegVariant::Msfs118, true)),
            _ => None,
        }
    }
}

/// ARINC path terminations in record code order.
const LEG_TYPES: [&str; 24] = [
    "", "AF", "CA", "CD", "CF", "CI", "CR", "DF", "FA", "FC", "FD", "FM", "HA", "HF", "HM", "IF",
    "PI", "RF", "TF", "VA", "VD", "VI", "VM", "VR",
];

/// Fix type nibble codes shared by approach and leg records.
fn fix_type_to_str(code: u32) -> &'static str {
    match code {
        1 => "L",
        2 => "V",
        3 => "N",
        4 => "TN",
        5 => "W",
        6 => "A",
        7 => "R",
        _ => "NONE",
    }
}

fn approach_type_to_str(code: u8) -> &'static str {
    match code {
        1 => "GPS",
        2 => "VOR",
        3 => "NDB",
        4 => "ILS",
        5 => "LOC",
        6 => "SDF",
        7 => "LDA",
        8 => "VORDME",
        9 => "NDBDME",
        10 => "RNAV",
        11 => "LOCB",
        _ => "UNKN",
    }
}

/// One logical approach or transition leg.
///
/// The union of all layout generations; fields absent from older layouts
/// stay `None`.
#[derive(Debug, Clone)]
pub struct ApproachLeg {
    pub leg_type: String,
    pub alt_descriptor: Option<char>,
    pub turn_direction: Option<char>,
    pub is_flyover: bool,
    pub is_true_course: bool,
    pub is_time: bool,
    pub fix_type: String,
    pub fix_ident: String,
    pub fix_region: String,
    pub recommended_type: String,
    pub recommended_ident: String,
    pub recommended_region: String,
    pub theta: f64,
    pub rho: f64,
    pub course: f64,
    pub dist_or_time: f64,
    pub altitude1: f64,
    pub altitude2: f64,
    pub speed_limit: Option<f64>,
}

impl ApproachLeg {
    pub fn read<R: Read + Seek>(
        reader: &mut BinaryReader<R>,
        variant: LegVariant,
    ) -> Result<Self, ReadError> {
        let leg_type_code = reader.read_u8()? as usize;
        let alt_descriptor = match reader.read_u8()? {
            0 | b' ' => None,
            b => Some(b as char),
        };
        let turn_direction = match reader.read_u8()? {
            1 => Some('L'),
            2 => Some('R'),
            3 => Some('B'),
            _ => None,
        };
        let flags = reader.read_u8()?;

        let fix_flags = reader.read_u32()?;
        let fix_region_flags = reader.read_u32()?;
        let recd_flags = reader.read_u32()?;
        let recd_region_flags = reader.read_u32()?;

        let theta = f64::from(reader.read_f32()?);
        let rho = f64::from(reader.read_f32()?);
        let course = f64::from(reader.read_f32()?);
        let dist_or_time = f64::from(reader.read_f32()?);
        let altitude1 = f64::from(reader.read_f32()?);
        let altitude2 = f64::from(reader.read_f32()?);

        let speed_limit = match variant {
            LegVariant::Legacy => None,
            _ => Some(f64::from(reader.read_f32()?)),
        };
        match variant {
            LegVariant::Msfs116 => reader.skip(4)?,
            LegVariant::Msfs118 => reader.skip(8)?,
            _ => {}
        }

        Ok(Self {
            leg_type: LEG_TYPES
                .get(leg_type_code)
                .copied()
                .unwrap_or("")
                .to_string(),
            alt_descriptor,
            turn_direction,
            is_flyover: flags & 0x01 != 0,
            is_true_course: flags & 0x02 != 0,
            is_time: flags & 0x04 != 0,
            fix_type: fix_type_to_str(fix_flags & 0xf).to_string(),
            fix_ident: int_to_icao((fix_flags >> 5) & 0xfff_ffff),
            fix_region: int_to_icao(fix_region_flags & 0x7ff),
            recommended_type: fix_type_to_str(recd_flags & 0xf).to_string(),
            recommended_ident: int_to_icao((recd_flags >> 5) & 0xfff_ffff),
            recommended_region: int_to_icao(recd_region_flags & 0x7ff),
            theta,
            rho,
            course,
            dist_or_time,
            altitude1,
            altitude2,
            speed_limit,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.leg_type.is_empty()
    }
}

/// A transition joining an en-route fix to the approach.
#[derive(Debug, Clone)]
pub struct Transition {
    pub fix_type: String,
    pub fix_ident: String,
    pub fix_region: String,
    pub altitude: f64,
    pub dme_ident: Option<String>,
    pub dme_radial: Option<f64>,
    pub dme_distance: Option<f64>,
    pub legs: Vec<ApproachLeg>,
}

impl Transition {
    pub fn read<R: Read + Seek>(
        reader: &mut BinaryReader<R>,
        header: &RecordHeader,
        leg_variant: LegVariant,
    ) -> Result<Self, ReadError> {
        let transition_type = reader.read_u8()?;
        reader.skip(1)?;
        let fix_flags = reader.read_u32()?;
        let fix_region_flags = reader.read_u32()?;
        let altitude = f64::from(reader.read_f32()?);

        // Type 2 transitions carry a DME arc reference
        let (dme_ident, dme_radial, dme_distance) = if transition_type == 2 {
            let dme_flags = reader.read_u32()?;
            let radial = f64::from(reader.read_f32()?);
            let distance = f64::from(reader.read_f32()?);
            (
                Some(int_to_icao((dme_flags >> 5) & 0xfff_ffff)),
                Some(radial),
                Some(distance),
            )
        } else {
            (None, None, None)
        };

        let mut legs = Vec::new();
        while reader.pos() < header.end() {
            let child = reader.read_record_header(header)?;
            match child.tag {
                rec::TRANSITION_LEGS => {
                    let count = reader.read_u16()?;
                    for _ in 0..count {
                        legs.push(ApproachLeg::read(reader, leg_variant)?);
                    }
                }
                tag => {
                    tracing::debug!(tag = format!("0x{tag:04x}"), "Skipping transition child");
                }
            }
            reader.seek_to(child.end())?;
        }

        Ok(Self {
            fix_type: fix_type_to_str(fix_flags & 0xf).to_string(),
            fix_ident: int_to_icao((fix_flags >> 5) & 0xfff_ffff),
            fix_region: int_to_icao(fix_region_flags & 0x7ff),
            altitude,
            dme_ident,
            dme_radial,
            dme_distance,
            legs,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.legs.is_empty() && self.legs.iter().all(ApproachLeg::is_valid)
    }
}

/// A full approach procedure record.
#[derive(Debug, Clone)]
pub struct Approach {
    pub suffix: Option<char>,
    pub runway_name: String,
    pub approach_type: String,
    pub gps_overlay: bool,
    pub fix_type: String,
    pub fix_ident: String,
    pub fix_region: String,
    pub fix_airport_ident: String,
    pub altitude: f64,
    pub heading: f64,
    pub missed_altitude: f64,
    pub legs: Vec<ApproachLeg>,
    pub missed_legs: Vec<ApproachLeg>,
    pub transitions: Vec<Transition>,
}

impl Approach {
    /// Reads an approach record including all children.
    ///
    /// `modern` selects the unknown-tag log level; the header tag selects
    /// the layout (the `APPROACH_NEW` variant carries four reserved
    /// bytes before its children).
    pub fn read<R: Read + Seek>(
        reader: &mut BinaryReader<R>,
        header: &RecordHeader,
        modern: bool,
    ) -> Result<Self, ReadError> {
        let suffix = match reader.read_u8()? {
            0 | b' ' => None,
            b => Some(b as char),
        };
        let runway_number = reader.read_u8()?;

        // Low nibble approach type, bits 4-6 runway designator, bit 7
        // GPS overlay flag
        let type_flags = reader.read_u8()?;
        let approach_type = approach_type_to_str(type_flags & 0xf);
        let runway_designator = (type_flags >> 4) & 0x7;
        let gps_overlay = type_flags & 0x80 == 0x80;

        let _num_transitions = reader.read_u8()?;
        let _num_legs = reader.read_u8()?;
        let _num_missed_legs = reader.read_u8()?;

        // Fix ident packed into 28 bits above a 5-bit shift
        let fix_flags = reader.read_u32()?;
        let fix_type = fix_type_to_str(fix_flags & 0xf);
        let fix_ident = int_to_icao((fix_flags >> 5) & 0xfff_ffff);

        let fix_ident_flags = reader.read_u32()?;
        let fix_region = int_to_icao(fix_ident_flags & 0x7ff);
        let fix_airport_ident = int_to_icao((fix_ident_flags >> 11) & 0x1f_ffff);

        let altitude = f64::from(reader.read_f32()?);
        let heading = f64::from(reader.read_f32()?);
        let missed_altitude = f64::from(reader.read_f32()?);

        if header.tag == rec::APPROACH_NEW {
            reader.skip(4)?;
        }

        let mut approach = Self {
            suffix,
            runway_name: runway_to_str(runway_number, runway_designator),
            approach_type: approach_type.to_string(),
            gps_overlay,
            fix_type: fix_type.to_string(),
            fix_ident,
            fix_region,
            fix_airport_ident,
            altitude,
            heading,
            missed_altitude,
            legs: Vec::new(),
            missed_legs: Vec::new(),
            transitions: Vec::new(),
        };

        while reader.pos() < header.end() {
            let child = reader.read_record_header(header)?;
            if let Some((variant, missed)) = LegVariant::from_tag(child.tag) {
                let count = reader.read_u16()?;
                let target = if missed {
                    &mut approach.missed_legs
                } else {
                    &mut approach.legs
                };
                for _ in 0..count {
                    target.push(ApproachLeg::read(reader, variant)?);
                }
            } else {
                match child.tag {
                    rec::TRANSITION | rec::TRANSITION_MSFS | rec::TRANSITION_MSFS_116 => {
                        let variant = match child.tag {
                            rec::TRANSITION => LegVariant::Legacy,
                            rec::TRANSITION_MSFS => LegVariant::Msfs,
                            _ => LegVariant::Msfs116,
                        };
                        approach
                            .transitions
                            .push(Transition::read(reader, &child, variant)?);
                    }
                    tag if modern => {
                        tracing::debug!(
                            tag = format!("0x{tag:04x}"),
                            airport = %approach.fix_airport_ident,
                            "Skipping unknown approach child record"
                        );
                    }
                    tag => {
                        tracing::warn!(
                            tag = format!("0x{tag:04x}"),
                            airport = %approach.fix_airport_ident,
                            offset = child.offset,
                            "Unexpected approach child record"
                        );
                    }
                }
            }
            reader.seek_to(child.end())?;
        }

        Ok(approach)
    }

    pub fn is_valid(&self) -> bool {
        !self.legs.is_empty()
            && self.approach_type != "UNKN"
            && self.legs.iter().all(ApproachLeg::is_valid)
            && self.missed_legs.iter().all(ApproachLeg::is_valid)
            && self.transitions.iter().all(Transition::is_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgl::testdata::{leg_bytes, record, u16_bytes};
    use crate::io::BinaryReader;
    use std::io::Cursor;

    fn read_approach(payload: Vec<u8>, tag: u16, modern: bool) -> Approach {
        let bytes = record(tag, &payload);
        let mut reader = BinaryReader::new(Cursor::new(bytes)).unwrap();
        let frame = reader.whole_stream_frame();
        let header = reader.read_record_header(&frame).unwrap();
        Approach::read(&mut reader, &header, modern).unwrap()
    }

    fn approach_header_bytes(suffix: u8, runway_number: u8, type_flags: u8) -> Vec<u8> {
        let mut payload = vec![suffix, runway_number, type_flags, 0, 0, 0];
        // fix: waypoint FF013, region ED, airport EDDF
        let fix_flags = 5u32 | (crate::bgl::converter::icao_to_int("FF013") << 5);
        payload.extend_from_slice(&fix_flags.to_le_bytes());
        let region_flags = crate::bgl::converter::icao_to_int("ED")
            | (crate::bgl::converter::icao_to_int("EDDF") << 11);
        payload.extend_from_slice(&region_flags.to_le_bytes());
        payload.extend_from_slice(&3000.0f32.to_le_bytes()); // altitude
        payload.extend_from_slice(&68.0f32.to_le_bytes()); // heading
        payload.extend_from_slice(&5000.0f32.to_le_bytes()); // missed altitude
        payload
    }

    #[test]
    fn test_approach_header_bit_fields() {
        // Type 4 = ILS, designator 3 = C, GPS overlay set
        let mut payload = approach_header_bytes(b'X', 7, 4 | (3 << 4) | 0x80);
        let mut legs = u16_bytes(1);
        legs.extend_from_slice(&leg_bytes(15, "FF013", LegVariant::Legacy)); // IF leg
        payload.extend_from_slice(&record(rec::LEGS, &legs));

        let approach = read_approach(payload, rec::APPROACH, false);
        assert_eq!(approach.suffix, Some('X'));
        assert_eq!(approach.runway_name, "07C");
        assert_eq!(approach.approach_type, "ILS");
        assert!(approach.gps_overlay);
        assert_eq!(approach.fix_ident, "FF013");
        assert_eq!(approach.fix_region, "ED");
        assert_eq!(approach.fix_airport_ident, "EDDF");
        assert_eq!(approach.legs.len(), 1);
        assert_eq!(approach.legs[0].leg_type, "IF");
        assert!(approach.is_valid());
    }

    #[test]
    fn test_leg_layout_generations() {
        for (tag, variant) in [
            (rec::LEGS, LegVariant::Legacy),
            (rec::LEGS_MSFS, LegVariant::Msfs),
            (rec::LEGS_MSFS_116, LegVariant::Msfs116),
            (rec::LEGS_MSFS_118, LegVariant::Msfs118),
        ] {
            let mut payload = approach_header_bytes(0, 9, 10); // RNAV 09
            let mut legs = u16_bytes(2);
            legs.extend_from_slice(&leg_bytes(15, "WPT01", variant));
            legs.extend_from_slice(&leg_bytes(18, "WPT02", variant));
            payload.extend_from_slice(&record(tag, &legs));

            let approach = read_approach(payload, rec::APPROACH, true);
            assert_eq!(approach.legs.len(), 2, "tag 0x{tag:04x}");
            assert_eq!(approach.legs[0].leg_type, "IF");
            assert_eq!(approach.legs[1].leg_type, "TF");
            assert_eq!(approach.legs[1].fix_ident, "WPT02");
            match variant {
                LegVariant::Legacy => assert!(approach.legs[0].speed_limit.is_none()),
                _ => assert_eq!(approach.legs[0].speed_limit, Some(210.0)),
            }
        }
    }

    #[test]
    fn test_missed_legs_and_transition() {
        let mut payload = approach_header_bytes(0, 25, 4);

        let mut legs = u16_bytes(1);
        legs.extend_from_slice(&leg_bytes(15, "FINAL", LegVariant::Legacy));
        payload.extend_from_slice(&record(rec::LEGS, &legs));

        let mut missed = u16_bytes(1);
        missed.extend_from_slice(&leg_bytes(2, "MISSD", LegVariant::Legacy)); // CA leg
        payload.extend_from_slice(&record(rec::MISSED_LEGS, &missed));

        // Transition with one leg
        let mut trans = vec![1u8, 0u8];
        let fix_flags = 5u32 | (crate::bgl::converter::icao_to_int("TRANS") << 5);
        trans.extend_from_slice(&fix_flags.to_le_bytes());
        trans.extend_from_slice(&crate::bgl::converter::icao_to_int("ED").to_le_bytes());
        trans.extend_from_slice(&7000.0f32.to_le_bytes());
        let mut trans_legs = u16_bytes(1);
        trans_legs.extend_from_slice(&leg_bytes(18, "TRANS", LegVariant::Legacy));
        trans.extend_from_slice(&record(rec::TRANSITION_LEGS, &trans_legs));
        payload.extend_from_slice(&record(rec::TRANSITION, &trans));

        let approach = read_approach(payload, rec::APPROACH, false);
        assert_eq!(approach.legs.len(), 1);
        assert_eq!(approach.missed_legs.len(), 1);
        assert_eq!(approach.transitions.len(), 1);
        assert_eq!(approach.transitions[0].fix_ident, "TRANS");
        assert_eq!(approach.transitions[0].altitude, 7000.0);
        assert_eq!(approach.transitions[0].legs.len(), 1);
        assert!(approach.is_valid());
    }

    #[test]
    fn test_unknown_child_skipped() {
        let mut payload = approach_header_bytes(0, 11, 1);
        let mut legs = u16_bytes(1);
        legs.extend_from_slice(&leg_bytes(15, "FIX", LegVariant::Legacy));
        payload.extend_from_slice(&record(rec::LEGS, &legs));
        // A record type this reader has never heard of
        payload.extend_from_slice(&record(0x00f3, &[1, 2, 3, 4]));

        let approach = read_approach(payload, rec::APPROACH, true);
        assert_eq!(approach.legs.len(), 1);
        assert!(approach.is_valid());
    }

    #[test]
    fn test_approach_without_legs_invalid() {
        let payload = approach_header_bytes(0, 11, 1);
        let approach = read_approach(payload, rec::APPROACH, false);
        assert!(!approach.is_valid());
    }
}
