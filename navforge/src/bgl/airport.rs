//! Airport facility records.

use std::io::{Read, Seek};

use crate::geo::Pos;
use crate::io::{BinaryReader, ReadError, RecordHeader};

use super::approach::Approach;
use super::converter::{int_to_icao, int_to_laty, int_to_lonx, runway_to_str};
use super::rec;

/// Runway surface codes.
const SURFACES: [&str; 5] = ["C", "A", "G", "D", "W"];

/// COM facility type codes.
const COM_TYPES: [&str; 16] = [
    "NONE", "ATIS", "MULTICOM", "UNICOM", "CTAF", "GND", "TWR", "CLR", "APP", "DEP", "CTR", "FSS",
    "AWOS", "ASOS", "CPT", "GCO",
];

/// A runway record: one row per runway with both ends packed in.
#[derive(Debug, Clone)]
pub struct Runway {
    pub primary_name: String,
    pub secondary_name: String,
    pub primary_ils: Option<String>,
    pub secondary_ils: Option<String>,
    pub center: Pos,
    pub altitude: f64,
    pub heading: f64,
    pub length: f64,
    pub width: f64,
    pub surface: String,
    pub primary_closed: bool,
    pub secondary_closed: bool,
}

impl Runway {
    pub fn read<R: Read + Seek>(reader: &mut BinaryReader<R>) -> Result<Self, ReadError> {
        let primary_number = reader.read_u8()?;
        let primary_designator = reader.read_u8()?;
        let secondary_number = reader.read_u8()?;
        let secondary_designator = reader.read_u8()?;

        let primary_ils = reader.read_u32()?;
        let secondary_ils = reader.read_u32()?;

        let lonx = reader.read_u32()?;
        let laty = reader.read_u32()?;
        let altitude = f64::from(reader.read_f32()?);
        let heading = f64::from(reader.read_f32()?);
        let length = f64::from(reader.read_f32()?);
        let width = f64::from(reader.read_f32()?);

        let surface = reader.read_u8()? as usize;
        let flags = reader.read_u8()?;

        Ok(Self {
            primary_name: runway_to_str(primary_number, primary_designator),
            secondary_name: runway_to_str(secondary_number, secondary_designator),
            primary_ils: (primary_ils != 0).then(|| int_to_icao(primary_ils)),
            secondary_ils: (secondary_ils != 0).then(|| int_to_icao(secondary_ils)),
            center: Pos::with_altitude(int_to_lonx(lonx), int_to_laty(laty), altitude),
            altitude,
            heading,
            length,
            width,
            surface: SURFACES.get(surface).copied().unwrap_or("UNKNOWN").to_string(),
            primary_closed: flags & 0x01 != 0,
            secondary_closed: flags & 0x02 != 0,
        })
    }

    pub fn is_hard(&self) -> bool {
        matches!(self.surface.as_str(), "C" | "A")
    }

    pub fn is_soft(&self) -> bool {
        matches!(self.surface.as_str(), "G" | "D")
    }

    pub fn is_water(&self) -> bool {
        self.surface == "W"
    }
}

/// A COM frequency record.
#[derive(Debug, Clone)]
pub struct Com {
    pub com_type: String,
    /// Frequency in kHz
    pub frequency: i64,
    pub name: String,
}

impl Com {
    pub fn read<R: Read + Seek>(reader: &mut BinaryReader<R>) -> Result<Self, ReadError> {
        let com_type = reader.read_u8()? as usize;
        reader.skip(1)?;
        let frequency = i64::from(reader.read_u32()?);
        let name = reader.read_string_fixed(32)?;

        Ok(Self {
            com_type: COM_TYPES.get(com_type).copied().unwrap_or("NONE").to_string(),
            frequency,
            name,
        })
    }
}

/// An airport record with all enclosed facility records.
#[derive(Debug, Clone)]
pub struct Airport {
    pub ident: String,
    pub region: String,
    pub name: String,
    pub pos: Pos,
    pub mag_var: f64,
    pub rating: i32,
    pub is_military: bool,
    pub is_closed: bool,
    pub runways: Vec<Runway>,
    pub coms: Vec<Com>,
    pub approaches: Vec<Approach>,
}

impl Airport {
    /// Reads one airport record including all children.
    ///
    /// `modern` selects the layout generation for approach children and
    /// the unknown-tag log level.
    pub fn read<R: Read + Seek>(
        reader: &mut BinaryReader<R>,
        header: &RecordHeader,
        modern: bool,
    ) -> Result<Self, ReadError> {
        let ident = int_to_icao(reader.read_u32()?);
        let region = int_to_icao(reader.read_u32()?);
        let lonx = reader.read_u32()?;
        let laty = reader.read_u32()?;
        let altitude = f64::from(reader.read_f32()?);
        let mag_var = f64::from(reader.read_f32()?);
        let rating = i32::from(reader.read_u8()?);
        let flags = reader.read_u8()?;
        let name = reader.read_string_fixed(32)?;

        let mut airport = Self {
            ident,
            region,
            name,
            pos: Pos::with_altitude(int_to_lonx(lonx), int_to_laty(laty), altitude),
            mag_var,
            rating,
            is_military: flags & 0x01 != 0,
            is_closed: flags & 0x02 != 0,
            runways: Vec::new(),
            coms: Vec::new(),
            approaches: Vec::new(),
        };

        // Child dispatch loop: read a header, dispatch on the tag, seek
        // to the child's end regardless of how much the child consumed.
        while reader.pos() < header.end() {
            let child = reader.read_record_header(header)?;
            match child.tag {
                rec::RUNWAY => airport.runways.push(Runway::read(reader)?),
                rec::COM => airport.coms.push(Com::read(reader)?),
                rec::APPROACH | rec::APPROACH_NEW => {
                    let approach = Approach::read(reader, &child, modern)?;
                    if approach.is_valid() {
                        airport.approaches.push(approach);
                    } else {
                        tracing::warn!(
                            airport = %airport.ident,
                            "Skipping invalid approach record"
                        );
                    }
                }
                tag if modern => {
                    tracing::debug!(
                        tag = format!("0x{tag:04x}"),
                        airport = %airport.ident,
                        "Skipping unknown airport child record"
                    );
                }
                tag => {
                    tracing::warn!(
                        tag = format!("0x{tag:04x}"),
                        airport = %airport.ident,
                        offset = child.offset,
                        "Unexpected airport child record"
                    );
                }
            }
            reader.seek_to(child.end())?;
        }

        Ok(airport)
    }

    pub fn is_valid(&self) -> bool {
        !self.ident.is_empty() && self.pos.is_valid()
    }
}
