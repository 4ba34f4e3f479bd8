//! Byte-level fixture builders for adapter tests.

use super::approach::LegVariant;
use super::converter::{icao_to_int, laty_to_int, lonx_to_int};
use super::rec;

/// Frames a payload as a tagged record.
pub fn record(tag: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 6);
    bytes.extend_from_slice(&tag.to_le_bytes());
    bytes.extend_from_slice(&((payload.len() as u32) + 6).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn u16_bytes(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// File header record payload.
pub fn file_header(version: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&version.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&0u32.to_le_bytes());
    record(rec::FILE_HEADER, &payload)
}

/// Airport record payload without children.
pub fn airport_bytes(
    ident: &str,
    region: &str,
    name: &str,
    lonx: f64,
    laty: f64,
    altitude: f32,
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&icao_to_int(ident).to_le_bytes());
    payload.extend_from_slice(&icao_to_int(region).to_le_bytes());
    payload.extend_from_slice(&lonx_to_int(lonx).to_le_bytes());
    payload.extend_from_slice(&laty_to_int(laty).to_le_bytes());
    payload.extend_from_slice(&altitude.to_le_bytes());
    payload.extend_from_slice(&0.0f32.to_le_bytes()); // mag var
    payload.push(3); // rating
    payload.push(0); // flags
    let mut name_field = name.as_bytes().to_vec();
    name_field.resize(32, 0);
    payload.extend_from_slice(&name_field);
    payload
}

/// Runway record payload.
#[allow(clippy::too_many_arguments)]
pub fn runway_bytes(
    primary_number: u8,
    primary_designator: u8,
    secondary_number: u8,
    secondary_designator: u8,
    lonx: f64,
    laty: f64,
    heading: f32,
    length: f32,
    width: f32,
    surface: u8,
) -> Vec<u8> {
    let mut payload = vec![
        primary_number,
        primary_designator,
        secondary_number,
        secondary_designator,
    ];
    payload.extend_from_slice(&0u32.to_le_bytes()); // primary ILS
    payload.extend_from_slice(&0u32.to_le_bytes()); // secondary ILS
    payload.extend_from_slice(&lonx_to_int(lonx).to_le_bytes());
    payload.extend_from_slice(&laty_to_int(laty).to_le_bytes());
    payload.extend_from_slice(&0.0f32.to_le_bytes()); // altitude
    payload.extend_from_slice(&heading.to_le_bytes());
    payload.extend_from_slice(&length.to_le_bytes());
    payload.extend_from_slice(&width.to_le_bytes());
    payload.push(surface);
    payload.push(0); // closed flags
    payload
}

/// COM record payload.
pub fn com_bytes(com_type: u8, frequency: u32, name: &str) -> Vec<u8> {
    let mut payload = vec![com_type, 0];
    payload.extend_from_slice(&frequency.to_le_bytes());
    let mut name_field = name.as_bytes().to_vec();
    name_field.resize(32, 0);
    payload.extend_from_slice(&name_field);
    payload
}

/// One leg in the given layout generation.
pub fn leg_bytes(leg_type: u8, fix_ident: &str, variant: LegVariant) -> Vec<u8> {
    let mut payload = vec![leg_type, b'A', 0, 0];
    payload.extend_from_slice(&(5u32 | (icao_to_int(fix_ident) << 5)).to_le_bytes());
    payload.extend_from_slice(&icao_to_int("ED").to_le_bytes());
    payload.extend_from_slice(&(2u32 | (icao_to_int("FFM") << 5)).to_le_bytes());
    payload.extend_from_slice(&icao_to_int("ED").to_le_bytes());
    for value in [0.0f32, 0.0, 68.0, 5.0, 3000.0, 0.0] {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    match variant {
        LegVariant::Legacy => {}
        LegVariant::Msfs => payload.extend_from_slice(&210.0f32.to_le_bytes()),
        LegVariant::Msfs116 => {
            payload.extend_from_slice(&210.0f32.to_le_bytes());
            payload.extend_from_slice(&[0u8; 4]);
        }
        LegVariant::Msfs118 => {
            payload.extend_from_slice(&210.0f32.to_le_bytes());
            payload.extend_from_slice(&[0u8; 8]);
        }
    }
    payload
}
