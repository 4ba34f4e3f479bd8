//! Decoders for packed archive fields.

/// Decodes a packed ICAO identifier.
///
/// Identifiers are coded base 38, most significant character first:
/// digit 0 is the terminator, 1 a space, 2 to 11 the digits `0`-`9` and
/// 12 to 37 the letters `A`-`Z`. At most five characters fit into the
/// 28-bit payload.
pub fn int_to_icao(value: u32) -> String {
    let mut digits = Vec::new();
    let mut value = value;
    while value > 0 {
        digits.push(value % 38);
        value /= 38;
    }

    digits
        .iter()
        .rev()
        .filter_map(|&digit| match digit {
            0 => None,
            1 => Some(' '),
            2..=11 => Some((b'0' + (digit as u8 - 2)) as char),
            _ => Some((b'A' + (digit as u8 - 12)) as char),
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Packs an identifier; inverse of [`int_to_icao`], used by tests and
/// fixture builders.
pub fn icao_to_int(ident: &str) -> u32 {
    let mut value = 0u32;
    for ch in ident.chars() {
        let digit = match ch {
            ' ' => 1,
            '0'..='9' => 2 + (ch as u32 - '0' as u32),
            'A'..='Z' => 12 + (ch as u32 - 'A' as u32),
            _ => continue,
        };
        value = value * 38 + digit;
    }
    value
}

/// Decodes a 32-bit fixed-point longitude.
pub fn int_to_lonx(value: u32) -> f64 {
    f64::from(value) * (360.0 / 4_294_967_296.0) - 180.0
}

/// Decodes a 32-bit fixed-point latitude.
pub fn int_to_laty(value: u32) -> f64 {
    90.0 - f64::from(value) * (180.0 / 4_294_967_296.0)
}

/// Encodes a longitude; inverse of [`int_to_lonx`].
pub fn lonx_to_int(lonx: f64) -> u32 {
    ((lonx + 180.0) / (360.0 / 4_294_967_296.0)).round() as u32
}

/// Encodes a latitude; inverse of [`int_to_laty`].
pub fn laty_to_int(laty: f64) -> u32 {
    ((90.0 - laty) / (180.0 / 4_294_967_296.0)).round() as u32
}

/// Runway designator codes used in runway and approach records.
const DESIGNATORS: [&str; 4] = ["", "L", "R", "C"];

/// Builds a runway name like `13R` from the packed number and designator.
///
/// Number 0 means "none"; designators beyond the known codes are
/// dropped.
pub fn runway_to_str(number: u8, designator: u8) -> String {
    if number == 0 || number > 36 {
        return String::new();
    }
    let designator = DESIGNATORS.get(designator as usize).copied().unwrap_or("");
    format!("{number:02}{designator}")
}
