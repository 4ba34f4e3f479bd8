//! VHF to TACAN channel pairing.

/// Returns the TACAN channel paired with a VHF frequency.
///
/// `frequency` is given in units of 10 kHz (i.e. MHz * 100, `11350` for
/// 113.50 MHz), which is the navaid frequency column divided by ten.
///
/// Pairing follows the standard VORTAC plan: channels 17–59 cover
/// 108.00–112.25 MHz and channels 70–126 cover 112.30–117.95 MHz, with
/// the X band on .x0 frequencies and the Y band on .x5.
pub fn tacan_channel_for_frequency(frequency: i32) -> Option<String> {
    let band = match frequency % 10 {
        0 => 'X',
        5 => 'Y',
        _ => return None,
    };

    let channel = if (10800..=11225).contains(&frequency) {
        17 + (frequency - 10800) / 10
    } else if (11230..=11795).contains(&frequency) {
        70 + (frequency - 11230) / 10
    } else {
        return None;
    };

    Some(format!("{channel}{band}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_band() {
        assert_eq!(tacan_channel_for_frequency(10800).as_deref(), Some("17X"));
        assert_eq!(tacan_channel_for_frequency(10805).as_deref(), Some("17Y"));
        assert_eq!(tacan_channel_for_frequency(11220).as_deref(), Some("59X"));
        assert_eq!(tacan_channel_for_frequency(11225).as_deref(), Some("59Y"));
    }

    #[test]
    fn test_high_band() {
        assert_eq!(tacan_channel_for_frequency(11230).as_deref(), Some("70X"));
        assert_eq!(tacan_channel_for_frequency(11350).as_deref(), Some("82X"));
        assert_eq!(tacan_channel_for_frequency(11795).as_deref(), Some("126Y"));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(tacan_channel_for_frequency(10795), None);
        assert_eq!(tacan_channel_for_frequency(11800), None);
        // Not on a 50 kHz raster
        assert_eq!(tacan_channel_for_frequency(11352), None);
    }
}
