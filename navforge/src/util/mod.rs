//! Small aeronautical helpers shared by the adapters.

mod tacan;

pub use tacan::tacan_channel_for_frequency;

use std::collections::HashMap;

/// Airport ident to database id lookup built during load.
///
/// Duplicate idents keep the first inserted id; deduplication has
/// already decided which airport survives by the time the index is
/// consulted for foreign keys.
#[derive(Debug, Default)]
pub struct AirportIndex {
    ids: HashMap<String, i64>,
}

impl AirportIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ident: &str, airport_id: i64) {
        self.ids.entry(ident.to_string()).or_insert(airport_id);
    }

    pub fn airport_id(&self, ident: &str) -> Option<i64> {
        self.ids.get(ident).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Words kept fully uppercase when capitalizing airport names.
const NAME_ACRONYMS: &[&str] = &[
    "AFB", "AAF", "AB", "CFB", "II", "III", "IV", "INTL", "MCAS", "NAS", "NS", "RAF", "RAAF",
    "VOR", "JFK",
];

/// Substrings marking an airport name as military.
const MILITARY_MARKERS: &[&str] = &[
    "AAF", "AB", "AFB", "AFS", "AHP", "ANGB", "ARB", "CFB", "LRRS", "MCAF", "MCALF", "MCAS",
    "NAF", "NALF", "NAS", "NAVAL", "NAWS", "NOLF", "NS", "NSB", "NSF", "NSWC", "NSY", "NWS",
    "AIR BASE", "AIR FORCE", "MILITARY",
];

/// Capitalizes an all-caps source airport name word by word.
///
/// Known military and aviation acronyms stay uppercase.
pub fn cap_airport_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            if NAME_ACRONYMS.contains(&word) {
                word.to_string()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heuristic military flag from the airport name.
pub fn is_name_military(name: &str) -> bool {
    let upper = name.to_uppercase();
    MILITARY_MARKERS.iter().any(|marker| {
        if marker.contains(' ') {
            upper.contains(marker)
        } else {
            upper.split_whitespace().any(|word| word == *marker)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_airport_name() {
        assert_eq!(cap_airport_name("FRANKFURT MAIN"), "Frankfurt Main");
        assert_eq!(cap_airport_name("EGLIN AFB"), "Eglin AFB");
        assert_eq!(cap_airport_name("CHICAGO OHARE INTL"), "Chicago Ohare INTL");
    }

    #[test]
    fn test_airport_index_keeps_first() {
        let mut index = AirportIndex::new();
        index.add("EDDF", 1);
        index.add("EDDF", 2);
        index.add("KJFK", 3);
        assert_eq!(index.airport_id("EDDF"), Some(1));
        assert_eq!(index.airport_id("KJFK"), Some(3));
        assert_eq!(index.airport_id("XXXX"), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_is_name_military() {
        assert!(is_name_military("EGLIN AFB"));
        assert!(is_name_military("Whidbey Island NAS"));
        assert!(is_name_military("Ramstein Air Base"));
        assert!(!is_name_military("Frankfurt Main"));
        assert!(!is_name_military("Nassau Intl"));
    }
}
