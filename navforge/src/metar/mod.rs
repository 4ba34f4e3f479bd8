//! METAR cache with nearest-station lookup.
//!
//! Reads, caches and indexes (by position) METAR reports in the NOAA
//! two-line style as also used by X-Plane, in flat one-per-line files as
//! provided by VATSIM, or as a JSON list as provided by IVAO.
//!
//! Example of the NOAA format:
//!
//! ```text
//! 2017/07/30 18:45
//! KHYI 301845Z 13007KT 070V130 10SM SCT075 38/17 A2996
//!
//! 2017/07/30 18:55
//! KPRO 301855Z AUTO 11003KT 10SM CLR 26/14 A3022
//! ```
//!
//! Station positions come from an external callback mapping airport
//! idents to coordinates; stations the callback cannot place sit at the
//! null island origin and are excluded from nearest lookups while
//! remaining retrievable by ident. The spatial index is rebuilt from the
//! ident map after every successful read.
//!
//! The index lives in memory only. If it is shared between threads the
//! owner must keep [`MetarIndex::read`] (a rebuild) from running
//! concurrently with [`MetarIndex::get_metar`] (a query),
//! reader-writer discipline.

use std::collections::HashMap;
use std::io::BufRead;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::geo::spatial::{Positioned, SpatialIndex};
use crate::geo::Pos;

/// Supported METAR file layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetarFormat {
    /// Two-line records: a UTC timestamp line, then the METAR body
    NoaaXplane,
    /// One METAR per line
    Flat,
    /// JSON list of structured entries
    Json,
}

/// Errors while reading METAR files.
#[derive(Debug, thiserror::Error)]
pub enum MetarError {
    #[error("I/O error reading \"{file}\": {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },

    #[error("invalid JSON in \"{file}\": {source}")]
    Json {
        file: String,
        source: serde_json::Error,
    },

    #[error("no METAR records could be parsed from \"{0}\"")]
    NoRecords(String),
}

/// One cached METAR.
#[derive(Debug, Clone, PartialEq)]
pub struct MetarData {
    pub ident: String,
    pub metar: String,
    pub timestamp: DateTime<Utc>,
    pub pos: Pos,
}

/// Result envelope of [`MetarIndex::get_metar`].
///
/// Keeps the ident and position of the original request so callers can
/// tell a nearest-station answer from a direct hit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetarResult {
    pub request_ident: String,
    pub request_pos: Pos,
    pub metar_ident: Option<String>,
    pub metar: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetarResult {
    fn empty(request_ident: &str, request_pos: Pos) -> Self {
        Self {
            request_ident: request_ident.to_string(),
            request_pos,
            metar_ident: None,
            metar: None,
            timestamp: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metar.is_none()
    }
}

#[derive(Debug)]
struct IndexedStation {
    ident: String,
    pos: Pos,
}

impl Positioned for IndexedStation {
    fn pos(&self) -> Pos {
        self.pos
    }
}

/// Callback resolving an airport ident to its coordinates.
pub type FetchAirportCoords = Box<dyn Fn(&str) -> Option<Pos>>;

#[derive(Deserialize)]
struct JsonMetar {
    #[serde(alias = "airportIcao", alias = "icao", alias = "icaoId")]
    station: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(alias = "body", alias = "rawOb")]
    metar: String,
}

/// In-memory METAR cache indexed by station ident and position.
pub struct MetarIndex {
    format: MetarFormat,
    entries: HashMap<String, MetarData>,
    spatial: SpatialIndex<IndexedStation>,
    fetch_airport_coords: Option<FetchAirportCoords>,
}

impl MetarIndex {
    pub fn new(format: MetarFormat) -> Self {
        Self {
            format,
            entries: HashMap::new(),
            spatial: SpatialIndex::new(),
            fetch_airport_coords: None,
        }
    }

    /// Sets the airport-coordinate callback used for spatial indexing.
    pub fn set_fetch_airport_coords(&mut self, fetch: FetchAirportCoords) {
        self.fetch_airport_coords = Some(fetch);
    }

    /// Removes all cached records.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.spatial.clear();
    }

    /// True if nothing was read.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of unique station idents in the index.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Reads all records from a stream and indexes them.
    ///
    /// With `merge` false the cache is cleared first. A duplicate station
    /// keeps whichever record carries the later timestamp. Returns the
    /// number of records read.
    pub fn read<R: BufRead>(
        &mut self,
        stream: R,
        file_name: &str,
        merge: bool,
    ) -> Result<usize, MetarError> {
        if !merge {
            self.clear();
        }

        let (attempted, read) = match self.format {
            MetarFormat::NoaaXplane => self.read_noaa_xplane(stream, file_name)?,
            MetarFormat::Flat => self.read_flat(stream, file_name)?,
            MetarFormat::Json => self.read_json(stream, file_name)?,
        };

        if attempted > 0 && read == 0 {
            return Err(MetarError::NoRecords(file_name.to_string()));
        }

        self.update_index();
        tracing::debug!(file_name, read, stations = self.entries.len(), "Read METARs");
        Ok(read)
    }

    /// METAR for a station, or the nearest indexed station's record.
    ///
    /// The original request ident and position are preserved in the
    /// result either way.
    pub fn get_metar(&self, station: &str, pos: Pos) -> MetarResult {
        let mut result = MetarResult::empty(station, pos);

        let data = match self.entries.get(station) {
            Some(data) => Some(data),
            None if !pos.is_null() => self
                .spatial
                .nearest(&pos)
                .and_then(|hit| self.entries.get(&hit.ident)),
            None => None,
        };

        if let Some(data) = data {
            result.metar_ident = Some(data.ident.clone());
            result.metar = Some(data.metar.clone());
            result.timestamp = Some(data.timestamp);
        }
        result
    }

    fn read_noaa_xplane<R: BufRead>(
        &mut self,
        stream: R,
        file_name: &str,
    ) -> Result<(usize, usize), MetarError> {
        let mut attempted = 0usize;
        let mut read = 0usize;
        let mut timestamp: Option<DateTime<Utc>> = None;

        for (line_nr, line) in stream.lines().enumerate() {
            let line = line.map_err(|source| MetarError::Io {
                file: file_name.to_string(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Ok(naive) = NaiveDateTime::parse_from_str(line, "%Y/%m/%d %H:%M") {
                timestamp = Some(Utc.from_utc_datetime(&naive));
                continue;
            }

            attempted += 1;
            let Some(ident) = metar_station(line) else {
                tracing::warn!(file_name, line_nr = line_nr + 1, "Skipping malformed METAR line");
                continue;
            };

            let ts = timestamp
                .or_else(|| timestamp_from_body(line, Utc::now()))
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
            self.update_or_insert(line, &ident, ts);
            read += 1;
            timestamp = None;
        }
        Ok((attempted, read))
    }

    fn read_flat<R: BufRead>(
        &mut self,
        stream: R,
        file_name: &str,
    ) -> Result<(usize, usize), MetarError> {
        let mut attempted = 0usize;
        let mut read = 0usize;
        let now = Utc::now();

        for (line_nr, line) in stream.lines().enumerate() {
            let line = line.map_err(|source| MetarError::Io {
                file: file_name.to_string(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            attempted += 1;
            let Some(ident) = metar_station(line) else {
                tracing::warn!(file_name, line_nr = line_nr + 1, "Skipping malformed METAR line");
                continue;
            };
            let ts = timestamp_from_body(line, now)
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
            self.update_or_insert(line, &ident, ts);
            read += 1;
        }
        Ok((attempted, read))
    }

    fn read_json<R: BufRead>(
        &mut self,
        stream: R,
        file_name: &str,
    ) -> Result<(usize, usize), MetarError> {
        let records: Vec<JsonMetar> =
            serde_json::from_reader(stream).map_err(|source| MetarError::Json {
                file: file_name.to_string(),
                source,
            })?;

        let now = Utc::now();
        let attempted = records.len();
        let mut read = 0usize;
        for record in records {
            if record.station.is_empty() || record.metar.is_empty() {
                continue;
            }
            let ts = record
                .time
                .as_deref()
                .and_then(parse_json_time)
                .or_else(|| timestamp_from_body(&record.metar, now))
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
            self.update_or_insert(&record.metar, &record.station, ts);
            read += 1;
        }
        Ok((attempted, read))
    }

    /// Inserts or replaces a record; the newer timestamp wins.
    fn update_or_insert(&mut self, metar: &str, ident: &str, timestamp: DateTime<Utc>) {
        match self.entries.get(ident) {
            Some(existing) if existing.timestamp > timestamp => {}
            _ => {
                self.entries.insert(
                    ident.to_string(),
                    MetarData {
                        ident: ident.to_string(),
                        metar: metar.to_string(),
                        timestamp,
                        pos: Pos::default(),
                    },
                );
            }
        }
    }

    /// Rebuilds the spatial index from the ident map.
    ///
    /// Cheap because ident to METAR is an in-memory mapping; only
    /// stations the callback can place end up queryable by position.
    fn update_index(&mut self) {
        self.spatial.clear();
        let Some(fetch) = &self.fetch_airport_coords else {
            return;
        };

        for data in self.entries.values_mut() {
            data.pos = fetch(&data.ident).unwrap_or_default();
            self.spatial.insert(IndexedStation {
                ident: data.ident.clone(),
                pos: data.pos,
            });
        }
    }
}

/// Station ident from the first token of a METAR body.
fn metar_station(line: &str) -> Option<String> {
    let first = line.split_whitespace().next()?;
    if (3..=5).contains(&first.len()) && first.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(first.to_string())
    } else {
        None
    }
}

/// Derives a timestamp from the `DDHHMMZ` group of a METAR body.
///
/// The group carries no month or year, so those come from the reference
/// time; a day beyond the reference month rolls back one month.
fn timestamp_from_body(body: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let group = body
        .split_whitespace()
        .find(|tok| tok.len() == 7 && tok.ends_with('Z') && tok[..6].chars().all(|c| c.is_ascii_digit()))?;

    let day: u32 = group[0..2].parse().ok()?;
    let hour: u32 = group[2..4].parse().ok()?;
    let minute: u32 = group[4..6].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(reference.year(), reference.month(), day).or_else(|| {
        let (year, month) = if reference.month() == 1 {
            (reference.year() - 1, 12)
        } else {
            (reference.year(), reference.month() - 1)
        };
        NaiveDate::from_ymd_opt(year, month, day)
    })?;

    let naive = date.and_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

fn parse_json_time(time: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(time) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(time, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
