//! Archive traversal and staging-row output.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::geo::Pos;
use crate::io::BinaryReader;
use crate::magdec::MagDecReader;
use crate::runways::{initial_airport_rect, runway_end_positions};
use crate::scenery::SceneryArea;
use crate::util::{is_name_military, AirportIndex};

use super::airport::{Airport, Runway};
use super::approach::{Approach, ApproachLeg};
use super::{rec, BglError, FORMAT_VERSION_MODERN};

/// Archive file extension scanned inside scenery areas.
const ARCHIVE_EXTENSION: &str = "bgl";

/// Per-run counters of the binary adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct BglWriterStats {
    pub files: usize,
    pub airports: usize,
    pub runways: usize,
    pub approaches: usize,
    pub file_errors: usize,
}

/// A non-fatal per-file failure, reported against the scenery area.
#[derive(Debug, Clone)]
pub struct FileError {
    pub file: PathBuf,
    pub message: String,
}

/// Walks scenery areas and writes airport facility rows.
///
/// Files are streamed; a file is never materialized into memory. Errors
/// are fatal to the current file only: the area scan continues and the
/// failure is recorded, unless strict mode is on.
pub struct BglWriter<'a> {
    conn: &'a Connection,
    magdec: &'a MagDecReader,
    airport_index: &'a mut AirportIndex,
    strict: bool,
    stats: BglWriterStats,
    errors: Vec<FileError>,
}

impl<'a> BglWriter<'a> {
    pub fn new(
        conn: &'a Connection,
        magdec: &'a MagDecReader,
        airport_index: &'a mut AirportIndex,
        strict: bool,
    ) -> Self {
        Self {
            conn,
            magdec,
            airport_index,
            strict,
            stats: BglWriterStats::default(),
            errors: Vec::new(),
        }
    }

    pub fn stats(&self) -> BglWriterStats {
        self.stats
    }

    /// Takes the per-file errors collected so far.
    pub fn take_errors(&mut self) -> Vec<FileError> {
        std::mem::take(&mut self.errors)
    }

    /// Reads all archive files of one scenery area in file-name order.
    pub fn write_scenery_area(
        &mut self,
        base_path: &Path,
        area: &SceneryArea,
        scenery_area_id: i64,
    ) -> Result<(), BglError> {
        let dir = base_path.join(&area.local_path);
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
                })
                .collect(),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot read scenery area directory");
                return Ok(());
            }
        };
        files.sort();

        for path in files {
            let file_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            self.conn.execute(
                "insert into source_file (scenery_area_id, file_path, filename, size)
                 values (?1, ?2, ?3, ?4)",
                params![
                    scenery_area_id,
                    path.display().to_string(),
                    path.file_name().and_then(|n| n.to_str()),
                    file_size,
                ],
            )?;
            let file_id = self.conn.last_insert_rowid();

            match self.write_file(&path, file_id) {
                Ok(()) => self.stats.files += 1,
                Err(BglError::Sql(e)) => return Err(BglError::Sql(e)),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to read archive");
                    self.stats.file_errors += 1;
                    self.errors.push(FileError {
                        file: path.clone(),
                        message: e.to_string(),
                    });
                    if self.strict {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads one archive file and writes its airports.
    pub fn write_file(&mut self, path: &Path, file_id: i64) -> Result<(), BglError> {
        let file = File::open(path).map_err(crate::io::ReadError::Io)?;
        let mut reader = BinaryReader::new(BufReader::new(file))?;
        let stream_end = reader.len();

        // The header record must come first; it decides how the rest of
        // the archive is interpreted.
        let header = reader.read_record_header_bounded(stream_end)?;
        if header.tag != rec::FILE_HEADER {
            return Err(BglError::MissingFileHeader {
                file: path.display().to_string(),
            });
        }
        let version = reader.read_u16()?;
        let modern = version >= FORMAT_VERSION_MODERN;
        reader.seek_to(header.end())?;

        let mut record_count = 0i64;
        while reader.pos() < stream_end {
            let record = reader.read_record_header_bounded(stream_end)?;
            match record.tag {
                rec::AIRPORT => {
                    let airport = Airport::read(&mut reader, &record, modern)?;
                    if airport.is_valid() {
                        self.write_airport(&airport, file_id)?;
                        record_count += 1;
                    } else {
                        tracing::warn!(file = %path.display(), "Skipping invalid airport record");
                    }
                }
                tag if modern => {
                    tracing::debug!(tag = format!("0x{tag:04x}"), "Skipping unknown record");
                }
                tag => {
                    tracing::warn!(
                        tag = format!("0x{tag:04x}"),
                        file = %path.display(),
                        "Unexpected top level record"
                    );
                }
            }
            reader.seek_to(record.end())?;
        }

        self.conn.execute(
            "update source_file set record_count = ?1 where source_file_id = ?2",
            params![record_count, file_id],
        )?;
        Ok(())
    }

    fn write_airport(&mut self, airport: &Airport, file_id: i64) -> Result<(), BglError> {
        let mag_var = self.magdec.mag_var(&airport.pos);

        // Airport rectangle: at least 100 m around the reference point,
        // extended by every runway endpoint.
        let mut rect = initial_airport_rect(airport.pos);
        let mut num_hard = 0;
        let mut num_soft = 0;
        let mut num_water = 0;
        let mut num_end_closed = 0;
        let mut num_end_ils = 0;
        let mut longest: Option<&Runway> = None;
        for runway in &airport.runways {
            let (primary, secondary) =
                runway_end_positions(runway.center, runway.length as i32, runway.heading);
            rect.extend(primary);
            rect.extend(secondary);

            if runway.is_hard() {
                num_hard += 1;
            } else if runway.is_soft() {
                num_soft += 1;
            } else if runway.is_water() {
                num_water += 1;
            }
            num_end_closed +=
                i32::from(runway.primary_closed) + i32::from(runway.secondary_closed);
            num_end_ils += i32::from(runway.primary_ils.is_some())
                + i32::from(runway.secondary_ils.is_some());
            if longest.is_none_or(|l| runway.length > l.length) {
                longest = Some(runway);
            }
        }

        self.conn.execute(
            "insert into airport (source_file_id, ident, name, region, is_closed, is_military,
                                  rating, num_com, num_approach,
                                  num_runway_hard, num_runway_soft, num_runway_water,
                                  num_runway_end_closed, num_runway_end_ils, num_runways,
                                  longest_runway_length, longest_runway_width,
                                  longest_runway_heading, longest_runway_surface,
                                  left_lonx, top_laty, right_lonx, bottom_laty,
                                  mag_var, altitude, lonx, laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                     ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
            params![
                file_id,
                airport.ident,
                crate::util::cap_airport_name(&airport.name),
                airport.region,
                airport.is_closed,
                airport.is_military || is_name_military(&airport.name),
                airport.rating,
                airport.coms.len() as i64,
                airport.approaches.len() as i64,
                num_hard,
                num_soft,
                num_water,
                num_end_closed,
                num_end_ils,
                airport.runways.len() as i64,
                longest.map_or(0.0, |r| r.length).round() as i64,
                longest.map_or(0.0, |r| r.width).round() as i64,
                longest.map_or(0.0, |r| r.heading),
                longest.map(|r| r.surface.clone()),
                rect.top_left.lonx,
                rect.top_left.laty,
                rect.bottom_right.lonx,
                rect.bottom_right.laty,
                mag_var,
                airport.pos.altitude.round() as i64,
                airport.pos.lonx,
                airport.pos.laty,
            ],
        )?;
        let airport_id = self.conn.last_insert_rowid();
        self.airport_index.add(&airport.ident, airport_id);
        self.stats.airports += 1;

        for runway in &airport.runways {
            self.write_runway(runway, airport_id)?;
        }
        for com in &airport.coms {
            self.conn.execute(
                "insert into com (airport_id, type, frequency, name) values (?1, ?2, ?3, ?4)",
                params![airport_id, com.com_type, com.frequency, com.name],
            )?;
        }
        for approach in &airport.approaches {
            self.write_approach(approach, airport_id, &airport.ident)?;
        }
        Ok(())
    }

    fn write_runway(&mut self, runway: &Runway, airport_id: i64) -> Result<(), BglError> {
        let (primary_pos, secondary_pos) =
            runway_end_positions(runway.center, runway.length as i32, runway.heading);

        let primary_end_id = self.write_runway_end(
            &runway.primary_name,
            "P",
            runway.primary_ils.as_deref(),
            runway.heading,
            primary_pos,
            runway.primary_closed,
        )?;
        let secondary_end_id = self.write_runway_end(
            &runway.secondary_name,
            "S",
            runway.secondary_ils.as_deref(),
            crate::geo::opposed_course(runway.heading),
            secondary_pos,
            runway.secondary_closed,
        )?;

        self.conn.execute(
            "insert into runway (airport_id, primary_end_id, secondary_end_id, surface, length,
                                 width, heading, altitude,
                                 primary_lonx, primary_laty, secondary_lonx, secondary_laty,
                                 lonx, laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                airport_id,
                primary_end_id,
                secondary_end_id,
                runway.surface,
                runway.length.round() as i64,
                runway.width.round() as i64,
                runway.heading,
                runway.altitude.round() as i64,
                primary_pos.lonx,
                primary_pos.laty,
                secondary_pos.lonx,
                secondary_pos.laty,
                runway.center.lonx,
                runway.center.laty,
            ],
        )?;
        self.stats.runways += 1;
        Ok(())
    }

    fn write_runway_end(
        &self,
        name: &str,
        end_type: &str,
        ils_ident: Option<&str>,
        heading: f64,
        pos: Pos,
        closed: bool,
    ) -> Result<i64, BglError> {
        self.conn.execute(
            "insert into runway_end (name, end_type, offset_threshold, has_closed_markings,
                                     is_takeoff, is_landing, ils_ident, heading, lonx, laty)
             values (?1, ?2, 0, ?3, ?4, ?4, ?5, ?6, ?7, ?8)",
            params![name, end_type, closed, !closed, ils_ident, heading, pos.lonx, pos.laty],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn write_approach(
        &mut self,
        approach: &Approach,
        airport_id: i64,
        airport_ident: &str,
    ) -> Result<(), BglError> {
        self.conn.execute(
            "insert into approach (airport_id, airport_ident, runway_name, type, suffix,
                                   has_gps_overlay, fix_type, fix_ident, fix_region,
                                   altitude, heading, missed_altitude)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                airport_id,
                airport_ident,
                (!approach.runway_name.is_empty()).then_some(&approach.runway_name),
                approach.approach_type,
                approach.suffix.map(String::from),
                approach.gps_overlay,
                approach.fix_type,
                approach.fix_ident,
                approach.fix_region,
                approach.altitude,
                approach.heading,
                approach.missed_altitude,
            ],
        )?;
        let approach_id = self.conn.last_insert_rowid();
        self.stats.approaches += 1;

        for leg in &approach.legs {
            self.write_leg("approach_leg", "approach_id", approach_id, leg, false)?;
        }
        for leg in &approach.missed_legs {
            self.write_leg("approach_leg", "approach_id", approach_id, leg, true)?;
        }

        for transition in &approach.transitions {
            self.conn.execute(
                "insert into transition (approach_id, type, fix_type, fix_ident, fix_region,
                                         altitude, dme_ident, dme_radial, dme_distance)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    approach_id,
                    if transition.dme_ident.is_some() { "D" } else { "F" },
                    transition.fix_type,
                    transition.fix_ident,
                    transition.fix_region,
                    transition.altitude,
                    transition.dme_ident,
                    transition.dme_radial,
                    transition.dme_distance,
                ],
            )?;
            let transition_id = self.conn.last_insert_rowid();
            for leg in &transition.legs {
                self.write_leg("transition_leg", "transition_id", transition_id, leg, false)?;
            }
        }
        Ok(())
    }

    fn write_leg(
        &self,
        table: &str,
        parent_column: &str,
        parent_id: i64,
        leg: &ApproachLeg,
        is_missed: bool,
    ) -> Result<(), BglError> {
        let (distance, time) = if leg.is_time {
            (None, Some(leg.dist_or_time))
        } else {
            (Some(leg.dist_or_time), None)
        };

        let sql = format!(
            "insert into {table} ({parent_column}, is_missed, type, alt_descriptor,
                                  turn_direction, fix_type, fix_ident, fix_region,
                                  recommended_fix_type, recommended_fix_ident,
                                  recommended_fix_region, is_flyover, is_true_course,
                                  course, distance, time, theta, rho, altitude1, altitude2,
                                  speed_limit)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21)"
        );
        self.conn.execute(
            &sql,
            params![
                parent_id,
                is_missed,
                leg.leg_type,
                leg.alt_descriptor.map(String::from),
                leg.turn_direction.map(String::from),
                leg.fix_type,
                leg.fix_ident,
                leg.fix_region,
                leg.recommended_type,
                leg.recommended_ident,
                leg.recommended_region,
                leg.is_flyover,
                leg.is_true_course,
                leg.course,
                distance,
                time,
                leg.theta,
                leg.rho,
                leg.altitude1,
                leg.altitude2,
                leg.speed_limit,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgl::testdata::{
        airport_bytes, com_bytes, file_header, leg_bytes, record, runway_bytes, u16_bytes,
    };
    use crate::bgl::approach::LegVariant;
    use crate::bgl::converter::icao_to_int;
    use crate::db::schema;
    use std::io::Write;

    fn archive(records: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = file_header(crate::bgl::FORMAT_VERSION_LEGACY);
        for r in records {
            bytes.extend_from_slice(r);
        }
        bytes
    }

    fn airport_with_runway() -> Vec<u8> {
        let mut payload = airport_bytes("EDDF", "ED", "FRANKFURT MAIN", 8.5431, 50.0267, 364.0);
        payload.extend_from_slice(&record(
            crate::bgl::rec::RUNWAY,
            &runway_bytes(7, 3, 25, 3, 8.5431, 50.0267, 70.0, 13123.0, 197.0, 1),
        ));
        payload.extend_from_slice(&record(crate::bgl::rec::COM, &com_bytes(6, 119_900, "TOWER")));

        // One ILS approach with a final leg
        let mut approach = vec![0u8, 7, 4 | (3 << 4), 0, 0, 0];
        approach.extend_from_slice(&(5u32 | (icao_to_int("FF013") << 5)).to_le_bytes());
        approach
            .extend_from_slice(&(icao_to_int("ED") | (icao_to_int("EDDF") << 11)).to_le_bytes());
        approach.extend_from_slice(&3000.0f32.to_le_bytes());
        approach.extend_from_slice(&68.0f32.to_le_bytes());
        approach.extend_from_slice(&5000.0f32.to_le_bytes());
        let mut legs = u16_bytes(1);
        legs.extend_from_slice(&leg_bytes(15, "FF013", LegVariant::Legacy));
        approach.extend_from_slice(&record(crate::bgl::rec::LEGS, &legs));
        payload.extend_from_slice(&record(crate::bgl::rec::APPROACH, &approach));

        record(crate::bgl::rec::AIRPORT, &payload)
    }

    fn write_archive(dir: &std::path::Path, name: &str, bytes: &[u8]) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(bytes).unwrap();
    }

    fn run_writer(dir: &std::path::Path, strict: bool) -> (Connection, BglWriterStats, Vec<FileError>) {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        let magdec = MagDecReader::from_uniform(2.0);
        let mut index = AirportIndex::new();
        let mut writer = BglWriter::new(&conn, &magdec, &mut index, strict);

        let area = SceneryArea {
            area_number: 1,
            layer: 1,
            title: "Test".to_string(),
            local_path: std::path::PathBuf::new(),
            active: true,
        };
        writer.write_scenery_area(dir, &area, 1).unwrap();
        let stats = writer.stats();
        let errors = writer.take_errors();
        (conn, stats, errors)
    }

    #[test]
    fn test_write_airport_runway_approach() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "apt001.bgl", &archive(&[airport_with_runway()]));

        let (conn, stats, errors) = run_writer(dir.path(), false);
        assert!(errors.is_empty());
        assert_eq!(stats.airports, 1);
        assert_eq!(stats.runways, 1);
        assert_eq!(stats.approaches, 1);

        let (ident, name, mag_var, num_hard): (String, String, f64, i64) = conn
            .query_row(
                "select ident, name, mag_var, num_runway_hard from airport",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(ident, "EDDF");
        assert_eq!(name, "Frankfurt Main");
        assert_eq!(mag_var, 2.0);
        assert_eq!(num_hard, 1);

        // The runway references two ends with opposing designators
        let (primary, secondary): (i64, i64) = conn
            .query_row(
                "select primary_end_id, secondary_end_id from runway",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        let p_name: String = conn
            .query_row(
                "select name from runway_end where runway_end_id = ?1",
                [primary],
                |r| r.get(0),
            )
            .unwrap();
        let s_name: String = conn
            .query_row(
                "select name from runway_end where runway_end_id = ?1",
                [secondary],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(p_name, "07C");
        assert_eq!(s_name, "25C");

        // Airport rectangle contains the runway endpoints
        let (left, top, right, bottom, p_lonx, p_laty): (f64, f64, f64, f64, f64, f64) = conn
            .query_row(
                "select a.left_lonx, a.top_laty, a.right_lonx, a.bottom_laty,
                        r.primary_lonx, r.primary_laty
                 from airport a join runway r on r.airport_id = a.airport_id",
                [],
                |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
                },
            )
            .unwrap();
        assert!(p_lonx >= left && p_lonx <= right);
        assert!(p_laty <= top && p_laty >= bottom);

        assert_eq!(crate::db::row_count(&conn, "approach").unwrap(), 1);
        assert_eq!(crate::db::row_count(&conn, "approach_leg").unwrap(), 1);
        assert_eq!(crate::db::row_count(&conn, "com").unwrap(), 1);
        assert_eq!(crate::db::row_count(&conn, "source_file").unwrap(), 1);
    }

    #[test]
    fn test_corrupt_file_recorded_area_continues() {
        let dir = tempfile::tempdir().unwrap();
        // A record whose declared size escapes the stream
        let mut corrupt = file_header(crate::bgl::FORMAT_VERSION_LEGACY);
        corrupt.extend_from_slice(&[0x3c, 0x00, 0xff, 0xff, 0x00, 0x00]);
        write_archive(dir.path(), "a_broken.bgl", &corrupt);
        write_archive(dir.path(), "b_good.bgl", &archive(&[airport_with_runway()]));

        let (conn, stats, errors) = run_writer(dir.path(), false);
        assert_eq!(stats.file_errors, 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].file.ends_with("a_broken.bgl"));
        // The good file after the broken one still loaded
        assert_eq!(stats.airports, 1);
        assert_eq!(crate::db::row_count(&conn, "airport").unwrap(), 1);
    }

    #[test]
    fn test_strict_mode_aborts_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut corrupt = file_header(crate::bgl::FORMAT_VERSION_LEGACY);
        corrupt.extend_from_slice(&[0x3c, 0x00, 0xff, 0xff, 0x00, 0x00]);
        write_archive(dir.path(), "broken.bgl", &corrupt);

        let conn = Connection::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        let magdec = MagDecReader::from_uniform(0.0);
        let mut index = AirportIndex::new();
        let mut writer = BglWriter::new(&conn, &magdec, &mut index, true);
        let area = SceneryArea::synthetic(1, "Test");

        assert!(writer.write_scenery_area(dir.path(), &area, 1).is_err());
    }

    #[test]
    fn test_missing_file_header() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "noheader.bgl", &airport_with_runway());

        let (_conn, stats, errors) = run_writer(dir.path(), false);
        assert_eq!(stats.airports, 0);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("file header"));
    }

    #[test]
    fn test_empty_archive_is_success() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(
            dir.path(),
            "empty.bgl",
            &file_header(crate::bgl::FORMAT_VERSION_MODERN),
        );

        let (conn, stats, errors) = run_writer(dir.path(), false);
        assert!(errors.is_empty());
        assert_eq!(stats.files, 1);
        assert_eq!(crate::db::row_count(&conn, "airport").unwrap(), 0);
    }
}
