//! Streaming transcode of the attached relational source.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

use crate::airway::MAX_SEGMENT_LENGTH_TRUSTED_NM;
use crate::db::{update_column_in_table, AttachedSource};
use crate::geo::{nm_to_meter, normalize_course, Pos, Rect};
use crate::ils::{feather_geometry, ILS_FEATHER_LEN_NM};
use crate::magdec::MagDecReader;
use crate::proc::{ProcedureInput, ProcedureStats, ProcedureWriter, RowCode};
use crate::runways::{initial_airport_rect, pair_runways, runway_end_positions, RunwayEndInput};
use crate::util::{cap_airport_name, is_name_military, AirportIndex};

use super::{FILE_ID, SCENERY_ID, SOURCE_SCHEMA};

/// Aggregate counters of a relational compile.
#[derive(Debug, Default, Clone, Copy)]
pub struct DfdStats {
    pub airports: usize,
    pub runways: usize,
    pub navaids: usize,
    pub boundaries: usize,
    pub airway_segments: usize,
    pub dropped_airway_segments: usize,
    pub procedures: usize,
}

/// Compiler for an attached relational navigation source.
///
/// The source is attached under [`SOURCE_SCHEMA`] for the lifetime of
/// the compile and detached on [`close`](Self::close) (or drop of the
/// attachment). All cursors stream; no source table is materialized.
pub struct DfdCompiler<'c> {
    conn: &'c Connection,
    magdec: &'c MagDecReader,
    airport_index: AirportIndex,
    attached: Option<AttachedSource<'c>>,

    // Per-airport state carried from the airport pass to the runway pass
    airport_rects: HashMap<String, Rect>,
    longest_surface: HashMap<String, String>,

    airac_cycle: Option<String>,
    valid_through: Option<String>,

    cur_airport_id: i64,
    cur_runway_id: i64,
    cur_runway_end_id: i64,
    max_airway_segment_nm: f64,
    stats: DfdStats,
}

impl<'c> DfdCompiler<'c> {
    pub fn new(conn: &'c Connection, magdec: &'c MagDecReader) -> Self {
        Self {
            conn,
            magdec,
            airport_index: AirportIndex::new(),
            attached: None,
            airport_rects: HashMap::new(),
            longest_surface: HashMap::new(),
            airac_cycle: None,
            valid_through: None,
            cur_airport_id: 0,
            cur_runway_id: 0,
            cur_runway_end_id: 0,
            max_airway_segment_nm: MAX_SEGMENT_LENGTH_TRUSTED_NM,
            stats: DfdStats::default(),
        }
    }

    /// Overrides the airway segment length cap.
    pub fn set_max_airway_segment_nm(&mut self, nm: f64) {
        self.max_airway_segment_nm = nm;
    }

    pub fn stats(&self) -> DfdStats {
        self.stats
    }

    pub fn airac_cycle(&self) -> Option<&str> {
        self.airac_cycle.as_deref()
    }

    pub fn valid_through(&self) -> Option<&str> {
        self.valid_through.as_deref()
    }

    pub fn airport_index(&self) -> &AirportIndex {
        &self.airport_index
    }

    /// Attaches the source database for the run.
    pub fn attach_database(&mut self, path: &str) -> rusqlite::Result<()> {
        self.attached = Some(AttachedSource::attach(self.conn, path, SOURCE_SCHEMA)?);
        Ok(())
    }

    /// Detaches the source database.
    pub fn detach_database(&mut self) -> rusqlite::Result<()> {
        if let Some(attached) = self.attached.take() {
            attached.detach()?;
        }
        Ok(())
    }

    /// Reads the AIRAC cycle from the source header table.
    pub fn read_header(&mut self) -> rusqlite::Result<()> {
        let row = self
            .conn
            .query_row(
                "select current_airac, valid_through from src.tbl_header limit 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;
        if let Some((cycle, valid)) = row {
            self.airac_cycle = cycle;
            self.valid_through = valid;
        }
        tracing::info!(cycle = ?self.airac_cycle, "Read source header");
        Ok(())
    }

    /// Writes the synthetic scenery area and file descriptor rows.
    pub fn write_file_and_scenery_metadata(&self) -> rusqlite::Result<()> {
        self.conn.execute(
            "insert into scenery_area (scenery_area_id, area_number, layer, title, active)
             values (?1, 1, 1, 'Relational Source', 1)",
            [SCENERY_ID],
        )?;
        self.conn.execute(
            "insert into source_file (source_file_id, scenery_area_id, filename)
             values (?1, ?2, 'attached source')",
            params![FILE_ID, SCENERY_ID],
        )?;
        Ok(())
    }

    /// Writes airports with nominal defaults for the columns the source
    /// lacks; derived passes overwrite them later.
    pub fn write_airports(&mut self) -> rusqlite::Result<()> {
        self.airport_rects.clear();
        self.longest_surface.clear();

        let mut select = self.conn.prepare(
            "select airport_identifier, airport_name, area_code,
                    airport_ref_longitude, airport_ref_latitude, elevation,
                    transition_altitude, longest_runway_surface_code
             from src.tbl_airports order by airport_identifier",
        )?;
        let mut insert = self.conn.prepare(
            "insert into airport (airport_id, source_file_id, ident, name, country,
                                  is_military, rating, transition_altitude,
                                  left_lonx, top_laty, right_lonx, bottom_laty,
                                  mag_var, altitude, lonx, laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let ident: String = row.get(0)?;
            let name: String = row.get::<_, Option<String>>(1)?.unwrap_or_default();
            let area_code: Option<String> = row.get(2)?;
            let pos = Pos::with_altitude(
                row.get(3)?,
                row.get(4)?,
                row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
            );
            let transition_altitude: Option<f64> = row.get(6)?;
            let surface_code: Option<String> = row.get(7)?;

            // Start with a minimum rectangle of about 100 meter
            let rect = initial_airport_rect(pos);
            self.airport_rects.insert(ident.clone(), rect);
            if let Some(code) = surface_code {
                self.longest_surface.insert(ident.clone(), code);
            }

            self.cur_airport_id += 1;
            self.airport_index.add(&ident, self.cur_airport_id);

            insert.execute(params![
                self.cur_airport_id,
                FILE_ID,
                ident,
                cap_airport_name(&name),
                area_code,
                is_name_military(&name),
                transition_altitude,
                rect.top_left.lonx,
                rect.top_left.laty,
                rect.bottom_right.lonx,
                rect.bottom_right.laty,
                self.magdec.mag_var(&pos),
                pos.altitude.round() as i64,
                pos.lonx,
                pos.laty,
            ])?;
            self.stats.airports += 1;
        }
        Ok(())
    }

    /// Writes paired runways, grouped per airport by boundary detection
    /// on the ordered cursor.
    pub fn write_runways(&mut self) -> rusqlite::Result<()> {
        let mut select = self.conn.prepare(
            "select airport_identifier, runway_identifier,
                    runway_longitude, runway_latitude,
                    runway_magnetic_bearing, runway_true_bearing,
                    landing_threshold_elevation, displaced_threshold_distance,
                    runway_length, runway_width, llz_identifier
             from src.tbl_runways
             order by icao_code, airport_identifier, runway_identifier",
        )?;

        let mut ends: Vec<RunwayEndInput> = Vec::new();
        let mut last_airport = String::new();

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let airport: String = row.get(0)?;
            if !last_airport.is_empty() && last_airport != airport {
                // Airport has changed, write collected runways
                let collected = std::mem::take(&mut ends);
                self.write_runways_for_airport(&collected, &last_airport)?;
            }

            ends.push(RunwayEndInput {
                ident: row.get(1)?,
                threshold_pos: Pos::new(row.get(2)?, row.get(3)?),
                magnetic_bearing: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                true_bearing: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                threshold_elevation: row.get::<_, Option<i64>>(6)?.unwrap_or(0) as i32,
                displaced_threshold: row.get::<_, Option<i64>>(7)?.unwrap_or(0) as i32,
                length: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as i32,
                width: row.get::<_, Option<i64>>(9)?.unwrap_or(0) as i32,
                ils_ident: row
                    .get::<_, Option<String>>(10)?
                    .filter(|s| !s.is_empty()),
                is_closed: false,
            });
            last_airport = airport;
        }
        if !ends.is_empty() {
            let collected = std::mem::take(&mut ends);
            self.write_runways_for_airport(&collected, &last_airport)?;
        }
        Ok(())
    }

    fn write_runways_for_airport(
        &mut self,
        ends: &[RunwayEndInput],
        airport_ident: &str,
    ) -> rusqlite::Result<()> {
        let Some(airport_id) = self.airport_index.airport_id(airport_ident) else {
            tracing::warn!(airport_ident, "Runways for unknown airport skipped");
            return Ok(());
        };
        let mut rect = match self.airport_rects.get(airport_ident) {
            Some(rect) => *rect,
            None => return Ok(()),
        };

        let mut num_runways = 0i64;
        let mut num_ils_ends = 0i64;
        let mut num_end_closed = 0i64;
        let mut longest_length = 0i64;
        let mut longest_width = 0i64;
        let mut longest_heading = 0.0f64;

        for (primary, secondary) in pair_runways(ends) {
            self.cur_runway_end_id += 1;
            let primary_end_id = self.cur_runway_end_id;
            self.cur_runway_end_id += 1;
            let secondary_end_id = self.cur_runway_end_id;

            let length = i64::from(primary.length);
            let width = i64::from(primary.width);

            // Use the average threshold altitude
            let altitude =
                i64::from(primary.threshold_elevation + secondary.threshold_elevation) / 2;

            // Center between the two thresholds
            let center = Pos::new(
                (primary.threshold_pos.lonx + secondary.threshold_pos.lonx) / 2.0,
                (primary.threshold_pos.laty + secondary.threshold_pos.laty) / 2.0,
            );

            // True heading from the magnetic bearing, needed for painting
            let mag_var = self.magdec.mag_var(&center);
            let heading = normalize_course(primary.magnetic_bearing + mag_var);
            let opposed_heading = normalize_course(secondary.magnetic_bearing + mag_var);

            num_ils_ends += i64::from(primary.ils_ident.is_some())
                + i64::from(secondary.ils_ident.is_some());
            num_end_closed += i64::from(primary.is_closed) + i64::from(secondary.is_closed);
            if length > longest_length {
                longest_length = length;
                longest_width = width;
                longest_heading = heading;
            }
            num_runways += 1;

            let (primary_pos, secondary_pos) =
                runway_end_positions(center, primary.length, heading);
            rect.extend(primary_pos);
            rect.extend(secondary_pos);

            self.write_runway_end(primary_end_id, &primary, "P", heading, primary_pos)?;
            self.write_runway_end(secondary_end_id, &secondary, "S", opposed_heading, secondary_pos)?;

            self.cur_runway_id += 1;
            self.conn.execute(
                "insert into runway (runway_id, airport_id, primary_end_id, secondary_end_id,
                                     length, width, heading, altitude,
                                     primary_lonx, primary_laty, secondary_lonx, secondary_laty,
                                     lonx, laty)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    self.cur_runway_id,
                    airport_id,
                    primary_end_id,
                    secondary_end_id,
                    length,
                    width,
                    heading,
                    altitude,
                    primary_pos.lonx,
                    primary_pos.laty,
                    secondary_pos.lonx,
                    secondary_pos.laty,
                    center.lonx,
                    center.laty,
                ],
            )?;
            self.stats.runways += 1;
        }

        // The source has no per-runway surface; infer the counters from
        // the longest-runway surface code.
        let (num_hard, num_soft, num_water) =
            match self.longest_surface.get(airport_ident).map(String::as_str) {
                Some("H") => (num_runways, 0, 0),
                Some("S") => (num_runways - 1, 1, 0),
                Some("W") => (num_runways - 1, 0, 1),
                _ => (0, 0, 0),
            };

        self.conn.execute(
            "update airport set
                num_runway_hard = ?2, num_runway_soft = ?3, num_runway_water = ?4,
                longest_runway_length = ?5, longest_runway_width = ?6,
                longest_runway_heading = ?7, longest_runway_surface = ?8,
                num_runway_end_ils = ?9, num_runway_end_closed = ?10, num_runways = ?11,
                left_lonx = ?12, top_laty = ?13, right_lonx = ?14, bottom_laty = ?15
             where airport_id = ?1",
            params![
                airport_id,
                num_hard.max(0),
                num_soft,
                num_water,
                longest_length,
                longest_width,
                longest_heading,
                self.longest_surface.get(airport_ident),
                num_ils_ends,
                num_end_closed,
                num_runways,
                rect.top_left.lonx,
                rect.top_left.laty,
                rect.bottom_right.lonx,
                rect.bottom_right.laty,
            ],
        )?;
        self.airport_rects.insert(airport_ident.to_string(), rect);
        Ok(())
    }

    fn write_runway_end(
        &self,
        runway_end_id: i64,
        end: &RunwayEndInput,
        end_type: &str,
        heading: f64,
        pos: Pos,
    ) -> rusqlite::Result<()> {
        self.conn.execute(
            "insert into runway_end (runway_end_id, name, end_type, offset_threshold,
                                     has_closed_markings, is_takeoff, is_landing, ils_ident,
                                     heading, lonx, laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9, ?10)",
            params![
                runway_end_id,
                end.name(),
                end_type,
                end.displaced_threshold,
                end.is_closed,
                !end.is_closed,
                end.ils_ident,
                heading,
                pos.lonx,
                pos.laty,
            ],
        )?;
        Ok(())
    }

    /// Writes VORs, NDBs, waypoints and ILS from the source navaid
    /// tables.
    pub fn write_navaids(&mut self) -> rusqlite::Result<()> {
        self.write_vors()?;
        self.write_ndbs()?;
        self.write_waypoints()?;
        self.write_ils()?;
        Ok(())
    }

    fn write_vors(&mut self) -> rusqlite::Result<()> {
        let mut select = self.conn.prepare(
            "select area_code, icao_code, vor_identifier, vor_name, vor_frequency,
                    navaid_class, vor_longitude, vor_latitude, elevation, range,
                    dme_longitude, dme_latitude, dme_elevation
             from src.tbl_vhfnavaids order by icao_code, vor_identifier",
        )?;
        let mut insert = self.conn.prepare(
            "insert into vor (source_file_id, ident, name, region, type, frequency, range,
                              dme_only, dme_altitude, dme_lonx, dme_laty, altitude, lonx, laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let class: String = row.get::<_, Option<String>>(5)?.unwrap_or_default();
            let (vor_type, dme_only, has_dme) = vor_type_from_class(&class);
            let frequency_mhz: f64 = row.get::<_, Option<f64>>(4)?.unwrap_or(0.0);
            let dme_lonx: Option<f64> = row.get(10)?;
            let dme_laty: Option<f64> = row.get(11)?;

            insert.execute(params![
                FILE_ID,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(1)?,
                vor_type,
                (frequency_mhz * 1000.0).round() as i64,
                row.get::<_, Option<i64>>(9)?,
                dme_only,
                if has_dme { row.get::<_, Option<i64>>(12)? } else { None },
                if has_dme { dme_lonx } else { None },
                if has_dme { dme_laty } else { None },
                row.get::<_, Option<i64>>(8)?,
                row.get::<_, f64>(6)?,
                row.get::<_, f64>(7)?,
            ])?;
            self.stats.navaids += 1;
        }
        Ok(())
    }

    fn write_ndbs(&mut self) -> rusqlite::Result<()> {
        // Enroute NDBs have no airport reference, terminal ones do
        for (table, has_airport) in [
            ("src.tbl_enroute_ndbnavaids", false),
            ("src.tbl_terminal_ndbnavaids", true),
        ] {
            let airport_column = if has_airport {
                "airport_identifier"
            } else {
                "null"
            };
            let sql = format!(
                "select area_code, icao_code, ndb_identifier, ndb_name, ndb_frequency,
                        navaid_class, ndb_longitude, ndb_latitude, range, {airport_column}
                 from {table} order by icao_code, ndb_identifier"
            );
            let mut select = self.conn.prepare(&sql)?;
            let mut insert = self.conn.prepare(
                "insert into ndb (source_file_id, ident, name, region, type, frequency, range,
                                  airport_ident, lonx, laty)
                 values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;

            let mut rows = select.query([])?;
            while let Some(row) = rows.next()? {
                let frequency_khz: f64 = row.get::<_, Option<f64>>(4)?.unwrap_or(0.0);
                insert.execute(params![
                    FILE_ID,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(5)?,
                    (frequency_khz * 100.0).round() as i64,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, f64>(7)?,
                ])?;
                self.stats.navaids += 1;
            }
        }
        Ok(())
    }

    fn write_waypoints(&mut self) -> rusqlite::Result<()> {
        for (table, has_airport) in [
            ("src.tbl_enroute_waypoints", false),
            ("src.tbl_terminal_waypoints", true),
        ] {
            let airport_column = if has_airport {
                "airport_identifier"
            } else {
                "null"
            };
            let sql = format!(
                "select area_code, icao_code, waypoint_identifier, waypoint_type,
                        waypoint_longitude, waypoint_latitude, {airport_column}
                 from {table} order by icao_code, waypoint_identifier"
            );
            let mut select = self.conn.prepare(&sql)?;
            let mut insert = self.conn.prepare(
                "insert into waypoint (source_file_id, ident, region, type, arinc_type,
                                       airport_ident, lonx, laty)
                 values (?1, ?2, ?3, 'WN', ?4, ?5, ?6, ?7)",
            )?;

            let mut rows = select.query([])?;
            while let Some(row) = rows.next()? {
                insert.execute(params![
                    FILE_ID,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ])?;
                self.stats.navaids += 1;
            }
        }
        Ok(())
    }

    fn write_ils(&mut self) -> rusqlite::Result<()> {
        let mut select = self.conn.prepare(
            "select icao_code, airport_identifier, runway_identifier, llz_identifier,
                    llz_frequency, llz_bearing, llz_width, llz_longitude, llz_latitude,
                    gs_longitude, gs_latitude, gs_angle, gs_elevation, station_declination
             from src.tbl_localizers_glideslopes
             order by airport_identifier, runway_identifier",
        )?;
        let mut insert = self.conn.prepare(
            "insert into ils (ident, name, region, frequency, mag_var,
                              gs_pitch, gs_altitude, gs_lonx, gs_laty,
                              loc_airport_ident, loc_runway_name, loc_heading, loc_width,
                              altitude, lonx, laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let runway_ident: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            let runway_name = runway_ident.strip_prefix("RW").unwrap_or(&runway_ident);
            let declination: f64 = row.get::<_, Option<f64>>(13)?.unwrap_or(0.0);
            let bearing: f64 = row.get::<_, Option<f64>>(5)?.unwrap_or(0.0);
            let frequency_mhz: f64 = row.get::<_, Option<f64>>(4)?.unwrap_or(0.0);
            let airport: Option<String> = row.get(1)?;

            insert.execute(params![
                row.get::<_, String>(3)?,
                airport
                    .as_deref()
                    .map(|a| format!("ILS {a} {runway_name}")),
                row.get::<_, Option<String>>(0)?,
                (frequency_mhz * 1000.0).round() as i64,
                declination,
                row.get::<_, Option<f64>>(11)?,
                row.get::<_, Option<i64>>(12)?,
                row.get::<_, Option<f64>>(9)?,
                row.get::<_, Option<f64>>(10)?,
                airport,
                runway_name,
                normalize_course(bearing + declination),
                row.get::<_, Option<f64>>(6)?,
                row.get::<_, Option<i64>>(12)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
            ])?;
            self.stats.navaids += 1;
        }
        Ok(())
    }

    /// Writes airspace boundaries, grouping polygon rows per airspace.
    pub fn write_airspaces(&mut self) -> rusqlite::Result<()> {
        let mut select = self.conn.prepare(
            "select airspace_name, airspace_type, seqno, longitude, latitude,
                    min_altitude, max_altitude, min_altitude_type, max_altitude_type,
                    com_type, com_frequency, com_name
             from src.tbl_airspaces order by airspace_name, airspace_type, seqno",
        )?;

        struct Boundary {
            name: String,
            boundary_type: Option<String>,
            min_altitude: Option<i64>,
            max_altitude: Option<i64>,
            min_altitude_type: Option<String>,
            max_altitude_type: Option<String>,
            com_type: Option<String>,
            com_frequency: Option<f64>,
            com_name: Option<String>,
            points: Vec<Pos>,
        }

        let mut current: Option<Boundary> = None;
        let mut pending: Vec<Boundary> = Vec::new();

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let point = Pos::new(row.get(3)?, row.get(4)?);

            match &mut current {
                Some(boundary) if boundary.name == name => boundary.points.push(point),
                _ => {
                    if let Some(done) = current.take() {
                        pending.push(done);
                    }
                    current = Some(Boundary {
                        name,
                        boundary_type: row.get(1)?,
                        min_altitude: row.get(5)?,
                        max_altitude: row.get(6)?,
                        min_altitude_type: row.get(7)?,
                        max_altitude_type: row.get(8)?,
                        com_type: row.get(9)?,
                        com_frequency: row.get(10)?,
                        com_name: row.get(11)?,
                        points: vec![point],
                    });
                }
            }
        }
        if let Some(done) = current.take() {
            pending.push(done);
        }

        let mut insert = self.conn.prepare(
            "insert into boundary (source_file_id, type, name, com_type, com_frequency, com_name,
                                   min_altitude_type, max_altitude_type, min_altitude,
                                   max_altitude, geometry,
                                   left_lonx, top_laty, right_lonx, bottom_laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;
        for boundary in pending {
            let Some(first) = boundary.points.first() else {
                continue;
            };
            let mut rect = Rect::from_pos(*first);
            for point in &boundary.points {
                rect.extend(*point);
            }
            let geometry = serde_json::json!({
                "type": "Polygon",
                "coordinates": [boundary
                    .points
                    .iter()
                    .map(|p| [p.lonx, p.laty])
                    .collect::<Vec<_>>()],
            })
            .to_string();

            insert.execute(params![
                FILE_ID,
                boundary.boundary_type,
                boundary.name,
                boundary.com_type,
                boundary.com_frequency.map(|f| (f * 1000.0).round() as i64),
                boundary.com_name,
                boundary.min_altitude_type,
                boundary.max_altitude_type,
                boundary.min_altitude,
                boundary.max_altitude,
                geometry,
                rect.top_left.lonx,
                rect.top_left.laty,
                rect.bottom_right.lonx,
                rect.bottom_right.laty,
            ])?;
            self.stats.boundaries += 1;
        }
        Ok(())
    }

    /// Writes airport COM frequencies and refreshes the per-airport
    /// counter.
    pub fn write_com(&mut self) -> rusqlite::Result<()> {
        let mut select = self.conn.prepare(
            "select airport_identifier, communication_type, communication_frequency, callsign
             from src.tbl_airport_communication
             order by airport_identifier, communication_type",
        )?;
        let mut insert = self.conn.prepare(
            "insert into com (airport_id, type, frequency, name) values (?1, ?2, ?3, ?4)",
        )?;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let airport: String = row.get(0)?;
            let Some(airport_id) = self.airport_index.airport_id(&airport) else {
                continue;
            };
            let frequency_mhz: f64 = row.get::<_, Option<f64>>(2)?.unwrap_or(0.0);
            insert.execute(params![
                airport_id,
                row.get::<_, Option<String>>(1)?,
                (frequency_mhz * 1000.0).round() as i64,
                row.get::<_, Option<String>>(3)?,
            ])?;
        }

        self.conn.execute(
            "update airport set num_com = (select count(1) from com where com.airport_id = airport.airport_id)",
            [],
        )?;
        Ok(())
    }

    /// Writes airway segments with the sequential state machine over the
    /// ordered source cursor.
    ///
    /// Segments longer than the configured cap are dropped the same way
    /// the staging resolver drops them; this source is trusted, so the
    /// default cap is the wide one.
    pub fn write_airways(&mut self) -> rusqlite::Result<()> {
        let mut select = self.conn.prepare(
            "select a.route_identifier, a.seqno, a.flightlevel, a.waypoint_description_code,
                    a.direction_restriction, a.minimum_altitude1, a.maximum_altitude,
                    w.waypoint_id, w.lonx, w.laty
             from src.tbl_airways a
             join waypoint w on a.waypoint_identifier = w.ident and a.icao_code = w.region
             order by a.route_identifier, a.seqno",
        )?;
        let mut insert = self.conn.prepare(
            "insert into airway (airway_name, airway_type, airway_fragment_no, sequence_no,
                                 from_waypoint_id, to_waypoint_id, direction,
                                 minimum_altitude, maximum_altitude,
                                 left_lonx, top_laty, right_lonx, bottom_laty,
                                 from_lonx, from_laty, to_lonx, to_laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )?;

        struct AirwayRow {
            name: String,
            flightlevel: String,
            code: String,
            direction: String,
            minimum_altitude: Option<i64>,
            maximum_altitude: Option<i64>,
            waypoint_id: i64,
            pos: Pos,
        }

        let mut last: Option<AirwayRow> = None;
        let mut last_end_of_route = true;
        let mut fragment_number = 1;
        let mut sequence_number = 1;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let current = AirwayRow {
                name: row.get(0)?,
                flightlevel: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                code: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                direction: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                minimum_altitude: row.get(5)?,
                maximum_altitude: row.get(6)?,
                waypoint_id: row.get(7)?,
                pos: Pos::new(row.get(8)?, row.get(9)?),
            };

            let name_change = last.as_ref().is_some_and(|l| l.name != current.name);

            if let Some(prev) = &last {
                if !name_change && last_end_of_route {
                    // The last row indicated end of route, new fragment
                    fragment_number += 1;
                    sequence_number = 1;
                }

                if !last_end_of_route && !name_change {
                    if prev.pos.distance_meter_to(&current.pos)
                        > nm_to_meter(self.max_airway_segment_nm)
                    {
                        // Drop the overlong segment and start a fresh
                        // fragment so the written chain stays connected
                        tracing::warn!(
                            airway = %prev.name,
                            "Dropping airway segment longer than {} NM",
                            self.max_airway_segment_nm
                        );
                        self.stats.dropped_airway_segments += 1;
                        fragment_number += 1;
                        sequence_number = 1;
                    } else {
                        // Nothing has changed or ended, insert a from/to
                        // pair
                        let rect = Rect::from_pair(prev.pos, current.pos);

                        // B = all altitudes, H = high, L = low airways
                        let airway_type = match prev.flightlevel.as_str() {
                            "H" => "J",
                            "L" => "V",
                            _ => "B",
                        };
                        // F = forward, B = backward, blank = no
                        // restriction
                        let direction = match prev.direction.trim() {
                            "F" => "F",
                            "B" => "B",
                            _ => "N",
                        };

                        insert.execute(params![
                            prev.name,
                            airway_type,
                            fragment_number,
                            sequence_number,
                            prev.waypoint_id,
                            current.waypoint_id,
                            direction,
                            prev.minimum_altitude,
                            prev.maximum_altitude,
                            rect.top_left.lonx,
                            rect.top_left.laty,
                            rect.bottom_right.lonx,
                            rect.bottom_right.laty,
                            prev.pos.lonx,
                            prev.pos.laty,
                            current.pos.lonx,
                            current.pos.laty,
                        ])?;
                        sequence_number += 1;
                        self.stats.airway_segments += 1;
                    }
                }
            }

            last_end_of_route = current.code.chars().nth(1) == Some('E');

            if name_change {
                fragment_number = 1;
                sequence_number = 1;
            }
            last = Some(current);
        }
        Ok(())
    }

    /// Creates waypoints for fixes referenced by procedures that exist
    /// in no waypoint table. Must run after airway processing and before
    /// the procedure writer so coordinate-only resolution can succeed.
    pub fn create_waypoints_for_procedures(&self) -> rusqlite::Result<()> {
        for table in ["src.tbl_iaps", "src.tbl_sids", "src.tbl_stars"] {
            let sql = format!(
                "insert into waypoint (ident, region, type, mag_var, lonx, laty)
                 select distinct p.waypoint_identifier, p.waypoint_icao_code, 'WU', 0,
                        p.waypoint_longitude, p.waypoint_latitude
                 from {table} p
                 where p.waypoint_identifier is not null and p.waypoint_identifier <> ''
                   and p.waypoint_longitude is not null
                   and not exists (select 1 from waypoint w
                                   where w.ident = p.waypoint_identifier
                                     and w.region = p.waypoint_icao_code)"
            );
            self.conn.execute(&sql, [])?;
        }
        Ok(())
    }

    /// Magnetic variation pass over the positional navaid tables.
    pub fn update_magvar(&self) -> rusqlite::Result<()> {
        let magdec = self.magdec;
        for (table, id_column) in [("waypoint", "waypoint_id"), ("ndb", "ndb_id")] {
            update_column_in_table(self.conn, table, id_column, &["lonx", "laty"], &["mag_var"], |row| {
                let pos = Pos::new(row.get(1).ok()?, row.get(2).ok()?);
                Some(vec![Value::Real(magdec.mag_var(&pos))])
            })?;
        }
        Ok(())
    }

    /// TACAN and VORTAC channel pass.
    pub fn update_tacan_channel(&self) -> rusqlite::Result<()> {
        update_column_in_table(
            self.conn,
            "vor",
            "vor_id",
            &["frequency", "type"],
            &["channel"],
            |row| {
                let frequency: i64 = row.get(1).ok()?;
                let vor_type: String = row.get(2).ok()?;
                if vor_type == "TC" || vor_type.starts_with("VT") {
                    crate::util::tacan_channel_for_frequency((frequency / 10) as i32)
                        .map(|channel| vec![Value::Text(channel)])
                } else {
                    None
                }
            },
        )?;
        Ok(())
    }

    /// ILS feather geometry pass.
    pub fn update_ils_geometry(&self) -> rusqlite::Result<()> {
        update_column_in_table(
            self.conn,
            "ils",
            "ils_id",
            &["lonx", "laty", "loc_heading", "loc_width"],
            &["end1_lonx", "end1_laty", "end_mid_lonx", "end_mid_laty", "end2_lonx", "end2_laty"],
            |row| {
                let pos = Pos::new(row.get(1).ok()?, row.get(2).ok()?);
                let heading: f64 = row.get(3).ok()?;
                let width: f64 = row.get::<_, Option<f64>>(4).ok()?.unwrap_or(4.0);
                let feather = feather_geometry(pos, heading, width, ILS_FEATHER_LEN_NM);
                Some(vec![
                    Value::Real(feather.end1.lonx),
                    Value::Real(feather.end1.laty),
                    Value::Real(feather.mid.lonx),
                    Value::Real(feather.mid.laty),
                    Value::Real(feather.end2.lonx),
                    Value::Real(feather.end2.laty),
                ])
            },
        )?;
        Ok(())
    }

    /// Writes approaches, SIDs and STARs through the shared procedure
    /// writer.
    pub fn write_procedures(&mut self) -> rusqlite::Result<ProcedureStats> {
        let mut total = ProcedureStats::default();
        for (table, row_code) in [
            ("src.tbl_iaps", RowCode::Approach),
            ("src.tbl_sids", RowCode::Sid),
            ("src.tbl_stars", RowCode::Star),
        ] {
            let stats = self.write_procedure_table(table, row_code)?;
            total.procedures += stats.procedures;
            total.transitions += stats.transitions;
            total.legs += stats.legs;
            total.synthesized_waypoints += stats.synthesized_waypoints;
            total.unresolved_fixes += stats.unresolved_fixes;
        }
        self.stats.procedures += total.procedures;
        Ok(total)
    }

    fn write_procedure_table(
        &mut self,
        table: &str,
        row_code: RowCode,
    ) -> rusqlite::Result<ProcedureStats> {
        // The source misspells the recommended navaid columns; keep the
        // source spelling in SQL only.
        let sql = format!(
            "select airport_identifier, procedure_identifier, route_type,
                    transition_identifier, seqno,
                    waypoint_identifier, waypoint_icao_code, waypoint_description_code,
                    waypoint_longitude, waypoint_latitude,
                    turn_direction, path_termination,
                    recommanded_navaid, recommanded_navaid_longitude, recommanded_navaid_latitude,
                    theta, rho, magnetic_course, route_distance_holding_distance_time,
                    altitude_description, altitude1, altitude2, transition_altitude,
                    speed_limit_description, speed_limit
             from {table}
             order by airport_identifier, procedure_identifier, route_type,
                      transition_identifier, seqno"
        );
        let mut select = self.conn.prepare(&sql)?;
        let mut writer = ProcedureWriter::new(self.conn, row_code);

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let airport_ident: String = row.get(0)?;
            let input = ProcedureInput {
                context: format!(
                    "{table}, airport {airport_ident}, procedure {}, transition {}",
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                ),
                airport_id: self.airport_index.airport_id(&airport_ident),
                airport_ident,
                proc_ident: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                route_type: row
                    .get::<_, Option<String>>(2)?
                    .and_then(|s| s.chars().next()),
                trans_ident: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                seq_nr: row.get::<_, Option<i64>>(4)?.unwrap_or(0) as i32,
                fix_ident: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                fix_region: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                desc_code: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                fix_pos: Pos::new(
                    row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
                ),
                turn_dir: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                path_term: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                recommended_navaid: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                recommended_pos: Pos::new(
                    row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(14)?.unwrap_or(0.0),
                ),
                theta: row.get(15)?,
                rho: row.get(16)?,
                mag_course: row.get(17)?,
                rte_hold_dist_time: row.get::<_, Option<f64>>(18)?.unwrap_or(0.0),
                alt_descr: row.get::<_, Option<String>>(19)?.unwrap_or_default(),
                altitude1: row.get(20)?,
                altitude2: row.get(21)?,
                trans_alt: row.get(22)?,
                speed_limit_descr: row.get::<_, Option<String>>(23)?.unwrap_or_default(),
                speed_limit: row.get(24)?,
            };
            writer.write(&input)?;
        }
        writer.finish()?;
        Ok(writer.stats())
    }

    /// Releases the attachment; further source reads are invalid.
    pub fn close(&mut self) -> rusqlite::Result<()> {
        self.detach_database()
    }
}

/// Maps a source navaid class to the output VOR type.
///
/// Class strings are the VOR kind letters followed by the range class:
/// `VH` plain VOR high, `VDH` VOR-DME high, `VTH` VORTAC high, `TC`
/// TACAN, `DH` DME only. Returns (type, dme only, has DME).
fn vor_type_from_class(class: &str) -> (String, bool, bool) {
    let range = class
        .chars()
        .last()
        .filter(|c| matches!(c, 'H' | 'L' | 'T'))
        .unwrap_or('H');

    if class == "TC" {
        ("TC".to_string(), false, true)
    } else if class.starts_with("VT") {
        (format!("VT{range}"), false, true)
    } else if class.starts_with("VD") {
        (range.to_string(), false, true)
    } else if class.starts_with('V') {
        (range.to_string(), false, false)
    } else if class.starts_with('D') {
        ("DME".to_string(), true, true)
    } else {
        (range.to_string(), false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    /// Builds a source database with the relational source layout.
    fn source_db(dir: &std::path::Path) -> String {
        let path = dir.join("source.sqlite");
        let src = Connection::open(&path).unwrap();
        src.execute_batch(
            "
            create table tbl_header (current_airac text, valid_through text);
            insert into tbl_header values ('2405', '09-MAY-2024');

            create table tbl_airports (
              airport_identifier text, airport_name text, area_code text,
              airport_ref_longitude real, airport_ref_latitude real, elevation integer,
              transition_altitude integer, longest_runway_surface_code text, icao_code text);
            insert into tbl_airports values
              ('EDDF', 'FRANKFURT MAIN', 'EUR', 8.5431, 50.0267, 364, 5000, 'H', 'ED'),
              ('KXTA', 'HOMEY AAF', 'USA', -115.8, 37.23, 4462, 18000, 'H', 'K2');

            create table tbl_runways (
              icao_code text, airport_identifier text, runway_identifier text,
              runway_longitude real, runway_latitude real,
              runway_magnetic_bearing real, runway_true_bearing real,
              landing_threshold_elevation integer, displaced_threshold_distance integer,
              runway_length integer, runway_width integer, llz_identifier text);
            insert into tbl_runways values
              ('ED', 'EDDF', 'RW07C', 8.5262, 50.0324, 66.0, 69.0, 362, 0, 13123, 197, 'IFEM'),
              ('ED', 'EDDF', 'RW25C', 8.5868, 50.0454, 246.0, 249.0, 366, 0, 13123, 197, 'IFWC'),
              ('K2', 'KXTA', 'RW09', -115.83, 37.23, 88.0, 101.0, 4462, 0, 12000, 150, null);

            create table tbl_vhfnavaids (
              area_code text, icao_code text, vor_identifier text, vor_name text,
              vor_frequency real, navaid_class text, vor_longitude real, vor_latitude real,
              elevation integer, range integer,
              dme_ident text, dme_longitude real, dme_latitude real, dme_elevation integer);
            insert into tbl_vhfnavaids values
              ('EUR', 'ED', 'FFM', 'FRANKFURT', 114.2, 'VDH', 8.64, 50.05, 364, 130,
               'FFM', 8.64, 50.05, 364),
              ('EUR', 'ED', 'TAU', 'TAUNUS TACAN', 113.5, 'TC', 8.3, 50.2, 1200, 130,
               'TAU', 8.3, 50.2, 1200);

            create table tbl_enroute_ndbnavaids (
              area_code text, icao_code text, ndb_identifier text, ndb_name text,
              ndb_frequency real, navaid_class text, ndb_longitude real, ndb_latitude real,
              range integer);
            insert into tbl_enroute_ndbnavaids values
              ('EUR', 'ED', 'CHA', 'CHARLIE', 370.0, 'MW', 8.9, 50.1, 50);

            create table tbl_terminal_ndbnavaids (
              area_code text, icao_code text, airport_identifier text, ndb_identifier text,
              ndb_name text, ndb_frequency real, navaid_class text,
              ndb_longitude real, ndb_latitude real, range integer);

            create table tbl_enroute_waypoints (
              area_code text, icao_code text, waypoint_identifier text, waypoint_type text,
              waypoint_longitude real, waypoint_latitude real);
            insert into tbl_enroute_waypoints values
              ('EUR', 'ED', 'UNOKO', 'W', 8.0, 50.3),
              ('EUR', 'ED', 'OSMAX', 'W', 8.4, 50.5),
              ('EUR', 'ED', 'ASPAT', 'W', 8.8, 50.7);

            create table tbl_terminal_waypoints (
              area_code text, icao_code text, airport_identifier text,
              waypoint_identifier text, waypoint_type text,
              waypoint_longitude real, waypoint_latitude real);
            insert into tbl_terminal_waypoints values
              ('EUR', 'ED', 'EDDF', 'FF07C', 'W', 8.4, 50.0);

            create table tbl_localizers_glideslopes (
              area_code text, icao_code text, airport_identifier text, runway_identifier text,
              llz_identifier text, llz_frequency real, llz_bearing real, llz_width real,
              llz_longitude real, llz_latitude real,
              gs_longitude real, gs_latitude real, gs_angle real, gs_elevation integer,
              station_declination real);
            insert into tbl_localizers_glideslopes values
              ('EUR', 'ED', 'EDDF', 'RW07C', 'IFEM', 110.3, 66.0, 4.0,
               8.59, 50.04, 8.53, 50.03, 3.0, 364, 3.0);

            create table tbl_airspaces (
              airspace_name text, airspace_type text, seqno integer,
              longitude real, latitude real,
              min_altitude integer, max_altitude integer,
              min_altitude_type text, max_altitude_type text,
              com_type text, com_frequency real, com_name text);
            insert into tbl_airspaces values
              ('FRANKFURT CTR', 'C', 1, 8.4, 49.9, 0, 5000, 'MSL', 'MSL', 'CTR', 119.9, 'LANGEN'),
              ('FRANKFURT CTR', 'C', 2, 8.7, 49.9, 0, 5000, 'MSL', 'MSL', 'CTR', 119.9, 'LANGEN'),
              ('FRANKFURT CTR', 'C', 3, 8.7, 50.1, 0, 5000, 'MSL', 'MSL', 'CTR', 119.9, 'LANGEN');

            create table tbl_airport_communication (
              airport_identifier text, communication_type text,
              communication_frequency real, callsign text);
            insert into tbl_airport_communication values
              ('EDDF', 'TWR', 119.9, 'FRANKFURT TOWER');

            create table tbl_airways (
              route_identifier text, seqno integer, icao_code text, flightlevel text,
              waypoint_description_code text, direction_restriction text,
              minimum_altitude1 integer, minimum_altitude2 integer, maximum_altitude integer,
              waypoint_identifier text, waypoint_longitude real, waypoint_latitude real);
            insert into tbl_airways values
              ('T161', 10, 'ED', 'H', 'E ', '', 10000, null, 24000, 'UNOKO', 8.0, 50.3),
              ('T161', 20, 'ED', 'H', 'EE', 'F', 10000, null, 24000, 'OSMAX', 8.4, 50.5),
              ('T161', 30, 'ED', 'H', 'E ', '', 11000, null, 24000, 'OSMAX', 8.4, 50.5),
              ('T161', 40, 'ED', 'H', 'EE', '', 11000, null, 24000, 'ASPAT', 8.8, 50.7);

            create table tbl_iaps (
              airport_identifier text, procedure_identifier text, route_type text,
              transition_identifier text, seqno integer,
              waypoint_identifier text, waypoint_icao_code text,
              waypoint_description_code text,
              waypoint_longitude real, waypoint_latitude real,
              turn_direction text, path_termination text,
              recommanded_navaid text, recommanded_navaid_longitude real,
              recommanded_navaid_latitude real,
              theta real, rho real, magnetic_course real,
              route_distance_holding_distance_time real,
              altitude_description text, altitude1 real, altitude2 real,
              transition_altitude real, speed_limit_description text, speed_limit integer);
            insert into tbl_iaps values
              ('EDDF', 'I07C', 'I', '', 10, 'FF07C', 'ED', 'E  ', 8.4, 50.0,
               '', 'IF', 'FFM', 8.64, 50.05, null, null, 66.0, 0.0, '', 3000, null, 5000, '', null),
              ('EDDF', 'I07C', 'I', '', 20, 'RW07C', 'ED', 'G  ', 8.53, 50.03,
               '', 'TF', 'IFEM', 8.59, 50.04, null, null, 66.0, 4.2, '', 364, null, 5000, '', null),
              ('EDDF', 'I07C', 'I', '', 30, 'MTAW1', 'ED', 'EEM', 8.7, 50.1,
               'L', 'HM', 'FFM', 8.64, 50.05, null, null, 246.0, 1.0, '+', 4000, null, 5000, '', null),
              ('EDDF', 'I07C', 'A', 'UNOKO', 10, 'UNOKO', 'ED', 'E  ', 8.0, 50.3,
               '', 'IF', '', 0, 0, null, null, null, 0.0, '', 7000, null, 5000, '', null),
              ('EDDF', 'I07C', 'A', 'UNOKO', 20, 'FF07C', 'ED', 'E  ', 8.4, 50.0,
               '', 'TF', '', 0, 0, null, null, 66.0, 12.0, '', 3000, null, 5000, '', null);

            create table tbl_sids (
              airport_identifier text, procedure_identifier text, route_type text,
              transition_identifier text, seqno integer,
              waypoint_identifier text, waypoint_icao_code text,
              waypoint_description_code text,
              waypoint_longitude real, waypoint_latitude real,
              turn_direction text, path_termination text,
              recommanded_navaid text, recommanded_navaid_longitude real,
              recommanded_navaid_latitude real,
              theta real, rho real, magnetic_course real,
              route_distance_holding_distance_time real,
              altitude_description text, altitude1 real, altitude2 real,
              transition_altitude real, speed_limit_description text, speed_limit integer);
            insert into tbl_sids values
              ('EDDF', 'ANEK1A', '2', '', 10, 'ANEKI', 'ED', 'E  ', 8.2, 50.4,
               '', 'CF', 'FFM', 8.64, 50.05, null, null, 250.0, 8.0, '+', 5000, null, 5000, '', null);

            create table tbl_stars (
              airport_identifier text, procedure_identifier text, route_type text,
              transition_identifier text, seqno integer,
              waypoint_identifier text, waypoint_icao_code text,
              waypoint_description_code text,
              waypoint_longitude real, waypoint_latitude real,
              turn_direction text, path_termination text,
              recommanded_navaid text, recommanded_navaid_longitude real,
              recommanded_navaid_latitude real,
              theta real, rho real, magnetic_course real,
              route_distance_holding_distance_time real,
              altitude_description text, altitude1 real, altitude2 real,
              transition_altitude real, speed_limit_description text, speed_limit integer);
            ",
        )
        .unwrap();
        path.display().to_string()
    }

    fn compile_all(conn: &Connection, magdec: &MagDecReader, src_path: &str) -> DfdStats {
        let mut compiler = DfdCompiler::new(conn, magdec);
        compiler.attach_database(src_path).unwrap();
        compiler.read_header().unwrap();
        compiler.write_file_and_scenery_metadata().unwrap();
        compiler.write_airports().unwrap();
        compiler.write_runways().unwrap();
        compiler.write_navaids().unwrap();
        compiler.write_airspaces().unwrap();
        compiler.write_com().unwrap();
        compiler.write_airways().unwrap();
        compiler.create_waypoints_for_procedures().unwrap();
        compiler.update_magvar().unwrap();
        compiler.update_tacan_channel().unwrap();
        compiler.update_ils_geometry().unwrap();
        compiler.write_procedures().unwrap();
        assert_eq!(compiler.airac_cycle(), Some("2405"));
        let stats = compiler.stats();
        compiler.close().unwrap();
        stats
    }

    fn setup() -> (Connection, tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let src_path = source_db(dir.path());
        let conn = Connection::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        (conn, dir, src_path)
    }

    #[test]
    fn test_airports_and_runway_pairing() {
        let (conn, _dir, src) = setup();
        let magdec = MagDecReader::from_uniform(3.0);
        let stats = compile_all(&conn, &magdec, &src);

        assert_eq!(stats.airports, 2);
        assert_eq!(stats.runways, 2);

        // EDDF got a real pair, KXTA an orphan with a synthesized end
        let (num_runways, mag_var, military): (i64, f64, bool) = conn
            .query_row(
                "select num_runways, mag_var, is_military from airport where ident = 'EDDF'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(num_runways, 1);
        assert_eq!(mag_var, 3.0);
        assert!(!military);

        let military: bool = conn
            .query_row("select is_military from airport where ident = 'KXTA'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(military, "AAF in the name marks the airport military");

        // The synthesized KXTA end is 27, closed, without ILS
        let (name, closed): (String, bool) = conn
            .query_row(
                "select e.name, e.has_closed_markings from runway r
                 join airport a on r.airport_id = a.airport_id
                 join runway_end e on e.runway_end_id = r.secondary_end_id
                 where a.ident = 'KXTA'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "27");
        assert!(closed);

        // True heading = magnetic bearing + declination
        let heading: f64 = conn
            .query_row(
                "select r.heading from runway r join airport a on r.airport_id = a.airport_id
                 where a.ident = 'EDDF'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!((heading - 69.0).abs() < 1e-6);

        // Airport rectangle contains the runway endpoints
        let contained: i64 = conn
            .query_row(
                "select count(1) from runway r join airport a on r.airport_id = a.airport_id
                 where r.primary_lonx between a.left_lonx and a.right_lonx
                   and r.primary_laty between a.bottom_laty and a.top_laty
                   and r.secondary_lonx between a.left_lonx and a.right_lonx
                   and r.secondary_laty between a.bottom_laty and a.top_laty",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(contained, 2);
    }

    #[test]
    fn test_navaids_and_derived_passes() {
        let (conn, _dir, src) = setup();
        let magdec = MagDecReader::from_uniform(2.5);
        compile_all(&conn, &magdec, &src);

        // VOR-DME typed by range class, TACAN by class
        let vor_type: String = conn
            .query_row("select type from vor where ident = 'FFM'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vor_type, "H");

        let (tacan_type, channel): (String, Option<String>) = conn
            .query_row("select type, channel from vor where ident = 'TAU'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(tacan_type, "TC");
        assert_eq!(channel.as_deref(), Some("82X"));

        // Plain VOR keeps a null channel
        let channel: Option<String> = conn
            .query_row("select channel from vor where ident = 'FFM'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(channel, None);

        // Magvar pass wrote the model value on waypoints and NDBs
        let mag_var: f64 = conn
            .query_row("select mag_var from waypoint where ident = 'UNOKO'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(mag_var, 2.5);
        let mag_var: f64 = conn
            .query_row("select mag_var from ndb where ident = 'CHA'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mag_var, 2.5);

        // ILS got feather geometry pointing away from the runway
        let (end1_lonx, mid_lonx, loc_lonx): (f64, f64, f64) = conn
            .query_row(
                "select end1_lonx, end_mid_lonx, lonx from ils where ident = 'IFEM'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        // Localizer heading is roughly east, so the feather extends west
        assert!(end1_lonx < loc_lonx);
        assert!(mid_lonx < loc_lonx);
    }

    #[test]
    fn test_airway_state_machine_fragments() {
        let (conn, _dir, src) = setup();
        let magdec = MagDecReader::from_uniform(0.0);
        let stats = compile_all(&conn, &magdec, &src);

        // Rows 10-20 are fragment 1, rows 30-40 fragment 2
        assert_eq!(stats.airway_segments, 2);
        let segments: Vec<(i64, i64, String, String)> = conn
            .prepare(
                "select airway_fragment_no, sequence_no, airway_type, direction
                 from airway order by airway_id",
            )
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].0, 1);
        assert_eq!(segments[0].1, 1);
        assert_eq!(segments[0].2, "J");
        assert_eq!(segments[0].3, "N");
        assert_eq!(segments[1].0, 2);
        assert_eq!(segments[1].1, 1);

        // Chaining invariant within each fragment
        let bad: i64 = conn
            .query_row(
                "select count(1) from airway a join airway b
                   on a.airway_name = b.airway_name
                  and a.airway_fragment_no = b.airway_fragment_no
                  and b.sequence_no = a.sequence_no + 1
                 where a.to_waypoint_id <> b.from_waypoint_id",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(bad, 0);
    }

    #[test]
    fn test_procedures_through_writer() {
        let (conn, _dir, src) = setup();
        let magdec = MagDecReader::from_uniform(0.0);
        compile_all(&conn, &magdec, &src);

        // One approach with one transition plus one SID
        assert_eq!(crate::db::row_count(&conn, "approach").unwrap(), 2);
        assert_eq!(crate::db::row_count(&conn, "transition").unwrap(), 1);

        // The holding leg read the dual-purpose column as a time
        let (time, distance): (Option<f64>, Option<f64>) = conn
            .query_row(
                "select time, distance from approach_leg where type = 'HM'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(time, Some(1.0));
        assert_eq!(distance, None);

        // Missed approach leg flagged via the description code
        let missed: i64 = conn
            .query_row("select count(1) from approach_leg where is_missed = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(missed, 1);

        // SID stored with departure suffix
        let suffix: String = conn
            .query_row(
                "select suffix from approach where airport_ident = 'EDDF' and suffix is not null",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(suffix, "D");
    }

    #[test]
    fn test_airspace_and_com() {
        let (conn, _dir, src) = setup();
        let magdec = MagDecReader::from_uniform(0.0);
        let stats = compile_all(&conn, &magdec, &src);

        assert_eq!(stats.boundaries, 1);
        let (name, com_frequency, left, right): (String, i64, f64, f64) = conn
            .query_row(
                "select name, com_frequency, left_lonx, right_lonx from boundary",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(name, "FRANKFURT CTR");
        assert_eq!(com_frequency, 119_900);
        assert!(left < right);

        let num_com: i64 = conn
            .query_row("select num_com from airport where ident = 'EDDF'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(num_com, 1);
    }

    #[test]
    fn test_overlong_airway_segment_dropped() {
        let (conn, _dir, src) = setup();
        {
            // A route with a single segment of roughly 1400 NM
            let srcdb = Connection::open(&src).unwrap();
            srcdb
                .execute_batch(
                    "insert into tbl_enroute_waypoints values
                       ('EUR', 'ED', 'FARWP', 'W', 45.0, 50.3);
                     insert into tbl_airways values
                       ('Q999', 10, 'ED', 'H', 'E ', '', 10000, null, 24000, 'UNOKO', 8.0, 50.3),
                       ('Q999', 20, 'ED', 'H', 'EE', '', 10000, null, 24000, 'FARWP', 45.0, 50.3);",
                )
                .unwrap();
        }

        let magdec = MagDecReader::from_uniform(0.0);

        // The trusted default cap keeps the long segment
        let mut compiler = DfdCompiler::new(&conn, &magdec);
        compiler.attach_database(&src).unwrap();
        compiler.write_navaids().unwrap();
        compiler.write_airways().unwrap();
        let stats = compiler.stats();
        assert_eq!(stats.airway_segments, 3);
        assert_eq!(stats.dropped_airway_segments, 0);
        compiler.close().unwrap();

        // The untrusted cap drops it; the kept T161 segments survive
        conn.execute_batch(
            "delete from airway; delete from waypoint;
             delete from vor; delete from ndb; delete from ils;",
        )
        .unwrap();
        let mut compiler = DfdCompiler::new(&conn, &magdec);
        compiler.set_max_airway_segment_nm(crate::airway::MAX_SEGMENT_LENGTH_UNTRUSTED_NM);
        compiler.attach_database(&src).unwrap();
        compiler.write_navaids().unwrap();
        compiler.write_airways().unwrap();
        let stats = compiler.stats();
        assert_eq!(stats.airway_segments, 2);
        assert_eq!(stats.dropped_airway_segments, 1);
        let count: i64 = conn
            .query_row(
                "select count(1) from airway where airway_name = 'Q999'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
        compiler.close().unwrap();
    }

    #[test]
    fn test_vor_type_from_class() {
        assert_eq!(vor_type_from_class("VH"), ("H".to_string(), false, false));
        assert_eq!(vor_type_from_class("VDL"), ("L".to_string(), false, true));
        assert_eq!(vor_type_from_class("VTH"), ("VTH".to_string(), false, true));
        assert_eq!(vor_type_from_class("TC"), ("TC".to_string(), false, true));
        assert_eq!(vor_type_from_class("DH"), ("DME".to_string(), true, true));
    }
}
