//! Procedure writer.
//!
//! Procedure sources deliver one leg per row in canonical order
//! `(airport, procedure, route type, transition, sequence)`. This module
//! buffers those rows and flushes a complete procedure record whenever a
//! boundary changes: an airport change flushes everything, a procedure
//! change flushes the current procedure, a transition change closes the
//! current transition.
//!
//! Fix references resolve in preference order: by identifier and region
//! against the waypoint table, then by identifier plus nearest match to
//! the supplied coordinate, and finally by synthesizing a coordinate-only
//! waypoint. The "creating waypoints for procedures" pass runs before
//! procedure writing so most lookups hit the first rung.

use rusqlite::{params, Connection};

use crate::geo::Pos;

/// Procedure family of an input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCode {
    Approach,
    Sid,
    Star,
}

impl RowCode {
    /// Suffix letter stored on the approach record: SIDs are departures,
    /// STARs arrivals.
    fn suffix(&self) -> Option<&'static str> {
        match self {
            RowCode::Approach => None,
            RowCode::Sid => Some("D"),
            RowCode::Star => Some("A"),
        }
    }
}

/// A neutral procedure leg row, one per source row.
///
/// All adapters produce this structure so the writer behaves identically
/// for relational and text sources.
#[derive(Debug, Clone, Default)]
pub struct ProcedureInput {
    /// Source context for error reporting (file, airport, procedure)
    pub context: String,

    pub airport_ident: String,
    pub airport_id: Option<i64>,

    pub seq_nr: i32,
    pub route_type: Option<char>,
    pub proc_ident: String,
    pub trans_ident: String,

    pub fix_ident: String,
    pub fix_region: String,
    pub desc_code: String,
    pub fix_pos: Pos,

    pub turn_dir: String,
    pub path_term: String,
    pub recommended_navaid: String,
    pub recommended_pos: Pos,

    pub theta: Option<f64>,
    pub rho: Option<f64>,
    pub mag_course: Option<f64>,
    /// Distance in NM, or hold time in minutes for H* path terminations
    pub rte_hold_dist_time: f64,

    pub alt_descr: String,
    pub altitude1: Option<f64>,
    pub altitude2: Option<f64>,
    pub trans_alt: Option<f64>,
    pub speed_limit_descr: String,
    pub speed_limit: Option<i64>,
}

#[derive(Debug, Clone)]
struct LegRow {
    is_missed: bool,
    path_term: String,
    desc_code: String,
    alt_descr: String,
    turn_dir: String,
    fix_ident: String,
    fix_region: String,
    fix_pos: Pos,
    recommended_ident: String,
    recommended_region: String,
    recommended_pos: Pos,
    course: Option<f64>,
    distance: Option<f64>,
    time: Option<f64>,
    theta: Option<f64>,
    rho: Option<f64>,
    altitude1: Option<f64>,
    altitude2: Option<f64>,
    speed_limit_descr: String,
    speed_limit: Option<i64>,
}

#[derive(Debug)]
struct CurrentProcedure {
    airport_ident: String,
    airport_id: Option<i64>,
    row_code: RowCode,
    proc_ident: String,
    route_type: Option<char>,
    legs: Vec<LegRow>,
    transitions: Vec<(String, Vec<LegRow>)>,
    cur_transition: Option<(String, Vec<LegRow>)>,
}

/// Counters of one writer run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcedureStats {
    pub procedures: usize,
    pub transitions: usize,
    pub legs: usize,
    pub synthesized_waypoints: usize,
    pub unresolved_fixes: usize,
}

/// Stateful procedure builder writing approach, transition and leg rows.
pub struct ProcedureWriter<'c> {
    conn: &'c Connection,
    row_code: RowCode,
    current: Option<CurrentProcedure>,
    stats: ProcedureStats,
}

impl<'c> ProcedureWriter<'c> {
    pub fn new(conn: &'c Connection, row_code: RowCode) -> Self {
        Self {
            conn,
            row_code,
            current: None,
            stats: ProcedureStats::default(),
        }
    }

    pub fn stats(&self) -> ProcedureStats {
        self.stats
    }

    /// Feeds one input row, flushing on boundary changes.
    pub fn write(&mut self, input: &ProcedureInput) -> rusqlite::Result<()> {
        let procedure_changed = match &self.current {
            Some(cur) => {
                cur.airport_ident != input.airport_ident || cur.proc_ident != input.proc_ident
            }
            None => true,
        };

        if procedure_changed {
            self.flush()?;
            self.current = Some(CurrentProcedure {
                airport_ident: input.airport_ident.clone(),
                airport_id: input.airport_id,
                row_code: self.row_code,
                proc_ident: input.proc_ident.clone(),
                route_type: input.route_type,
                legs: Vec::new(),
                transitions: Vec::new(),
                cur_transition: None,
            });
        }

        let leg = self.build_leg(input)?;
        self.stats.legs += 1;

        let Some(cur) = self.current.as_mut() else {
            return Ok(());
        };
        if input.trans_ident.is_empty() {
            cur.legs.push(leg);
        } else {
            match &mut cur.cur_transition {
                Some((ident, legs)) if *ident == input.trans_ident => legs.push(leg),
                _ => {
                    // Transition boundary: close the previous one
                    if let Some(done) = cur.cur_transition.take() {
                        cur.transitions.push(done);
                    }
                    cur.cur_transition = Some((input.trans_ident.clone(), vec![leg]));
                }
            }
        }
        Ok(())
    }

    /// Flushes the buffered procedure, if any.
    pub fn finish(&mut self) -> rusqlite::Result<()> {
        self.flush()
    }

    /// Discards buffered state without writing.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn build_leg(&mut self, input: &ProcedureInput) -> rusqlite::Result<LegRow> {
        let (fix_region, fix_pos) =
            self.resolve_fix(&input.fix_ident, &input.fix_region, input.fix_pos, input)?;

        // Holding legs carry a time; everything else a distance
        let (distance, time) = if input.path_term.starts_with('H') {
            (None, Some(input.rte_hold_dist_time))
        } else {
            (Some(input.rte_hold_dist_time), None)
        };

        // Third character of the description code marks missed approach
        // legs
        let is_missed = input.desc_code.chars().nth(2) == Some('M');

        Ok(LegRow {
            is_missed,
            path_term: input.path_term.clone(),
            desc_code: input.desc_code.clone(),
            alt_descr: input.alt_descr.clone(),
            turn_dir: input.turn_dir.clone(),
            fix_ident: input.fix_ident.clone(),
            fix_region,
            fix_pos,
            recommended_ident: input.recommended_navaid.clone(),
            recommended_region: String::new(),
            recommended_pos: input.recommended_pos,
            course: input.mag_course,
            distance,
            time,
            theta: input.theta,
            rho: input.rho,
            altitude1: input.altitude1,
            altitude2: input.altitude2,
            speed_limit_descr: input.speed_limit_descr.clone(),
            speed_limit: input.speed_limit,
        })
    }

    /// Resolution ladder for a leg fix.
    fn resolve_fix(
        &mut self,
        ident: &str,
        region: &str,
        pos: Pos,
        input: &ProcedureInput,
    ) -> rusqlite::Result<(String, Pos)> {
        if ident.is_empty() {
            return Ok((region.to_string(), pos));
        }

        // 1. ident + region
        if !region.is_empty() {
            let hit = self
                .conn
                .query_row(
                    "select region, lonx, laty from waypoint
                     where ident = ?1 and region = ?2 order by waypoint_id limit 1",
                    params![ident, region],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                            Pos::new(row.get(1)?, row.get(2)?),
                        ))
                    },
                )
                .ok();
            if let Some(hit) = hit {
                return Ok(hit);
            }
        }

        // 2. ident + nearest to the supplied coordinate
        if !pos.is_null() {
            let hit = self
                .conn
                .query_row(
                    "select region, lonx, laty from waypoint where ident = ?1
                     order by (lonx - ?2) * (lonx - ?2) + (laty - ?3) * (laty - ?3),
                              waypoint_id
                     limit 1",
                    params![ident, pos.lonx, pos.laty],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                            Pos::new(row.get(1)?, row.get(2)?),
                        ))
                    },
                )
                .ok();
            if let Some(hit) = hit {
                return Ok(hit);
            }

            // 3. synthesize a coordinate-only waypoint
            self.conn.execute(
                "insert into waypoint (ident, region, type, mag_var, lonx, laty)
                 values (?1, ?2, 'WU', 0, ?3, ?4)",
                params![ident, region, pos.lonx, pos.laty],
            )?;
            self.stats.synthesized_waypoints += 1;
            tracing::debug!(ident, context = %input.context, "Synthesized waypoint for procedure fix");
            return Ok((region.to_string(), pos));
        }

        self.stats.unresolved_fixes += 1;
        tracing::warn!(
            ident,
            context = %input.context,
            "Procedure fix has neither a known ident nor a coordinate"
        );
        Ok((region.to_string(), pos))
    }

    fn flush(&mut self) -> rusqlite::Result<()> {
        let Some(mut cur) = self.current.take() else {
            return Ok(());
        };
        if let Some(done) = cur.cur_transition.take() {
            cur.transitions.push(done);
        }

        let runway_name = runway_name_from_proc_ident(&cur.proc_ident);
        self.conn.execute(
            "insert into approach (airport_id, airport_ident, runway_name, type, arinc_type,
                                   suffix, has_gps_overlay, fix_type, fix_ident, fix_region,
                                   altitude, heading, missed_altitude)
             values (?1, ?2, ?3, ?4, ?5, ?6, 0, 'W', ?7, ?8, ?9, ?10, null)",
            params![
                cur.airport_id,
                cur.airport_ident,
                runway_name,
                approach_type_from_ident(cur.row_code, &cur.proc_ident),
                cur.route_type.map(|c| c.to_string()),
                cur.row_code.suffix(),
                cur.legs.first().map(|l| l.fix_ident.clone()),
                cur.legs.first().map(|l| l.fix_region.clone()),
                cur.legs.first().and_then(|l| l.altitude1),
                cur.legs.first().and_then(|l| l.course),
            ],
        )?;
        let approach_id = self.conn.last_insert_rowid();
        self.stats.procedures += 1;

        for leg in &cur.legs {
            self.insert_leg("approach_leg", "approach_id", approach_id, leg, leg.is_missed)?;
        }

        for (trans_ident, legs) in &cur.transitions {
            self.conn.execute(
                "insert into transition (approach_id, type, fix_type, fix_ident, fix_region,
                                         altitude, dme_ident, dme_radial, dme_distance)
                 values (?1, 'F', 'W', ?2, ?3, ?4, null, null, null)",
                params![
                    approach_id,
                    trans_ident,
                    legs.first().map(|l| l.fix_region.clone()),
                    legs.first().and_then(|l| l.altitude1),
                ],
            )?;
            let transition_id = self.conn.last_insert_rowid();
            self.stats.transitions += 1;

            for leg in legs {
                self.insert_leg("transition_leg", "transition_id", transition_id, leg, false)?;
            }
        }
        Ok(())
    }

    fn insert_leg(
        &self,
        table: &str,
        parent_column: &str,
        parent_id: i64,
        leg: &LegRow,
        is_missed: bool,
    ) -> rusqlite::Result<()> {
        let sql = format!(
            "insert into {table} ({parent_column}, is_missed, type, arinc_descr_code,
                                  alt_descriptor, turn_direction, fix_type, fix_ident, fix_region,
                                  recommended_fix_type, recommended_fix_ident, recommended_fix_region,
                                  is_flyover, is_true_course, course, distance, time, theta, rho,
                                  altitude1, altitude2, speed_limit_type, speed_limit,
                                  fix_lonx, fix_laty, recommended_fix_lonx, recommended_fix_laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, 'W', ?7, ?8, 'V', ?9, ?10, ?11, 0, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
        );
        // Second description character B marks a flyover fix
        let is_flyover = leg.desc_code.chars().nth(1) == Some('B');

        self.conn.execute(
            &sql,
            params![
                parent_id,
                is_missed,
                leg.path_term,
                leg.desc_code,
                leg.alt_descr,
                leg.turn_dir,
                leg.fix_ident,
                leg.fix_region,
                leg.recommended_ident,
                leg.recommended_region,
                is_flyover,
                leg.course,
                leg.distance,
                leg.time,
                leg.theta,
                leg.rho,
                leg.altitude1,
                leg.altitude2,
                leg.speed_limit_descr,
                leg.speed_limit,
                if leg.fix_pos.is_null() { None } else { Some(leg.fix_pos.lonx) },
                if leg.fix_pos.is_null() { None } else { Some(leg.fix_pos.laty) },
                if leg.recommended_pos.is_null() { None } else { Some(leg.recommended_pos.lonx) },
                if leg.recommended_pos.is_null() { None } else { Some(leg.recommended_pos.laty) },
            ],
        )?;
        Ok(())
    }
}

/// Extracts the runway designator out of a procedure identifier.
///
/// Approach idents prefix the runway with the approach type letter
/// (`I07C`, `R29`), SID/STAR transitions use the `RW` prefix (`RW07B`).
/// `ALL` and idents without digits yield no runway.
pub fn runway_name_from_proc_ident(ident: &str) -> Option<String> {
    let rest = ident.strip_prefix("RW").unwrap_or_else(|| {
        let mut chars = ident.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => chars.as_str(),
            _ => ident,
        }
    });

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    if number == 0 || number > 36 {
        return None;
    }

    let designator: String = rest
        .chars()
        .skip(digits.len())
        .take_while(|c| matches!(c, 'L' | 'R' | 'C'))
        .collect();
    Some(format!("{number:02}{designator}"))
}

fn approach_type_from_ident(row_code: RowCode, ident: &str) -> &'static str {
    match row_code {
        RowCode::Sid | RowCode::Star => "GPS",
        RowCode::Approach => match ident.chars().next() {
            Some('I') => "ILS",
            Some('L') => "LOC",
            Some('R') | Some('H') => "RNAV",
            Some('N') | Some('Q') => "NDB",
            Some('V') | Some('S') | Some('D') => "VOR",
            Some('G') | Some('P') => "GPS",
            _ => "UNKNOWN",
        },
    }
}
