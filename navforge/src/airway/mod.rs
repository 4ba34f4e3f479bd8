//! Airway resolution.
//!
//! Source adapters write ordered en-route rows into the
//! `tmp_airway_point` staging table. The resolver scans them in
//! `(route name, sequence)` order and joins consecutive waypoints into
//! directed airway segments, splitting named routes into fragments at
//! end-of-route markers and name changes.
//!
//! Legacy binary sources contain routes with broken geometry; segments
//! longer than the configured maximum are dropped and a new fragment is
//! started so the emitted chain stays connected.

use rusqlite::{params, Connection};

use crate::geo::{nm_to_meter, Pos, Rect};

/// Default segment length cap for untrusted (legacy binary) sources.
pub const MAX_SEGMENT_LENGTH_UNTRUSTED_NM: f64 = 800.0;

/// Default segment length cap for trusted sources.
pub const MAX_SEGMENT_LENGTH_TRUSTED_NM: f64 = 8000.0;

/// Result counters of one resolver run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AirwayStats {
    pub segments: usize,
    pub fragments: usize,
    pub dropped_long: usize,
    pub unresolved_waypoints: usize,
}

/// Connects staged airway points into airway segments.
pub struct AirwayResolver<'c> {
    conn: &'c Connection,
    max_segment_length_nm: f64,
}

struct PointRow {
    name: String,
    code: String,
    airway_type: String,
    direction: String,
    minimum_altitude: Option<i64>,
    maximum_altitude: Option<i64>,
    waypoint_id: Option<i64>,
    pos: Pos,
}

impl<'c> AirwayResolver<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            max_segment_length_nm: MAX_SEGMENT_LENGTH_UNTRUSTED_NM,
        }
    }

    /// Overrides the segment length cap.
    pub fn set_max_segment_length_nm(&mut self, nm: f64) {
        self.max_segment_length_nm = nm;
    }

    /// Scans the staging table and writes the `airway` table.
    pub fn run(&self) -> rusqlite::Result<AirwayStats> {
        let mut select = self.conn.prepare(
            "select t.name, t.waypoint_description_code, t.type, t.direction,
                    t.minimum_altitude, t.maximum_altitude,
                    (select w.waypoint_id from waypoint w
                     where w.ident = t.waypoint_ident
                       and (t.waypoint_region is null or w.region = t.waypoint_region)
                     order by w.waypoint_id limit 1),
                    t.lonx, t.laty
             from tmp_airway_point t
             order by t.name, t.seqno",
        )?;

        let mut insert = self.conn.prepare(
            "insert into airway (airway_name, airway_type, airway_fragment_no, sequence_no,
                                 from_waypoint_id, to_waypoint_id, direction,
                                 minimum_altitude, maximum_altitude,
                                 left_lonx, top_laty, right_lonx, bottom_laty,
                                 from_lonx, from_laty, to_lonx, to_laty)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        )?;

        let mut stats = AirwayStats::default();
        let mut last: Option<PointRow> = None;
        let mut last_end_of_route = true;
        let mut fragment_no = 1;
        let mut sequence_no = 1;

        let mut rows = select.query([])?;
        while let Some(row) = rows.next()? {
            let current = PointRow {
                name: row.get(0)?,
                code: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                airway_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                direction: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                minimum_altitude: row.get(4)?,
                maximum_altitude: row.get(5)?,
                waypoint_id: row.get(6)?,
                pos: Pos::new(row.get(7)?, row.get(8)?),
            };

            if current.waypoint_id.is_none() {
                stats.unresolved_waypoints += 1;
            }

            let name_change = last.as_ref().is_some_and(|l| l.name != current.name);

            if let Some(prev) = &last {
                if !name_change && last_end_of_route {
                    // Previous row ended the route within the same name
                    fragment_no += 1;
                    sequence_no = 1;
                }

                if !last_end_of_route && !name_change {
                    match self.emit_segment(&mut insert, prev, &current, fragment_no, sequence_no)? {
                        SegmentOutcome::Written => {
                            if sequence_no == 1 {
                                stats.fragments += 1;
                            }
                            stats.segments += 1;
                            sequence_no += 1;
                        }
                        SegmentOutcome::TooLong => {
                            // Keep the written chain connected by starting
                            // a fresh fragment after the gap.
                            stats.dropped_long += 1;
                            fragment_no += 1;
                            sequence_no = 1;
                        }
                        SegmentOutcome::Unresolved => {}
                    }
                }
            }

            last_end_of_route = current.code.chars().nth(1) == Some('E');

            if name_change {
                fragment_no = 1;
                sequence_no = 1;
            }
            last = Some(current);
        }

        tracing::info!(
            segments = stats.segments,
            dropped = stats.dropped_long,
            unresolved = stats.unresolved_waypoints,
            "Resolved airways"
        );
        Ok(stats)
    }

    fn emit_segment(
        &self,
        insert: &mut rusqlite::Statement<'_>,
        from: &PointRow,
        to: &PointRow,
        fragment_no: i32,
        sequence_no: i32,
    ) -> rusqlite::Result<SegmentOutcome> {
        let (Some(from_id), Some(to_id)) = (from.waypoint_id, to.waypoint_id) else {
            return Ok(SegmentOutcome::Unresolved);
        };

        if from.pos.distance_meter_to(&to.pos) > nm_to_meter(self.max_segment_length_nm) {
            tracing::warn!(
                airway = %from.name,
                "Dropping airway segment longer than {} NM",
                self.max_segment_length_nm
            );
            return Ok(SegmentOutcome::TooLong);
        }

        // Flight level H = jet, L = victor, anything else both
        let airway_type = match from.airway_type.as_str() {
            "H" => "J",
            "L" => "V",
            _ => "B",
        };
        // Blank direction means no restriction
        let direction = match from.direction.trim() {
            "F" => "F",
            "B" => "B",
            _ => "N",
        };

        let rect = Rect::from_pair(from.pos, to.pos);
        insert.execute(params![
            from.name,
            airway_type,
            fragment_no,
            sequence_no,
            from_id,
            to_id,
            direction,
            from.minimum_altitude,
            from.maximum_altitude,
            rect.top_left.lonx,
            rect.top_left.laty,
            rect.bottom_right.lonx,
            rect.bottom_right.laty,
            from.pos.lonx,
            from.pos.laty,
            to.pos.lonx,
            to.pos.laty,
        ])?;
        Ok(SegmentOutcome::Written)
    }
}

enum SegmentOutcome {
    Written,
    TooLong,
    Unresolved,
}
