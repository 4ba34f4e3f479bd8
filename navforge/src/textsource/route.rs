//! Airway and procedure file parsers.
//!
//! `airways.txt` rows are comma-delimited and tagged `AWY`:
//!
//! ```text
//! AWY,<name>,<seqno>,<desc_code>,<level>,<direction>,<min_alt>,<max_alt>,<ident>,<region>,<lat>,<lon>
//! ```
//!
//! They are staged into `tmp_airway_point` for the airway resolver.
//!
//! `procedures.txt` rows are tagged `APPCH`, `SID` or `STAR`:
//!
//! ```text
//! APPCH,<airport>,<proc>,<route_type>,<transition>,<seqno>,<fix>,<region>,<desc_code>,<lat>,<lon>,<turn>,<path_term>,<recd_navaid>,<course>,<dist_time>,<alt_descr>,<alt1>,<alt2>,<speed>
//! ```
//!
//! Rows are sorted into the canonical procedure order before being fed
//! to the shared procedure writer.

use std::io::BufRead;
use std::path::Path;

use rusqlite::params;

use crate::geo::Pos;
use crate::proc::{ProcedureInput, ProcedureWriter, RowCode};

use super::{open_lines, TextCompiler, TextSourceError};

pub(super) fn compile_airways(
    compiler: &mut TextCompiler,
    path: &Path,
) -> Result<(), TextSourceError> {
    let Some(reader) = open_lines(path)? else {
        return Ok(());
    };

    let mut insert = compiler.conn().prepare(
        "insert into tmp_airway_point (name, type, direction, seqno, waypoint_description_code,
                                       waypoint_ident, waypoint_region,
                                       minimum_altitude, maximum_altitude, lonx, laty)
         values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    let mut attempted = 0usize;
    let mut read = 0usize;
    for (line_nr, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TextSourceError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields[0] != "AWY" {
            continue;
        }
        attempted += 1;

        let parsed = (|| -> Option<(i64, f64, f64)> {
            Some((
                fields.get(2)?.parse().ok()?,
                fields.get(10)?.parse().ok()?,
                fields.get(11)?.parse().ok()?,
            ))
        })();
        let (Some((seqno, laty, lonx)), Some(name), Some(ident)) =
            (parsed, fields.get(1), fields.get(8))
        else {
            tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed airway row");
            continue;
        };

        insert.execute(params![
            name,
            fields.get(4).copied().unwrap_or(""),
            fields.get(5).copied().unwrap_or(""),
            seqno,
            fields.get(3).copied().unwrap_or(""),
            ident,
            fields.get(9).copied().unwrap_or(""),
            fields.get(6).and_then(|f| f.parse::<i64>().ok()),
            fields.get(7).and_then(|f| f.parse::<i64>().ok()),
            lonx,
            laty,
        ])?;
        read += 1;
    }
    drop(insert);

    if attempted > 0 && read == 0 {
        return Err(TextSourceError::NoRecords(path.to_path_buf()));
    }
    compiler.stats_mut().airway_points += read;
    tracing::info!(file = %path.display(), read, "Staged airway points");
    Ok(())
}

pub(super) fn compile_procedures(
    compiler: &mut TextCompiler,
    path: &Path,
) -> Result<(), TextSourceError> {
    let Some(reader) = open_lines(path)? else {
        return Ok(());
    };

    let mut rows: Vec<(RowCode, ProcedureInput)> = Vec::new();
    let mut attempted = 0usize;

    for (line_nr, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TextSourceError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let row_code = match fields[0] {
            "APPCH" => RowCode::Approach,
            "SID" => RowCode::Sid,
            "STAR" => RowCode::Star,
            _ => continue,
        };
        attempted += 1;

        let Some(input) = parse_procedure_row(&fields, path, line_nr) else {
            continue;
        };
        rows.push((row_code, input));
    }

    if attempted > 0 && rows.is_empty() {
        return Err(TextSourceError::NoRecords(path.to_path_buf()));
    }

    // The writer expects canonical (airport, procedure, route type,
    // transition, sequence) order; files are not required to be sorted.
    rows.sort_by(|(_, a), (_, b)| {
        a.airport_ident
            .cmp(&b.airport_ident)
            .then(a.proc_ident.cmp(&b.proc_ident))
            .then(a.route_type.cmp(&b.route_type))
            .then(a.trans_ident.cmp(&b.trans_ident))
            .then(a.seq_nr.cmp(&b.seq_nr))
    });

    let mut legs = 0usize;
    for row_code in [RowCode::Approach, RowCode::Sid, RowCode::Star] {
        let mut writer = ProcedureWriter::new(compiler.conn(), row_code);
        for (code, input) in &rows {
            if *code != row_code {
                continue;
            }
            let mut input = input.clone();
            input.airport_id = compiler.airport_index().airport_id(&input.airport_ident);
            writer.write(&input)?;
        }
        writer.finish()?;
        legs += writer.stats().legs;
    }

    compiler.stats_mut().procedure_legs += legs;
    tracing::info!(file = %path.display(), legs, "Compiled procedures");
    Ok(())
}

fn parse_procedure_row(fields: &[&str], path: &Path, line_nr: usize) -> Option<ProcedureInput> {
    if fields.len() < 16 {
        tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed procedure row");
        return None;
    }

    let seq_nr: i32 = match fields[5].parse() {
        Ok(seq) => seq,
        Err(_) => {
            tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed procedure sequence");
            return None;
        }
    };

    let laty: f64 = fields[9].parse().unwrap_or(0.0);
    let lonx: f64 = fields[10].parse().unwrap_or(0.0);

    Some(ProcedureInput {
        context: format!("{}:{}", path.display(), line_nr + 1),
        airport_ident: fields[1].to_string(),
        airport_id: None,
        proc_ident: fields[2].to_string(),
        route_type: fields[3].chars().next(),
        trans_ident: fields[4].to_string(),
        seq_nr,
        fix_ident: fields[6].to_string(),
        fix_region: fields[7].to_string(),
        desc_code: fields[8].to_string(),
        fix_pos: Pos::new(lonx, laty),
        turn_dir: fields[11].to_string(),
        path_term: fields[12].to_string(),
        recommended_navaid: fields[13].to_string(),
        recommended_pos: Pos::default(),
        mag_course: fields[14].parse().ok(),
        rte_hold_dist_time: fields[15].parse().unwrap_or(0.0),
        alt_descr: fields.get(16).copied().unwrap_or("").to_string(),
        altitude1: fields.get(17).and_then(|f| f.parse().ok()),
        altitude2: fields.get(18).and_then(|f| f.parse().ok()),
        speed_limit: fields.get(19).and_then(|f| f.parse().ok()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use crate::airway::AirwayResolver;
    use crate::db::schema;
    use crate::magdec::MagDecReader;
    use crate::textsource::TextCompiler;
    use rusqlite::Connection;
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn setup() -> (Connection, MagDecReader, tempfile::TempDir) {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_schema(&conn).unwrap();
        (conn, MagDecReader::from_uniform(0.0), tempfile::tempdir().unwrap())
    }

    #[test]
    fn test_airways_staged_and_resolved() {
        let (conn, magdec, dir) = setup();
        conn.execute_batch(
            "insert into waypoint (ident, region, type, lonx, laty) values
               ('UNOKO', 'ED', 'WN', 8.0, 50.3),
               ('OSMAX', 'ED', 'WN', 8.4, 50.5),
               ('ASPAT', 'ED', 'WN', 8.8, 50.7);",
        )
        .unwrap();

        let content = "\
# enroute airways
AWY,T161,10,E ,H,,10000,24000,UNOKO,ED,50.3,8.0
AWY,T161,20,E ,H,,10000,24000,OSMAX,ED,50.5,8.4
AWY,T161,30,EE,H,,10000,24000,ASPAT,ED,50.7,8.8
not an airway line
";
        let path = write_file(dir.path(), "airways.txt", content);
        let mut compiler = TextCompiler::new(&conn, &magdec);
        compiler.compile_airways(&path).unwrap();
        assert_eq!(compiler.stats().airway_points, 3);

        let stats = AirwayResolver::new(&conn).run().unwrap();
        assert_eq!(stats.segments, 2);
    }

    #[test]
    fn test_procedures_sorted_into_canonical_order() {
        let (conn, magdec, dir) = setup();
        conn.execute_batch(
            "insert into airport (ident, left_lonx, top_laty, right_lonx, bottom_laty, lonx, laty)
             values ('EDDF', 0,0,0,0, 8.5, 50.0);",
        )
        .unwrap();

        // Deliberately out of order; sequence 20 before 10
        let content = "\
APPCH,EDDF,I07C,I,,20,RW07C,ED,G  ,50.03,8.53,,TF,IFEM,66.0,4.2,,364,,
APPCH,EDDF,I07C,I,,10,FF07C,ED,E  ,50.0,8.4,,IF,FFM,66.0,0.0,,3000,,
SID,EDDF,ANEK1A,2,,10,ANEKI,ED,E  ,50.4,8.2,,CF,FFM,250.0,8.0,+,5000,,
";
        let path = write_file(dir.path(), "procedures.txt", content);
        let mut compiler = TextCompiler::new(&conn, &magdec);
        compiler.compile_procedures(&path).unwrap();

        assert_eq!(crate::db::row_count(&conn, "approach").unwrap(), 2);
        assert_eq!(crate::db::row_count(&conn, "approach_leg").unwrap(), 3);

        // First leg of the approach is the IF despite file order
        let first_leg: String = conn
            .query_row(
                "select l.type from approach_leg l
                 join approach a on l.approach_id = a.approach_id
                 where a.type = 'ILS' order by l.approach_leg_id limit 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(first_leg, "IF");
    }

    #[test]
    fn test_malformed_procedure_rows_skipped() {
        let (conn, magdec, dir) = setup();
        let content = "\
APPCH,EDDF,I07C,I,,notanumber,FF07C,ED,E  ,50.0,8.4,,IF,FFM,66.0,0.0,,3000,,
APPCH,EDDF,I07C,I,,10,FF07C,ED,E  ,50.0,8.4,,IF,FFM,66.0,0.0,,3000,,
";
        let path = write_file(dir.path(), "procedures.txt", content);
        let mut compiler = TextCompiler::new(&conn, &magdec);
        compiler.compile_procedures(&path).unwrap();
        assert_eq!(crate::db::row_count(&conn, "approach_leg").unwrap(), 1);
    }
}
