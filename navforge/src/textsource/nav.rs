//! Waypoint and navaid file parsers.
//!
//! `earth_fix.dat` rows: `lat lon ident region`.
//!
//! `earth_nav.dat` rows: `code lat lon elev freq range var ident region
//! airport name...`; localizer rows (codes 4 and 5) carry the runway
//! designator between the airport and the name. Codes: 2 NDB, 3 VOR,
//! 4 ILS localizer, 5 stand-alone localizer, 7/8/9 outer/middle/inner
//! marker. Other codes are skipped.

use std::io::BufRead;
use std::path::Path;

use rusqlite::params;

use crate::geo::Pos;
use crate::ils::{feather_geometry, ILS_FEATHER_LEN_NM};

use super::{open_lines, TextCompiler, TextSourceError};

/// Localizer beam width used when the source does not carry one.
const DEFAULT_LOC_WIDTH_DEG: f64 = 4.0;

pub(super) fn compile_fixes(
    compiler: &mut TextCompiler,
    path: &Path,
) -> Result<(), TextSourceError> {
    let Some(reader) = open_lines(path)? else {
        return Ok(());
    };

    let mut insert = compiler.conn().prepare(
        "insert into waypoint (ident, region, type, mag_var, lonx, laty)
         values (?1, ?2, 'WN', ?3, ?4, ?5)",
    )?;

    let mut attempted = 0usize;
    let mut read = 0usize;
    for (line_nr, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TextSourceError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('I') || line.starts_with('A') {
            continue;
        }
        if line == "99" {
            break;
        }

        attempted += 1;
        let parts: Vec<&str> = line.split_whitespace().collect();
        let parsed = (|| -> Option<(f64, f64, &str, &str)> {
            Some((
                parts.first()?.parse().ok()?,
                parts.get(1)?.parse().ok()?,
                parts.get(2)?,
                parts.get(3)?,
            ))
        })();
        let Some((laty, lonx, ident, region)) = parsed else {
            tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed waypoint line");
            continue;
        };

        let pos = Pos::new(lonx, laty);
        insert.execute(params![
            ident,
            region,
            compiler.magdec().mag_var(&pos),
            pos.lonx,
            pos.laty
        ])?;
        read += 1;
    }
    drop(insert);

    if attempted > 0 && read == 0 {
        return Err(TextSourceError::NoRecords(path.to_path_buf()));
    }
    compiler.stats_mut().waypoints += read;
    tracing::info!(file = %path.display(), read, "Compiled waypoints");
    Ok(())
}

pub(super) fn compile_navs(
    compiler: &mut TextCompiler,
    path: &Path,
) -> Result<(), TextSourceError> {
    let Some(reader) = open_lines(path)? else {
        return Ok(());
    };

    let mut attempted = 0usize;
    let mut read = 0usize;
    for (line_nr, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TextSourceError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('I') || line.starts_with('A') {
            continue;
        }
        if line == "99" {
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(code) = parts.first().and_then(|c| c.parse::<u8>().ok()) else {
            continue;
        };
        if !matches!(code, 2 | 3 | 4 | 5 | 7 | 8 | 9) {
            continue;
        }

        attempted += 1;
        if parts.len() < 9 {
            tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed navaid line");
            continue;
        }

        let laty: f64 = parts[1].parse().unwrap_or(0.0);
        let lonx: f64 = parts[2].parse().unwrap_or(0.0);
        let elevation: i64 = parts[3].parse().unwrap_or(0);
        let frequency: i64 = parts[4].parse().unwrap_or(0);
        let range: i64 = parts[5].parse().unwrap_or(0);
        let var: f64 = parts[6].parse().unwrap_or(0.0);
        let ident = parts[7];
        let region = parts[8];

        match code {
            2 => {
                let name = parts.get(10..).map(|p| p.join(" ")).unwrap_or_default();
                compiler.conn().execute(
                    "insert into ndb (ident, name, region, type, frequency, range, mag_var,
                                      altitude, lonx, laty)
                     values (?1, ?2, ?3, 'MW', ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![ident, name, region, frequency * 100, range, var, elevation, lonx, laty],
                )?;
            }
            3 => {
                let name = parts.get(10..).map(|p| p.join(" ")).unwrap_or_default();
                // Range class from the published range
                let vor_type = if range >= 100 {
                    "H"
                } else if range >= 40 {
                    "L"
                } else {
                    "T"
                };
                compiler.conn().execute(
                    "insert into vor (ident, name, region, type, frequency, range, mag_var,
                                      dme_only, altitude, lonx, laty)
                     values (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10)",
                    params![
                        ident,
                        name,
                        region,
                        vor_type,
                        frequency * 10,
                        range,
                        var,
                        elevation,
                        lonx,
                        laty
                    ],
                )?;
            }
            4 | 5 => {
                // code lat lon elev freq range bearing ident region
                // airport runway name...
                let airport = parts.get(9).copied().unwrap_or("");
                let runway = parts.get(10).copied().unwrap_or("");
                let name = parts.get(11..).map(|p| p.join(" ")).unwrap_or_default();

                // The var column is the true localizer bearing here; the
                // feather is derived at load since no later pass runs for
                // this adapter.
                let pos = Pos::new(lonx, laty);
                let feather = feather_geometry(pos, var, DEFAULT_LOC_WIDTH_DEG, ILS_FEATHER_LEN_NM);

                compiler.conn().execute(
                    "insert into ils (ident, name, region, frequency, range,
                                      loc_airport_ident, loc_runway_name, loc_heading, loc_width,
                                      end1_lonx, end1_laty, end_mid_lonx, end_mid_laty,
                                      end2_lonx, end2_laty, altitude, lonx, laty)
                     values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18)",
                    params![
                        ident,
                        name,
                        region,
                        frequency * 10,
                        range,
                        airport,
                        runway,
                        var,
                        DEFAULT_LOC_WIDTH_DEG,
                        feather.end1.lonx,
                        feather.end1.laty,
                        feather.mid.lonx,
                        feather.mid.laty,
                        feather.end2.lonx,
                        feather.end2.laty,
                        elevation,
                        lonx,
                        laty
                    ],
                )?;
            }
            7 | 8 | 9 => {
                let marker_type = match code {
                    7 => "OM",
                    8 => "MM",
                    _ => "IM",
                };
                compiler.conn().execute(
                    "insert into marker (type, ident, region, heading, altitude, lonx, laty)
                     values (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![marker_type, ident, region, var, elevation, lonx, laty],
                )?;
            }
            _ => unreachable!(),
        }
        read += 1;
    }

    if attempted > 0 && read == 0 {
        return Err(TextSourceError::NoRecords(path.to_path_buf()));
    }
    compiler.stats_mut().navaids += read;
    tracing::info!(file = %path.display(), read, "Compiled navaids");
    Ok(())
}

#[cfg(test)]
mod tests {
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
        (conn, MagDecReader::from_uniform(1.0), tempfile::tempdir().unwrap())
    }

    #[test]
    fn test_compile_fixes() {
        let (conn, magdec, dir) = setup();
        let path = write_file(
            dir.path(),
            "earth_fix.dat",
            "I\n1101 Version\n50.30 8.00 UNOKO ED\n50.50 8.40 OSMAX ED\nbroken line here\n99\n",
        );

        let mut compiler = TextCompiler::new(&conn, &magdec);
        compiler.compile_fixes(&path).unwrap();
        assert_eq!(compiler.stats().waypoints, 2);

        let mag_var: f64 = conn
            .query_row("select mag_var from waypoint where ident = 'UNOKO'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(mag_var, 1.0);
    }

    #[test]
    fn test_compile_navs_all_types() {
        let (conn, magdec, dir) = setup();
        let content = "\
I
1150 Version
2 50.10 8.90 1200 370 50 2.0 CHA ED NDB CHARLIE
3 50.05 8.64 364 11420 130 2.0 FFM ED VOR FRANKFURT
4 50.03 8.53 364 11030 18 68.5 IFEM ED EDDF 07C ILS-cat-II
7 50.02 8.48 350 0 0 68.5 ---- ED OM
99
";
        let path = write_file(dir.path(), "earth_nav.dat", content);
        let mut compiler = TextCompiler::new(&conn, &magdec);
        compiler.compile_navs(&path).unwrap();
        assert_eq!(compiler.stats().navaids, 4);

        let freq: i64 = conn
            .query_row("select frequency from vor where ident = 'FFM'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(freq, 114_200);
        let vor_type: String = conn
            .query_row("select type from vor where ident = 'FFM'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vor_type, "H");

        let freq: i64 = conn
            .query_row("select frequency from ndb where ident = 'CHA'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(freq, 37_000);

        // Localizer row carries airport and runway and gets its feather
        let (airport, runway, end1_lonx, lonx): (String, String, f64, f64) = conn
            .query_row(
                "select loc_airport_ident, loc_runway_name, end1_lonx, lonx from ils",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(airport, "EDDF");
        assert_eq!(runway, "07C");
        // Bearing is roughly east, so the feather extends west
        assert!(end1_lonx < lonx);

        let marker_type: String = conn
            .query_row("select type from marker", [], |r| r.get(0))
            .unwrap();
        assert_eq!(marker_type, "OM");
    }

    #[test]
    fn test_absent_file_is_success() {
        let (conn, magdec, dir) = setup();
        let mut compiler = TextCompiler::new(&conn, &magdec);
        compiler
            .compile_navs(&dir.path().join("earth_nav.dat"))
            .unwrap();
        assert_eq!(compiler.stats().navaids, 0);
    }
}
