//! Airport database file parser and writer.
//!
//! Streaming parser over the fixed-column airport format. Row code `1`
//! (land airport), `16` (seaplane base) or `17` (heliport) starts an
//! airport; its runways follow on `100` rows and keyed metadata on
//! `1302` rows until the next header or the `99` end marker.

use std::io::BufRead;
use std::path::Path;

use rusqlite::params;

use crate::geo::{meter_to_feet, Pos};
use crate::runways::initial_airport_rect;
use crate::util::{cap_airport_name, is_name_military};

use super::{open_lines, TextCompiler, TextSourceError};

#[derive(Debug, Clone)]
struct ParsedEnd {
    ident: String,
    pos: Pos,
    displaced_m: f64,
}

#[derive(Debug, Clone)]
struct ParsedRunway {
    width_m: f64,
    surface: String,
    end1: ParsedEnd,
    end2: ParsedEnd,
}

#[derive(Debug, Clone, Default)]
struct ParsedAirport {
    ident: String,
    name: String,
    elevation: f64,
    datum: Option<Pos>,
    runways: Vec<ParsedRunway>,
}

/// Runway surface codes of the source format.
fn surface_to_str(code: &str) -> &'static str {
    match code {
        "1" => "A",
        "2" => "C",
        "3" => "G",
        "4" | "5" => "D",
        "13" => "W",
        _ => "UNKNOWN",
    }
}

fn parse_end(parts: &[&str]) -> Option<ParsedEnd> {
    Some(ParsedEnd {
        ident: parts.first()?.to_string(),
        pos: Pos::new(parts.get(2)?.parse().ok()?, parts.get(1)?.parse().ok()?),
        displaced_m: parts.get(3)?.parse().ok()?,
    })
}

pub(super) fn compile(compiler: &mut TextCompiler, path: &Path) -> Result<(), TextSourceError> {
    let Some(reader) = open_lines(path)? else {
        return Ok(());
    };

    let mut current: Option<ParsedAirport> = None;
    let mut attempted = 0usize;
    let mut written = 0usize;

    for (line_nr, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TextSourceError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "1" | "16" | "17" => {
                attempted += 1;
                if let Some(done) = current.take() {
                    written += usize::from(write_airport(compiler, &done)?);
                }
                // 1 <elevation> <deprecated> <deprecated> <ident> <name...>
                if parts.len() < 6 {
                    tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed airport header");
                    continue;
                }
                let Ok(elevation) = parts[1].parse::<f64>() else {
                    tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed airport elevation");
                    continue;
                };
                current = Some(ParsedAirport {
                    ident: parts[4].to_string(),
                    name: parts[5..].join(" "),
                    elevation,
                    datum: None,
                    runways: Vec::new(),
                });
            }
            "100" => {
                // 100 <width_m> <surface> ... end1 at 8, end2 at 17
                let Some(airport) = current.as_mut() else { continue };
                if parts.len() < 26 {
                    tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed runway row");
                    continue;
                }
                let (Some(end1), Some(end2)) =
                    (parse_end(&parts[8..17]), parse_end(&parts[17..26]))
                else {
                    tracing::warn!(file = %path.display(), line = line_nr + 1, "Malformed runway ends");
                    continue;
                };
                airport.runways.push(ParsedRunway {
                    width_m: parts[1].parse().unwrap_or(0.0),
                    surface: surface_to_str(parts[2]).to_string(),
                    end1,
                    end2,
                });
            }
            "1302" => {
                let Some(airport) = current.as_mut() else { continue };
                // 1302 <key> <value>
                if parts.len() < 3 {
                    continue;
                }
                match parts[1] {
                    "datum_lat" => {
                        if let Ok(laty) = parts[2].parse::<f64>() {
                            let lonx = airport.datum.map_or(0.0, |p| p.lonx);
                            airport.datum = Some(Pos::new(lonx, laty));
                        }
                    }
                    "datum_lon" => {
                        if let Ok(lonx) = parts[2].parse::<f64>() {
                            let laty = airport.datum.map_or(0.0, |p| p.laty);
                            airport.datum = Some(Pos::new(lonx, laty));
                        }
                    }
                    _ => {}
                }
            }
            "99" => break,
            _ => {}
        }
    }
    if let Some(done) = current.take() {
        written += usize::from(write_airport(compiler, &done)?);
    }

    if attempted > 0 && written == 0 {
        return Err(TextSourceError::NoRecords(path.to_path_buf()));
    }
    tracing::info!(file = %path.display(), written, "Compiled airports");
    Ok(())
}

/// Writes one parsed airport and its runways. Returns false if the
/// airport has no usable position.
fn write_airport(
    compiler: &mut TextCompiler,
    airport: &ParsedAirport,
) -> Result<bool, TextSourceError> {
    // Reference point: the datum, or the first runway's first threshold
    let reference = airport
        .datum
        .or_else(|| airport.runways.first().map(|r| r.end1.pos));
    let Some(reference) = reference else {
        tracing::warn!(ident = %airport.ident, "Airport without coordinates skipped");
        return Ok(false);
    };
    let reference = Pos::with_altitude(reference.lonx, reference.laty, airport.elevation);

    let mut rect = initial_airport_rect(reference);
    for runway in &airport.runways {
        rect.extend(runway.end1.pos);
        rect.extend(runway.end2.pos);
    }

    let num_hard = airport.runways.iter().filter(|r| matches!(r.surface.as_str(), "A" | "C")).count() as i64;
    let num_soft = airport.runways.iter().filter(|r| matches!(r.surface.as_str(), "G" | "D")).count() as i64;
    let num_water = airport.runways.iter().filter(|r| r.surface == "W").count() as i64;

    let longest = airport.runways.iter().max_by(|a, b| {
        let la = a.end1.pos.distance_meter_to(&a.end2.pos);
        let lb = b.end1.pos.distance_meter_to(&b.end2.pos);
        la.total_cmp(&lb)
    });
    let (longest_length, longest_width, longest_heading, longest_surface) = match longest {
        Some(runway) => (
            meter_to_feet(runway.end1.pos.distance_meter_to(&runway.end2.pos)).round() as i64,
            meter_to_feet(runway.width_m).round() as i64,
            runway.end1.pos.course_to(&runway.end2.pos),
            Some(runway.surface.clone()),
        ),
        None => (0, 0, 0.0, None),
    };

    let conn = compiler.conn();
    conn.execute(
        "insert into airport (ident, name, is_military,
                              num_runway_hard, num_runway_soft, num_runway_water, num_runways,
                              longest_runway_length, longest_runway_width,
                              longest_runway_heading, longest_runway_surface, rating,
                              left_lonx, top_laty, right_lonx, bottom_laty,
                              mag_var, altitude, lonx, laty)
         values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19)",
        params![
            airport.ident,
            cap_airport_name(&airport.name),
            is_name_military(&airport.name),
            num_hard,
            num_soft,
            num_water,
            airport.runways.len() as i64,
            longest_length,
            longest_width,
            longest_heading,
            longest_surface,
            rect.top_left.lonx,
            rect.top_left.laty,
            rect.bottom_right.lonx,
            rect.bottom_right.laty,
            compiler.magdec().mag_var(&reference),
            airport.elevation.round() as i64,
            reference.lonx,
            reference.laty,
        ],
    )?;
    let airport_id = conn.last_insert_rowid();
    let ident = airport.ident.clone();
    compiler.index_mut().add(&ident, airport_id);

    for runway in &airport.runways {
        write_runway(compiler, runway, airport_id, airport.elevation)?;
        compiler.stats_mut().runways += 1;
    }
    compiler.stats_mut().airports += 1;
    Ok(true)
}

fn write_runway(
    compiler: &TextCompiler,
    runway: &ParsedRunway,
    airport_id: i64,
    elevation: f64,
) -> Result<(), TextSourceError> {
    let conn = compiler.conn();
    let center = Pos::new(
        (runway.end1.pos.lonx + runway.end2.pos.lonx) / 2.0,
        (runway.end1.pos.laty + runway.end2.pos.laty) / 2.0,
    );
    let heading = runway.end1.pos.course_to(&runway.end2.pos);
    let length = meter_to_feet(runway.end1.pos.distance_meter_to(&runway.end2.pos));

    let mut end_ids = [0i64; 2];
    for (slot, (end, end_type, end_heading)) in [
        (&runway.end1, "P", heading),
        (&runway.end2, "S", crate::geo::opposed_course(heading)),
    ]
    .iter()
    .enumerate()
    {
        conn.execute(
            "insert into runway_end (name, end_type, offset_threshold, is_takeoff, is_landing,
                                     heading, lonx, laty)
             values (?1, ?2, ?3, 1, 1, ?4, ?5, ?6)",
            params![
                end.ident,
                end_type,
                meter_to_feet(end.displaced_m).round() as i64,
                end_heading,
                end.pos.lonx,
                end.pos.laty,
            ],
        )?;
        end_ids[slot] = conn.last_insert_rowid();
    }

    conn.execute(
        "insert into runway (airport_id, primary_end_id, secondary_end_id, surface, length,
                             width, heading, altitude,
                             primary_lonx, primary_laty, secondary_lonx, secondary_laty,
                             lonx, laty)
         values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            airport_id,
            end_ids[0],
            end_ids[1],
            runway.surface,
            length.round() as i64,
            meter_to_feet(runway.width_m).round() as i64,
            heading,
            elevation.round() as i64,
            runway.end1.pos.lonx,
            runway.end1.pos.laty,
            runway.end2.pos.lonx,
            runway.end2.pos.laty,
            center.lonx,
            center.laty,
        ],
    )?;
    Ok(())
}
