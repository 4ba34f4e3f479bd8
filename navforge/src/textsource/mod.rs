//! Text/line source adapter.
//!
//! Compiles a directory of line-oriented text files:
//!
//! - `airports.dat` - fixed-column airport database. Row code `1` (or
//!   `16`/`17`) starts an airport, `100` adds a runway, `1302` carries
//!   keyed metadata, `99` ends the file.
//! - `earth_fix.dat` - one waypoint per line: `lat lon ident region`.
//! - `earth_nav.dat` - typed navaid rows:
//!   `code lat lon elev freq range var ident region airport name...`.
//! - `airways.txt` - `AWY,` tagged rows staged for the airway resolver.
//! - `procedures.txt` - `APPCH,`/`SID,`/`STAR,` tagged leg rows fed to
//!   the shared procedure writer.
//!
//! Malformed lines are skipped with a warning carrying the file and
//! line number; a non-empty file where nothing parses is an error, an
//! empty or absent file compiles to zero rows successfully.

mod airport;
mod nav;
mod route;

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::magdec::MagDecReader;
use crate::util::AirportIndex;

/// Errors of the text source adapter.
#[derive(Debug, thiserror::Error)]
pub enum TextSourceError {
    #[error("source directory missing: {0}")]
    DirectoryMissing(PathBuf),

    #[error("I/O error reading \"{file}\": {source}")]
    Io {
        file: PathBuf,
        source: std::io::Error,
    },

    #[error("no records could be parsed from \"{0}\"")]
    NoRecords(PathBuf),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

/// Counters of one text compile.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextSourceStats {
    pub airports: usize,
    pub runways: usize,
    pub waypoints: usize,
    pub navaids: usize,
    pub airway_points: usize,
    pub procedure_legs: usize,
}

/// Compiles the text files under one base directory.
pub struct TextCompiler<'c> {
    conn: &'c Connection,
    magdec: &'c MagDecReader,
    airport_index: AirportIndex,
    stats: TextSourceStats,
}

impl<'c> TextCompiler<'c> {
    pub fn new(conn: &'c Connection, magdec: &'c MagDecReader) -> Self {
        Self {
            conn,
            magdec,
            airport_index: AirportIndex::new(),
            stats: TextSourceStats::default(),
        }
    }

    pub fn stats(&self) -> TextSourceStats {
        self.stats
    }

    pub fn airport_index(&self) -> &AirportIndex {
        &self.airport_index
    }

    /// Compiles every known file present under the base directory.
    ///
    /// Airports must load before navaids and procedures so airport
    /// references resolve.
    pub fn compile(&mut self, base_path: &Path) -> Result<(), TextSourceError> {
        if !base_path.is_dir() {
            return Err(TextSourceError::DirectoryMissing(base_path.to_path_buf()));
        }

        self.compile_airports(&base_path.join("airports.dat"))?;
        self.compile_fixes(&base_path.join("earth_fix.dat"))?;
        self.compile_navs(&base_path.join("earth_nav.dat"))?;
        self.compile_airways(&base_path.join("airways.txt"))?;
        self.compile_procedures(&base_path.join("procedures.txt"))?;
        Ok(())
    }

    pub fn compile_airports(&mut self, path: &Path) -> Result<(), TextSourceError> {
        airport::compile(self, path)
    }

    pub fn compile_fixes(&mut self, path: &Path) -> Result<(), TextSourceError> {
        nav::compile_fixes(self, path)
    }

    pub fn compile_navs(&mut self, path: &Path) -> Result<(), TextSourceError> {
        nav::compile_navs(self, path)
    }

    pub fn compile_airways(&mut self, path: &Path) -> Result<(), TextSourceError> {
        route::compile_airways(self, path)
    }

    pub fn compile_procedures(&mut self, path: &Path) -> Result<(), TextSourceError> {
        route::compile_procedures(self, path)
    }

    pub(crate) fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub(crate) fn magdec(&self) -> &'c MagDecReader {
        self.magdec
    }

    pub(crate) fn index_mut(&mut self) -> &mut AirportIndex {
        &mut self.airport_index
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TextSourceStats {
        &mut self.stats
    }
}

/// Opens a source file for line reading; `Ok(None)` when absent.
pub(crate) fn open_lines(
    path: &Path,
) -> Result<Option<std::io::BufReader<std::fs::File>>, TextSourceError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = std::fs::File::open(path).map_err(|source| TextSourceError::Io {
        file: path.to_path_buf(),
        source,
    })?;
    Ok(Some(std::io::BufReader::new(file)))
}
