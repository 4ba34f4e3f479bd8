//! World magnetic declination model.
//!
//! The compiler does not evaluate spherical-harmonic coefficients at run
//! time; it loads a precomputed declination grid once per run and answers
//! point lookups from it. Every positional record written by the magnetic
//! variation pass carries the value returned here.
//!
//! The grid file is little-endian: a magic word, the column and row
//! counts, then `cols * rows` f32 declination values in degrees (east
//! positive), row-major starting at the south pole and the anti-meridian.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rusqlite::{params, Connection};

use crate::geo::Pos;
use crate::io::{BinaryReader, ReadError};

/// Leading magic word of a declination grid file.
const MAGDEC_MAGIC: u32 = 0x4744_414d; // "MADG"

/// Errors from loading a declination grid.
#[derive(Debug, thiserror::Error)]
pub enum MagDecError {
    #[error("declination grid not found: {0}")]
    NotFound(String),

    #[error("not a declination grid file (bad magic word 0x{0:08x})")]
    BadMagic(u32),

    #[error("declination grid has impossible dimensions {cols}x{rows}")]
    BadDimensions { cols: u32, rows: u32 },

    #[error("failed to read declination grid: {0}")]
    Read(#[from] ReadError),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

/// Loaded magnetic declination grid.
///
/// Loaded once and pinned for the compilation run.
#[derive(Debug, Clone)]
pub struct MagDecReader {
    cols: u32,
    rows: u32,
    values: Vec<f32>,
}

impl MagDecReader {
    /// Reads a grid from a file on disk.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MagDecError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MagDecError::NotFound(path.display().to_string()));
        }
        let file = File::open(path).map_err(ReadError::Io)?;
        Self::read(BinaryReader::new(BufReader::new(file))?)
    }

    /// Reads a grid from an open binary stream.
    pub fn read<R: std::io::Read + std::io::Seek>(
        mut reader: BinaryReader<R>,
    ) -> Result<Self, MagDecError> {
        let magic = reader.read_u32()?;
        if magic != MAGDEC_MAGIC {
            return Err(MagDecError::BadMagic(magic));
        }

        let cols = reader.read_u32()?;
        let rows = reader.read_u32()?;
        if cols == 0 || rows < 2 || cols > 3600 || rows > 1801 {
            return Err(MagDecError::BadDimensions { cols, rows });
        }

        let mut values = Vec::with_capacity((cols * rows) as usize);
        for _ in 0..cols * rows {
            values.push(reader.read_f32()?);
        }

        tracing::info!(cols, rows, "Loaded magnetic declination grid");
        Ok(Self { cols, rows, values })
    }

    /// A single-value grid, used by tests and as a last-resort fallback.
    pub fn from_uniform(declination: f32) -> Self {
        Self {
            cols: 1,
            rows: 2,
            values: vec![declination; 2],
        }
    }

    /// Magnetic declination in degrees at a position, east positive.
    ///
    /// Uses the nearest grid cell; longitude wraps, latitude clamps.
    pub fn mag_var(&self, pos: &Pos) -> f64 {
        let pos = pos.normalize();

        let lon_step = 360.0 / self.cols as f64;
        let lat_step = 180.0 / (self.rows - 1) as f64;

        let col = (((pos.lonx + 180.0) / lon_step).round() as i64).rem_euclid(self.cols as i64);
        let row = (((pos.laty + 90.0) / lat_step).round() as i64).clamp(0, self.rows as i64 - 1);

        f64::from(self.values[(row * self.cols as i64 + col) as usize])
    }

    /// Persists the grid into the `magdecl` metadata table.
    ///
    /// The table holds a single row; re-running a compile replaces it.
    pub fn write_to_table(&self, conn: &Connection) -> Result<(), MagDecError> {
        let mut blob = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            blob.extend_from_slice(&v.to_le_bytes());
        }

        conn.execute("delete from magdecl", [])?;
        conn.execute(
            "insert into magdecl (magdecl_id, num_cols, num_rows, grid) values (1, ?1, ?2, ?3)",
            params![self.cols, self.rows, blob],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn grid_bytes(cols: u32, rows: u32, values: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGDEC_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&cols.to_le_bytes());
        bytes.extend_from_slice(&rows.to_le_bytes());
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_uniform_grid() {
        let magdec = MagDecReader::from_uniform(-2.5);
        assert_eq!(magdec.mag_var(&Pos::new(8.5, 47.4)), -2.5);
        assert_eq!(magdec.mag_var(&Pos::new(-122.3, 47.4)), -2.5);
    }

    #[test]
    fn test_read_and_lookup() {
        // 4x3 grid: rows at -90, 0, 90; columns at -180, -90, 0, 90.
        #[rustfmt::skip]
        let values = [
            0.0, 0.0, 0.0, 0.0,
            1.0, 2.0, 3.0, 4.0,
            9.0, 9.0, 9.0, 9.0,
        ];
        let bytes = grid_bytes(4, 3, &values);
        let magdec = MagDecReader::read(BinaryReader::new(Cursor::new(bytes)).unwrap()).unwrap();

        // Equator lookups hit the middle row
        assert_eq!(magdec.mag_var(&Pos::new(-180.0, 0.0)), 1.0);
        assert_eq!(magdec.mag_var(&Pos::new(-90.0, 0.0)), 2.0);
        assert_eq!(magdec.mag_var(&Pos::new(0.0, 0.0)), 3.0);
        assert_eq!(magdec.mag_var(&Pos::new(90.0, 0.0)), 4.0);
        // Longitude wrap: +180 is the same column as -180
        assert_eq!(magdec.mag_var(&Pos::new(180.0, 0.0)), 1.0);
        // Poles clamp to the outer rows
        assert_eq!(magdec.mag_var(&Pos::new(0.0, 90.0)), 9.0);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = grid_bytes(1, 2, &[0.0, 0.0]);
        bytes[0] = 0xff;
        let result = MagDecReader::read(BinaryReader::new(Cursor::new(bytes)).unwrap());
        assert!(matches!(result, Err(MagDecError::BadMagic(_))));
    }

    #[test]
    fn test_truncated_grid() {
        let mut bytes = grid_bytes(4, 3, &[0.0; 12]);
        bytes.truncate(bytes.len() - 6);
        let result = MagDecReader::read(BinaryReader::new(Cursor::new(bytes)).unwrap());
        assert!(matches!(result, Err(MagDecError::Read(_))));
    }
}
