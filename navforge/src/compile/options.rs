//! Compilation options.

use std::path::PathBuf;

use crate::airway::{MAX_SEGMENT_LENGTH_TRUSTED_NM, MAX_SEGMENT_LENGTH_UNTRUSTED_NM};

/// Which source adapter a run uses.
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// Binary scenery archives listed by a scenery descriptor
    BglScenery {
        base_path: PathBuf,
        scenery_config: PathBuf,
    },
    /// An attached relational source database
    Dfd { source_db: PathBuf },
    /// Line-oriented text files under a base directory
    TextLine { base_path: PathBuf },
}

/// Airway segment length caps per source trust level.
///
/// Legacy binary sources are known to contain broken route geometry, so
/// they get the tight cap; trusted sources get the wide one.
#[derive(Debug, Clone, Copy)]
pub struct AirwayLengthPolicy {
    pub untrusted_nm: f64,
    pub trusted_nm: f64,
}

impl Default for AirwayLengthPolicy {
    fn default() -> Self {
        Self {
            untrusted_nm: MAX_SEGMENT_LENGTH_UNTRUSTED_NM,
            trusted_nm: MAX_SEGMENT_LENGTH_TRUSTED_NM,
        }
    }
}

/// All knobs of one compilation run.
#[derive(Debug, Clone)]
pub struct NavCompileOptions {
    pub source: SourceKind,

    /// Magnetic declination grid file; a zero-declination model is used
    /// when absent
    pub magdec_path: Option<PathBuf>,

    /// Delete duplicates across overlapping source areas
    pub deduplicate: bool,
    /// Connect staged airway points into airway segments
    pub resolve_airways: bool,
    /// Populate the flight-plan routing network tables
    pub create_route_tables: bool,
    /// Compare table row counts against declared minimums
    pub basic_validation: bool,
    /// Tables checked by basic validation: (table, minimum rows)
    pub basic_validation_tables: Vec<(String, i64)>,
    /// Fail the whole run on the first file error
    pub strict: bool,
    pub vacuum: bool,
    pub analyze: bool,

    pub airway_lengths: AirwayLengthPolicy,
}

impl NavCompileOptions {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            magdec_path: None,
            deduplicate: true,
            resolve_airways: true,
            create_route_tables: false,
            basic_validation: false,
            basic_validation_tables: vec![("airport".to_string(), 1)],
            strict: false,
            vacuum: false,
            analyze: true,
            airway_lengths: AirwayLengthPolicy::default(),
        }
    }

    /// Length cap for the current source kind.
    pub fn airway_max_length_nm(&self) -> f64 {
        match self.source {
            SourceKind::BglScenery { .. } => self.airway_lengths.untrusted_nm,
            _ => self.airway_lengths.trusted_nm,
        }
    }
}
