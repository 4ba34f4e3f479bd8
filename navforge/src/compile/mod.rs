//! Compilation pipeline orchestration.
//!
//! [`NavDatabase`] drives a full compile: schema creation, metadata,
//! loading through the adapter selected by
//! [`SourceKind`], the post-load index wave, deduplication, airway
//! resolution, derived-value passes, the cross-reference scripts, the
//! optional routing network, the final index wave and validation /
//! vacuum / analyze.
//!
//! Every phase commits before the next begins; cancellation is checked
//! at phase boundaries and rolls back the phase in flight. Progress is a
//! synchronous callback whose only observable effect is the
//! continue-or-abort decision; the core never reads progress state back.

mod navdatabase;
mod options;
mod progress;

pub use navdatabase::NavDatabase;
pub use options::{AirwayLengthPolicy, NavCompileOptions, SourceKind};
pub use progress::{ContinueOrAbort, ProgressCallback, ProgressHandler};

use std::path::PathBuf;

/// Result flags of a compilation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResultFlags {
    /// The run was cancelled and rolled back
    pub aborted: bool,
    /// A table fell below its declared minimum row count
    pub basic_validation_error: bool,
    /// A third-party navdata package was detected (informational)
    pub navigraph_found: bool,
}

impl ResultFlags {
    pub fn is_ok(&self) -> bool {
        !self.aborted && !self.basic_validation_error
    }
}

/// Errors that stop a compilation run.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Scenery(#[from] crate::scenery::SceneryConfigError),

    #[error(transparent)]
    MagDec(#[from] crate::magdec::MagDecError),

    #[error(transparent)]
    Bgl(#[from] crate::bgl::BglError),

    #[error(transparent)]
    Text(#[from] crate::textsource::TextSourceError),

    #[error("source database not found: {0}")]
    SourceNotFound(PathBuf),
}

/// Non-fatal per-file errors collected per scenery area.
#[derive(Debug, Default)]
pub struct SceneryErrors {
    pub areas: Vec<SceneryAreaErrors>,
}

/// Errors of one scenery area.
#[derive(Debug)]
pub struct SceneryAreaErrors {
    pub scenery_area: String,
    pub file_errors: Vec<crate::bgl::FileError>,
}

impl SceneryErrors {
    pub fn total_errors(&self) -> usize {
        self.areas.iter().map(|a| a.file_errors.len()).sum()
    }
}
