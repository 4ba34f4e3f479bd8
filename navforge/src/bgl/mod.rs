//! Binary scenery archive adapter.
//!
//! Scenery archives are sequences of tagged framed records (16-bit tag,
//! 32-bit length). An airport record encloses its facility records:
//! runways, COM frequencies and approaches, with approaches in turn
//! enclosing leg, missed-approach-leg and transition records.
//!
//! Four generations of the approach-leg layout coexist: the legacy
//! layout and three successive modern revisions that appended fields.
//! All of them decode into the same logical [`approach::ApproachLeg`];
//! dispatch happens on the record tag, never by probing fields.
//!
//! Unknown record tags are skipped: in modern-era archives the format is
//! known to evolve, so they are logged at debug level only, while in
//! legacy archives they warrant a warning.
//!
//! The adapter writes staging rows only; foreign keys stay unresolved
//! until the cross-reference passes run, so all source adapters are
//! treated uniformly downstream.

pub mod airport;
pub mod approach;
pub mod converter;
#[cfg(test)]
pub(crate) mod testdata;
mod writer;

pub use writer::{BglWriter, BglWriterStats, FileError};

/// Record type tags.
pub mod rec {
    pub const FILE_HEADER: u16 = 0x0001;
    pub const AIRPORT: u16 = 0x003c;
    pub const RUNWAY: u16 = 0x0004;
    pub const COM: u16 = 0x0012;
    pub const APPROACH: u16 = 0x0024;
    /// Modern approach header with four extra reserved bytes
    pub const APPROACH_NEW: u16 = 0x0025;

    pub const LEGS: u16 = 0x002d;
    pub const MISSED_LEGS: u16 = 0x002e;
    pub const TRANSITION: u16 = 0x002c;
    pub const TRANSITION_LEGS: u16 = 0x002f;

    pub const LEGS_MSFS: u16 = 0x0030;
    pub const MISSED_LEGS_MSFS: u16 = 0x0031;
    pub const TRANSITION_MSFS: u16 = 0x0032;
    pub const LEGS_MSFS_116: u16 = 0x0033;
    pub const MISSED_LEGS_MSFS_116: u16 = 0x0034;
    pub const LEGS_MSFS_118: u16 = 0x0035;
    pub const MISSED_LEGS_MSFS_118: u16 = 0x0036;
    pub const TRANSITION_MSFS_116: u16 = 0x0037;
}

/// File format versions found in the file header record.
///
/// Anything at or above [`FORMAT_VERSION_MODERN`] is a modern-era
/// archive with the evolving record set.
pub const FORMAT_VERSION_LEGACY: u16 = 0x0200;
pub const FORMAT_VERSION_MODERN: u16 = 0x0300;

/// Errors from the binary scenery adapter.
#[derive(Debug, thiserror::Error)]
pub enum BglError {
    #[error("{0}")]
    Read(#[from] crate::io::ReadError),

    #[error("archive \"{file}\" has no file header record")]
    MissingFileHeader { file: String },

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}
