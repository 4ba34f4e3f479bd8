//! Relational source adapter.
//!
//! Reads a sibling navigation database attached under the logical name
//! `src` and transcodes its tables into the output schema. Every ingest
//! function is a streaming cursor ordered by a composite key; procedure
//! rows additionally run through the shared [`crate::proc`] writer with
//! per-airport boundary detection.
//!
//! This adapter is trusted, so it writes the final tables directly and
//! performs the derived-value passes (magnetic variation, TACAN
//! channels, ILS geometry) itself; the binary and text adapters do the
//! equivalent work during load.
//!
//! The source spells one column `recommanded_navaid`. That spelling is
//! preserved in the SQL text here and nowhere else.

mod compiler;

pub use compiler::{DfdCompiler, DfdStats};

/// Logical schema name the source database is attached under.
pub const SOURCE_SCHEMA: &str = "src";

/// Scenery area and file ids used for all rows of a relational compile.
pub const SCENERY_ID: i64 = 1;
pub const FILE_ID: i64 = 1;
