//! NavForge - Navigation data compiler for flight simulators
//!
//! This library ingests heterogeneous aeronautical source datasets and
//! produces a single normalized relational navigation database (airports,
//! runways, navaids, airways, procedures, airspaces, ILS geometry).
//!
//! # High-Level API
//!
//! For most use cases, the [`compile`] module provides the entry point:
//!
//! ```ignore
//! use navforge::compile::{NavCompileOptions, NavDatabase, SourceKind};
//!
//! let mut options = NavCompileOptions::new(SourceKind::TextLine {
//!     base_path: "/data/navsource".into(),
//! });
//! options.basic_validation = true;
//!
//! let mut conn = rusqlite::Connection::open("navdata.sqlite")?;
//! let result = NavDatabase::new(&options).create(&mut conn)?;
//! ```
//!
//! Three source adapters feed the same output schema: [`bgl`] walks
//! proprietary binary scenery archives, [`dfd`] transcodes an attached
//! relational source database and [`textsource`] compiles line-oriented
//! text files. The [`compile`] orchestrator sequences loading,
//! cross-reference and geometry passes over a shared SQLite store.

pub mod airway;
pub mod bgl;
pub mod compile;
pub mod db;
pub mod dfd;
pub mod geo;
pub mod ils;
pub mod io;
pub mod logging;
pub mod magdec;
pub mod metar;
pub mod proc;
pub mod runways;
pub mod scenery;
pub mod textsource;
pub mod util;

/// Version of the NavForge library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
