//! Output store management.
//!
//! The compiler writes into a single SQLite database. This module owns
//! the schema DDL ([`schema`]), the cross-reference and finalization
//! scripts ([`scripts`]), the generic tabular update primitive and query
//! helpers ([`util`]) and the run metadata table ([`meta`]).
//!
//! Script ordering is load-bearing: the deduplication script runs before
//! any pass assigns foreign-key ids, and the cross-reference scripts run
//! only after every adapter has finished loading. The orchestrator in
//! [`crate::compile`] encodes the full sequence.

pub mod meta;
pub mod schema;
pub mod scripts;
pub mod util;

pub use meta::DatabaseMeta;
pub use util::{has_table, row_count, update_column_in_table, AttachedSource};
