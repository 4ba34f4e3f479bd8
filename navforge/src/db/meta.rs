//! Run metadata table.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{has_table, row_count};

/// Schema version written into every compiled database.
pub const DB_VERSION_MAJOR: i64 = 1;
pub const DB_VERSION_MINOR: i64 = 4;

/// Reads and writes the single-row `metadata` table.
///
/// The row records the schema version, the source kind, the AIRAC cycle
/// reported by the adapter, the compiler version string and the load
/// timestamp. Consumers use it to decide whether a database needs a
/// recompile.
#[derive(Debug, Default, Clone)]
pub struct DatabaseMeta {
    pub data_source: Option<String>,
    pub airac_cycle: Option<String>,
    pub valid_through: Option<String>,
    pub compiler_version: Option<String>,
}

impl DatabaseMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the metadata row if present.
    pub fn read(conn: &Connection) -> rusqlite::Result<Option<Self>> {
        if !has_table(conn, "metadata")? {
            return Ok(None);
        }
        conn.query_row(
            "select data_source, airac_cycle, valid_through, compiler_version
             from metadata limit 1",
            [],
            |row| {
                Ok(Self {
                    data_source: row.get(0)?,
                    airac_cycle: row.get(1)?,
                    valid_through: row.get(2)?,
                    compiler_version: row.get(3)?,
                })
            },
        )
        .optional()
    }

    pub fn set_data_source(&mut self, source: &str) {
        self.data_source = Some(source.to_string());
    }

    pub fn set_airac_cycle(&mut self, cycle: Option<String>, valid_through: Option<String>) {
        self.airac_cycle = cycle;
        self.valid_through = valid_through;
    }

    pub fn set_compiler_version(&mut self, version: &str) {
        self.compiler_version = Some(version.to_string());
    }

    /// Replaces the metadata row with the current state and timestamp.
    pub fn update_all(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute("delete from metadata", [])?;
        conn.execute(
            "insert into metadata (db_version_major, db_version_minor, compiler_version,
                                   data_source, airac_cycle, valid_through, last_load_timestamp)
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                DB_VERSION_MAJOR,
                DB_VERSION_MINOR,
                self.compiler_version,
                self.data_source,
                self.airac_cycle,
                self.valid_through,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// True if the database carries both schema and airport data.
    pub fn has_data(conn: &Connection) -> rusqlite::Result<bool> {
        Ok(has_table(conn, "airport")? && row_count(conn, "airport")? > 0)
    }
}
