//! Store query helpers and the generic tabular update primitive.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// True if a table exists in the main schema.
pub fn has_table(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "select count(1) from sqlite_master where type = 'table' and name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Number of rows in a table.
pub fn row_count(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("select count(1) from {table}"), [], |row| {
        row.get(0)
    })
}

/// Applies a row-wise transformation to selected columns of a table.
///
/// Selects `id_column` plus `select_columns` from every row, calls the
/// transform with the row (columns indexed after the id, starting at 1)
/// and, where it returns values, updates `update_columns` of that row.
/// Returns the number of updated rows.
///
/// This is the primitive behind the magnetic-variation, TACAN-channel and
/// ILS-geometry passes.
pub fn update_column_in_table<F>(
    conn: &Connection,
    table: &str,
    id_column: &str,
    select_columns: &[&str],
    update_columns: &[&str],
    mut transform: F,
) -> rusqlite::Result<usize>
where
    F: FnMut(&rusqlite::Row<'_>) -> Option<Vec<Value>>,
{
    let select_sql = format!(
        "select {id_column}, {} from {table}",
        select_columns.join(", ")
    );
    let update_sql = format!(
        "update {table} set {} where {id_column} = ?{}",
        update_columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", "),
        update_columns.len() + 1
    );

    // Materialize the update set first so the scan never observes its own
    // writes.
    let mut pending: Vec<(i64, Vec<Value>)> = Vec::new();
    {
        let mut stmt = conn.prepare(&select_sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if let Some(values) = transform(row) {
                debug_assert_eq!(values.len(), update_columns.len());
                pending.push((row.get(0)?, values));
            }
        }
    }

    let mut update = conn.prepare(&update_sql)?;
    let count = pending.len();
    for (id, mut values) in pending {
        values.push(Value::Integer(id));
        update.execute(params_from_iter(values))?;
    }
    Ok(count)
}

/// A source database attached under a logical name for the run.
///
/// Detached on [`detach`](Self::detach) or on drop, whichever comes
/// first.
pub struct AttachedSource<'c> {
    conn: &'c Connection,
    name: &'static str,
    attached: bool,
}

impl<'c> AttachedSource<'c> {
    /// Attaches `path` under the logical schema `name`.
    pub fn attach(
        conn: &'c Connection,
        path: &str,
        name: &'static str,
    ) -> rusqlite::Result<Self> {
        conn.execute(&format!("attach database ?1 as {name}"), [path])?;
        tracing::debug!(path, name, "Attached source database");
        Ok(Self {
            conn,
            name,
            attached: true,
        })
    }

    /// Logical schema name of the attached source.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Detaches the source explicitly.
    pub fn detach(mut self) -> rusqlite::Result<()> {
        self.attached = false;
        self.conn
            .execute(&format!("detach database {}", self.name), [])?;
        Ok(())
    }
}

impl Drop for AttachedSource<'_> {
    fn drop(&mut self) {
        if self.attached {
            if let Err(e) = self
                .conn
                .execute(&format!("detach database {}", self.name), [])
            {
                tracing::warn!(name = self.name, error = %e, "Failed to detach source database");
            }
        }
    }
}
