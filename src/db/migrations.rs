use super::schema::{SCHEMA, SCHEMA_VERSION};
use crate::error::{AppError, Result};
use log::info;
use rusqlite::Connection;

pub fn run(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(AppError::InvalidInput {
            field: "schema_version",
            reason: format!(
                "database was written by a newer version (v{version}, supported v{SCHEMA_VERSION})"
            ),
        });
    }

    conn.execute_batch(SCHEMA)?;

    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        info!("Migrated store schema from v{version} to v{SCHEMA_VERSION}");
    }
    Ok(())
}
