use crate::error::{AppError, Result};
use crate::platform::normalize_app_id;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

const MAX_CATEGORY_LEN: usize = 64;

/// User-assigned category for an app. The `productive` flag overrides the built-in
/// patterns when scoring productivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppCategory {
    pub app_id: String,
    pub category: String,
    pub productive: bool,
}

impl AppCategory {
    pub fn new(app_id: &str, category: &str, productive: bool) -> Result<Self> {
        let app_id = normalize_app_id(app_id);
        if app_id.is_empty() {
            return Err(AppError::InvalidInput {
                field: "app",
                reason: "must not be empty".into(),
            });
        }
        let category = category.trim();
        if category.is_empty() || category.len() > MAX_CATEGORY_LEN {
            return Err(AppError::InvalidInput {
                field: "category",
                reason: format!("must be 1 to {MAX_CATEGORY_LEN} characters"),
            });
        }
        Ok(Self {
            app_id,
            category: category.to_string(),
            productive,
        })
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            app_id: row.get(0)?,
            category: row.get(1)?,
            productive: row.get::<_, i32>(2)? != 0,
        })
    }

    /// Insert or replace the category for this app.
    pub fn save(&self, conn: &Connection, now: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO app_categories (app_id, category, productive, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(app_id) DO UPDATE SET
                category = excluded.category,
                productive = excluded.productive,
                updated_at = excluded.updated_at",
            params![self.app_id, self.category, i32::from(self.productive), now],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, app_id: &str) -> Result<Option<Self>> {
        Ok(conn
            .query_row(
                "SELECT app_id, category, productive FROM app_categories WHERE app_id = ?1",
                params![normalize_app_id(app_id)],
                Self::from_row,
            )
            .optional()?)
    }

    pub fn find_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt =
            conn.prepare("SELECT app_id, category, productive FROM app_categories ORDER BY app_id")?;
        let rows = stmt.query_map([], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Returns whether a row was removed.
    pub fn delete(conn: &Connection, app_id: &str) -> Result<bool> {
        let removed = conn.execute(
            "DELETE FROM app_categories WHERE app_id = ?1",
            params![normalize_app_id(app_id)],
        )?;
        Ok(removed > 0)
    }
}
