use crate::error::{AppError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// A closed span of foreground time for one app. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageInterval {
    pub id: Option<i64>,
    pub app_id: String,
    pub window_title: Option<String>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub idle: bool,
}

impl UsageInterval {
    pub fn new(
        app_id: &str,
        window_title: Option<&str>,
        start_ts: i64,
        end_ts: i64,
        idle: bool,
    ) -> Self {
        Self {
            id: None,
            app_id: app_id.to_string(),
            window_title: window_title.map(ToString::to_string),
            start_ts,
            end_ts,
            idle,
        }
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_ts - self.start_ts
    }

    /// Seconds of this interval that fall inside `[start, end)`.
    pub fn clipped_secs(&self, start: i64, end: i64) -> i64 {
        (self.end_ts.min(end) - self.start_ts.max(start)).max(0)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            app_id: row.get(1)?,
            window_title: row.get(2)?,
            start_ts: row.get(3)?,
            end_ts: row.get(4)?,
            idle: row.get::<_, i32>(5)? != 0,
        })
    }

    /// Persist a closed interval.
    ///
    /// Rejected with [`AppError::Integrity`] when it is degenerate, overlaps an
    /// existing interval of the same app, or ends before one that is already stored.
    pub fn insert(&mut self, conn: &Connection) -> Result<()> {
        if self.end_ts <= self.start_ts {
            return Err(self.integrity("end must be after start".to_string()));
        }

        let overlap: Option<(i64, i64, i64)> = conn
            .query_row(
                "SELECT id, start_ts, end_ts FROM usage_intervals
                 WHERE app_id = ?1 AND start_ts < ?3 AND end_ts > ?2
                 LIMIT 1",
                params![self.app_id, self.start_ts, self.end_ts],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        if let Some((id, start, end)) = overlap {
            return Err(self.integrity(format!("overlaps interval {id} [{start}, {end})")));
        }

        let latest_start: Option<i64> = conn.query_row(
            "SELECT MAX(start_ts) FROM usage_intervals WHERE app_id = ?1",
            params![self.app_id],
            |row| row.get(0),
        )?;
        if let Some(latest) = latest_start.filter(|latest| *latest >= self.end_ts) {
            return Err(self.integrity(format!(
                "out of order: an interval starting at {latest} is already stored"
            )));
        }

        conn.execute(
            "INSERT INTO usage_intervals (app_id, window_title, start_ts, end_ts, idle)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.app_id,
                self.window_title,
                self.start_ts,
                self.end_ts,
                i32::from(self.idle),
            ],
        )?;
        self.id = Some(conn.last_insert_rowid());
        Ok(())
    }

    fn integrity(&self, reason: String) -> AppError {
        AppError::Integrity {
            app_id: self.app_id.clone(),
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            reason,
        }
    }

    /// Delete intervals that ended before `cutoff`. Returns the number removed.
    pub fn delete_ended_before(conn: &Connection, cutoff: i64) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM usage_intervals WHERE end_ts < ?1",
            params![cutoff],
        )?)
    }
}

/// Persisted marker for the single interval currently held open by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInterval {
    pub app_id: String,
    pub window_title: Option<String>,
    pub start_ts: i64,
    pub last_seen: i64,
    pub idle: bool,
}

impl OpenInterval {
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO open_interval (slot, app_id, window_title, start_ts, last_seen, idle)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(slot) DO UPDATE SET
                app_id = excluded.app_id,
                window_title = excluded.window_title,
                start_ts = excluded.start_ts,
                last_seen = excluded.last_seen,
                idle = excluded.idle",
            params![
                self.app_id,
                self.window_title,
                self.start_ts,
                self.last_seen,
                i32::from(self.idle),
            ],
        )?;
        Ok(())
    }

    pub fn touch(conn: &Connection, last_seen: i64) -> Result<()> {
        conn.execute(
            "UPDATE open_interval SET last_seen = ?1 WHERE slot = 1",
            params![last_seen],
        )?;
        Ok(())
    }

    pub fn load(conn: &Connection) -> Result<Option<Self>> {
        let marker = conn
            .query_row(
                "SELECT app_id, window_title, start_ts, last_seen, idle
                 FROM open_interval WHERE slot = 1",
                [],
                |row| {
                    Ok(Self {
                        app_id: row.get(0)?,
                        window_title: row.get(1)?,
                        start_ts: row.get(2)?,
                        last_seen: row.get(3)?,
                        idle: row.get::<_, i32>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(marker)
    }

    pub fn clear(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM open_interval", [])?;
        Ok(())
    }
}
