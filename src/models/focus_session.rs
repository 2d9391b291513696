use crate::error::{is_unique_violation, AppError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::InvalidInput {
                field: "status",
                reason: format!("unknown session status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FocusSession {
    pub id: Option<i64>,
    pub started_at: i64,
    pub planned_secs: i64,
    pub ended_at: Option<i64>,
    pub status: SessionStatus,
    pub blocked_apps: BTreeSet<String>,
}

const COLUMNS: &str = "id, started_at, planned_secs, ended_at, status, blocked_apps";

impl FocusSession {
    pub fn new(started_at: i64, planned_secs: i64, blocked_apps: BTreeSet<String>) -> Self {
        Self {
            id: None,
            started_at,
            planned_secs,
            ended_at: None,
            status: SessionStatus::Active,
            blocked_apps,
        }
    }

    pub fn planned_end(&self) -> i64 {
        self.started_at + self.planned_secs
    }

    pub fn elapsed_secs(&self, now: i64) -> i64 {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).max(0)
    }

    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.planned_end() - now).max(0)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now - self.started_at >= self.planned_secs
    }

    pub fn blocks(&self, app_id: &str) -> bool {
        self.blocked_apps.contains(app_id)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        let blocked: String = row.get(5)?;
        Ok(Self {
            id: Some(row.get(0)?),
            started_at: row.get(1)?,
            planned_secs: row.get(2)?,
            ended_at: row.get(3)?,
            status: status.parse().map_err(|e: AppError| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?,
            blocked_apps: serde_json::from_str(&blocked).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
        })
    }

    /// Insert the session. The store admits at most one `active` session; a second
    /// one fails with [`AppError::AlreadyActive`].
    pub fn save(&mut self, conn: &Connection) -> Result<()> {
        let blocked = serde_json::to_string(&self.blocked_apps)?;
        let inserted = conn.execute(
            "INSERT INTO focus_sessions (started_at, planned_secs, ended_at, status, blocked_apps)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.started_at,
                self.planned_secs,
                self.ended_at,
                self.status.as_str(),
                blocked,
            ],
        );

        match inserted {
            Ok(_) => {
                self.id = Some(conn.last_insert_rowid());
                Ok(())
            }
            Err(e) if is_unique_violation(&e) && self.status == SessionStatus::Active => {
                let session_id = Self::find_active(conn)?.and_then(|s| s.id).unwrap_or(0);
                Err(AppError::AlreadyActive { session_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_active(conn: &Connection) -> Result<Option<Self>> {
        let session = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM focus_sessions WHERE status = 'active' LIMIT 1"),
                [],
                Self::from_row,
            )
            .optional()?;
        Ok(session)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let session = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM focus_sessions WHERE id = ?1"),
                params![id],
                Self::from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions started at or after `since`, oldest first.
    pub fn find_since(conn: &Connection, since: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM focus_sessions WHERE started_at >= ?1 ORDER BY started_at, id"
        ))?;
        let rows = stmt.query_map(params![since], Self::from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Move an active session to a terminal status.
    /// Returns an error if the session has not been saved yet (id is None).
    pub fn finish(&mut self, conn: &Connection, status: SessionStatus, ended_at: i64) -> Result<()> {
        let id = self.id.ok_or(AppError::NotFound { entity: "Saved focus session" })?;
        if status == SessionStatus::Active {
            return Err(AppError::InvalidInput {
                field: "status",
                reason: "a session cannot finish as active".into(),
            });
        }

        conn.execute(
            "UPDATE focus_sessions SET ended_at = ?1, status = ?2 WHERE id = ?3 AND status = 'active'",
            params![ended_at, status.as_str(), id],
        )?;
        self.ended_at = Some(ended_at);
        self.status = status;
        Ok(())
    }

    pub fn update_planned(&mut self, conn: &Connection, planned_secs: i64) -> Result<()> {
        let id = self.id.ok_or(AppError::NotFound { entity: "Saved focus session" })?;
        conn.execute(
            "UPDATE focus_sessions SET planned_secs = ?1 WHERE id = ?2",
            params![planned_secs, id],
        )?;
        self.planned_secs = planned_secs;
        Ok(())
    }
}
