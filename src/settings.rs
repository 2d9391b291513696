use crate::error::{AppError, Result};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Every recognised configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    IdleThreshold,
    DailyGoalMinutes,
    EnableNotifications,
    Theme,
    TrackWindowTitles,
    MaxGapSeconds,
    PollInterval,
    BreakReminderInterval,
    RetentionDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Seconds { min: i64, max: i64 },
    Minutes { min: i64, max: i64 },
    Days { min: i64, max: i64 },
    Bool,
    Enum(&'static [&'static str]),
}

pub const THEMES: &[&str] = &["system", "light", "dark"];

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        Self::IdleThreshold,
        Self::DailyGoalMinutes,
        Self::EnableNotifications,
        Self::Theme,
        Self::TrackWindowTitles,
        Self::MaxGapSeconds,
        Self::PollInterval,
        Self::BreakReminderInterval,
        Self::RetentionDays,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdleThreshold => "idle_threshold",
            Self::DailyGoalMinutes => "daily_goal_minutes",
            Self::EnableNotifications => "enable_notifications",
            Self::Theme => "theme",
            Self::TrackWindowTitles => "track_window_titles",
            Self::MaxGapSeconds => "max_gap_seconds",
            Self::PollInterval => "poll_interval",
            Self::BreakReminderInterval => "break_reminder_interval",
            Self::RetentionDays => "retention_days",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Self::IdleThreshold => ValueKind::Seconds { min: 10, max: 86_400 },
            Self::DailyGoalMinutes => ValueKind::Minutes { min: 0, max: 1440 },
            Self::EnableNotifications | Self::TrackWindowTitles => ValueKind::Bool,
            Self::Theme => ValueKind::Enum(THEMES),
            Self::MaxGapSeconds => ValueKind::Seconds { min: 0, max: 86_400 },
            Self::PollInterval => ValueKind::Seconds { min: 1, max: 60 },
            Self::BreakReminderInterval => ValueKind::Seconds { min: 0, max: 86_400 },
            Self::RetentionDays => ValueKind::Days { min: 0, max: 36_500 },
        }
    }

    pub fn default_value(self) -> ConfigValue {
        match self {
            Self::IdleThreshold => ConfigValue::Int(300),
            Self::DailyGoalMinutes => ConfigValue::Int(480),
            Self::EnableNotifications | Self::TrackWindowTitles => ConfigValue::Bool(true),
            Self::Theme => ConfigValue::Text("system".into()),
            Self::MaxGapSeconds | Self::BreakReminderInterval => ConfigValue::Int(3600),
            Self::PollInterval => ConfigValue::Int(5),
            Self::RetentionDays => ConfigValue::Int(90),
        }
    }

    /// Parse and range-check a raw value for this key.
    pub fn parse_value(self, raw: &str) -> Result<ConfigValue> {
        let invalid = |reason: String| AppError::InvalidInput {
            field: "value",
            reason: format!("{}: {reason}", self.as_str()),
        };
        let raw = raw.trim();

        match self.kind() {
            ValueKind::Seconds { min, max }
            | ValueKind::Minutes { min, max }
            | ValueKind::Days { min, max } => {
                let n: i64 = raw
                    .parse()
                    .map_err(|_| invalid(format!("'{raw}' is not an integer")))?;
                if !(min..=max).contains(&n) {
                    return Err(invalid(format!("must be between {min} and {max}")));
                }
                Ok(ConfigValue::Int(n))
            }
            ValueKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(ConfigValue::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(ConfigValue::Bool(false)),
                _ => Err(invalid(format!("'{raw}' is not a boolean"))),
            },
            ValueKind::Enum(choices) => {
                let lowered = raw.to_ascii_lowercase();
                if choices.contains(&lowered.as_str()) {
                    Ok(ConfigValue::Text(lowered))
                } else {
                    Err(invalid(format!("expected one of {}", choices.join(", "))))
                }
            }
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| AppError::InvalidInput {
                field: "key",
                reason: format!("unknown setting '{s}'"),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl ConfigValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Read a setting, falling back to its default when absent or unparsable.
pub fn get(conn: &Connection, key: ConfigKey) -> Result<ConfigValue> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match raw {
        None => key.default_value(),
        Some(raw) => key.parse_value(&raw).unwrap_or_else(|e| {
            warn!("Ignoring stored value for {key}: {e}");
            key.default_value()
        }),
    })
}

/// Untyped lookup by raw key name. Absent and unrecognised keys yield `default`.
pub fn get_raw(conn: &Connection, key: &str, default: &str) -> Result<String> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.unwrap_or_else(|| default.to_string()))
}

/// Validate and store a setting. Returns the normalised value.
pub fn set(conn: &Connection, key: ConfigKey, raw: &str, now: i64) -> Result<ConfigValue> {
    let value = key.parse_value(raw)?;
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key.as_str(), value.to_string(), now],
    )?;
    Ok(value)
}

pub fn list(conn: &Connection) -> Result<Vec<(ConfigKey, ConfigValue)>> {
    ConfigKey::ALL
        .into_iter()
        .map(|key| get(conn, key).map(|value| (key, value)))
        .collect()
}

/// Typed snapshot of the settings the daemon consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub idle_threshold_secs: u64,
    pub daily_goal_minutes: i64,
    pub enable_notifications: bool,
    pub track_window_titles: bool,
    pub max_gap_secs: i64,
    pub poll_interval_secs: u64,
    pub break_reminder_secs: i64,
    pub retention_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 300,
            daily_goal_minutes: 480,
            enable_notifications: true,
            track_window_titles: true,
            max_gap_secs: 3600,
            poll_interval_secs: 5,
            break_reminder_secs: 3600,
            retention_days: 90,
        }
    }
}

impl Settings {
    pub fn load(conn: &Connection) -> Result<Self> {
        let int = |key: ConfigKey| -> Result<i64> {
            Ok(get(conn, key)?.as_int().unwrap_or_default())
        };
        let flag = |key: ConfigKey| -> Result<bool> {
            Ok(get(conn, key)?.as_bool().unwrap_or_default())
        };

        Ok(Self {
            idle_threshold_secs: u64::try_from(int(ConfigKey::IdleThreshold)?).unwrap_or(300),
            daily_goal_minutes: int(ConfigKey::DailyGoalMinutes)?,
            enable_notifications: flag(ConfigKey::EnableNotifications)?,
            track_window_titles: flag(ConfigKey::TrackWindowTitles)?,
            max_gap_secs: int(ConfigKey::MaxGapSeconds)?,
            poll_interval_secs: u64::try_from(int(ConfigKey::PollInterval)?).unwrap_or(5),
            break_reminder_secs: int(ConfigKey::BreakReminderInterval)?,
            retention_days: int(ConfigKey::RetentionDays)?,
        })
    }
}
