/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 2;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage_intervals (
    id INTEGER PRIMARY KEY,
    app_id TEXT NOT NULL,
    window_title TEXT,
    start_ts INTEGER NOT NULL,
    end_ts INTEGER NOT NULL,
    idle INTEGER NOT NULL DEFAULT 0,
    CHECK (end_ts > start_ts)
);

CREATE TABLE IF NOT EXISTS open_interval (
    slot INTEGER PRIMARY KEY CHECK (slot = 1),
    app_id TEXT NOT NULL,
    window_title TEXT,
    start_ts INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    idle INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS focus_sessions (
    id INTEGER PRIMARY KEY,
    started_at INTEGER NOT NULL,
    planned_secs INTEGER NOT NULL,
    ended_at INTEGER,
    status TEXT NOT NULL CHECK (status IN ('active', 'completed', 'cancelled')),
    blocked_apps TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS app_categories (
    app_id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    productive INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_intervals_start ON usage_intervals(start_ts, id);
CREATE INDEX IF NOT EXISTS idx_intervals_app_start ON usage_intervals(app_id, start_ts);
CREATE INDEX IF NOT EXISTS idx_focus_sessions_started ON focus_sessions(started_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_focus_sessions_single_active
    ON focus_sessions(status) WHERE status = 'active';
"#;
