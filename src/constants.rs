pub const SECS_PER_DAY: i64 = 86_400;

/// Sentinel app identifier used when the foreground app cannot be determined.
pub const UNKNOWN_APP: &str = "unknown";

/// Consecutive signal failures before the sampler reports [`UNKNOWN_APP`].
pub const MAX_SIGNAL_FAILURES: u32 = 3;

/// Minimum gap between two samples that is treated as suspend/downtime.
pub const SUSPEND_GAP_SECS: i64 = 300;

/// Attempts to persist a closed interval while the store is unavailable.
pub const MAX_WRITE_RETRIES: u32 = 5;

/// How often the daemon re-reads settings from the store.
pub const SETTINGS_RELOAD_SECS: u64 = 60;

/// Cadence of the focus controller task.
pub const FOCUS_TICK_SECS: u64 = 1;

/// How often reminders re-check the daily goal.
pub const GOAL_CHECK_SECS: i64 = 60;

/// Maximum focus session length in minutes (24 hours).
pub const MAX_FOCUS_MINUTES: i64 = 24 * 60;

/// Shutdown budgets, in milliseconds.
pub const SHUTDOWN_TRACKER_MS: u64 = 3000;
pub const SHUTDOWN_FOCUS_MS: u64 = 2000;
pub const SHUTDOWN_FLUSH_MS: u64 = 2000;
pub const SHUTDOWN_HARD_CUTOFF_MS: u64 = 10_000;

/// Rows fetched per page by lazy interval queries.
pub const QUERY_PAGE_SIZE: usize = 256;
