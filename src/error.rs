use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// The window signal source could not be reached or timed out.
    #[error("Window signal unavailable: {reason}")]
    TransientSignal { reason: String },

    /// A write would overlap or reorder persisted intervals.
    #[error("Integrity violation for '{app_id}' [{start_ts}, {end_ts}): {reason}")]
    Integrity {
        app_id: String,
        start_ts: i64,
        end_ts: i64,
        reason: String,
    },

    #[error("A focus session is already active (session {session_id})")]
    AlreadyActive { session_id: i64 },

    #[error("Unknown preset '{name}'")]
    UnknownPreset { name: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] rusqlite::Error),

    #[error("Daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl AppError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        if is_unavailable(&e) {
            Self::StoreUnavailable(e)
        } else {
            Self::Database(e)
        }
    }
}

/// Check if a rusqlite error means the medium is busy or unreachable rather than the
/// statement being wrong.
pub fn is_unavailable(e: &rusqlite::Error) -> bool {
    use rusqlite::ffi::ErrorCode;

    matches!(e, rusqlite::Error::SqliteFailure(err, _) if matches!(
        err.code,
        ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull
            | ErrorCode::ReadOnly
            | ErrorCode::NotADatabase
    ))
}

/// Check if a rusqlite error is a UNIQUE constraint violation
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.code == rusqlite::ffi::ErrorCode::ConstraintViolation)
}
