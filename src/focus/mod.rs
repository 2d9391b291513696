pub mod enforcer;
pub mod presets;

pub use enforcer::{Enforcer, LogEnforcer, ProcessEnforcer};

use crate::constants::MAX_FOCUS_MINUTES;
use crate::db::{Store, StoreReader};
use crate::error::{AppError, Result};
use crate::models::{FocusSession, SessionStatus};
use crate::stats::percent;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusState {
    Idle,
    Active(FocusSession),
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Running { blocked: Option<String> },
    Completed(FocusSession),
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusStatus {
    pub active: bool,
    pub session: Option<FocusSession>,
    pub elapsed_secs: i64,
    pub remaining_secs: i64,
    pub progress_percent: f64,
}

/// Session state machine. Holds the only in-memory copy of the active session
/// and re-reads the store before every operation, so sessions started or stopped
/// by another process are picked up on the next call.
pub struct FocusController {
    store: Arc<Store>,
    reader: StoreReader,
    enforcer: Box<dyn Enforcer>,
    state: FocusState,
}

impl FocusController {
    pub fn new(store: Arc<Store>, enforcer: Box<dyn Enforcer>) -> Result<Self> {
        let reader = store.reader()?;
        Ok(Self {
            store,
            reader,
            enforcer,
            state: FocusState::Idle,
        })
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn active(&self) -> Option<&FocusSession> {
        match &self.state {
            FocusState::Active(session) => Some(session),
            FocusState::Idle => None,
        }
    }

    /// Pick up the session left active by a previous process. One whose planned
    /// end already passed is completed at that planned end.
    pub fn restore(&mut self, now: i64) -> Result<Option<FocusSession>> {
        self.sync()?;
        let expired = self.active().filter(|s| s.is_expired(now)).map(FocusSession::planned_end);
        if let Some(planned_end) = expired {
            self.finish(SessionStatus::Completed, planned_end)?;
        } else if let Some(session) = self.active() {
            info!(
                "Resuming focus session {} ({}s remaining)",
                session.id.unwrap_or_default(),
                session.remaining_secs(now)
            );
        }
        Ok(self.active().cloned())
    }

    pub fn start(&mut self, duration_secs: i64, blocked_apps: BTreeSet<String>, now: i64) -> Result<FocusSession> {
        self.sync()?;
        if let Some(active) = self.active() {
            return Err(AppError::AlreadyActive {
                session_id: active.id.unwrap_or_default(),
            });
        }
        validate_duration(duration_secs)?;

        let mut session = FocusSession::new(now, duration_secs, blocked_apps);
        self.store.write(|tx| session.save(tx))?;
        info!(
            "Focus session {} started: {}s, blocking {:?}",
            session.id.unwrap_or_default(),
            duration_secs,
            session.blocked_apps
        );
        self.state = FocusState::Active(session.clone());
        Ok(session)
    }

    /// Cancel the active session. Does nothing when idle.
    pub fn stop(&mut self, now: i64) -> Result<Option<FocusSession>> {
        self.sync()?;
        if self.active().is_none() {
            return Ok(None);
        }
        self.finish(SessionStatus::Cancelled, now).map(Some)
    }

    pub fn extend(&mut self, additional_secs: i64, now: i64) -> Result<FocusSession> {
        self.sync()?;
        let FocusState::Active(session) = &mut self.state else {
            return Err(AppError::NotFound {
                entity: "Active focus session",
            });
        };
        if additional_secs <= 0 {
            return Err(AppError::InvalidInput {
                field: "duration",
                reason: "extension must be positive".into(),
            });
        }

        // cap the total so the session never runs longer than the maximum from now
        let planned = session
            .planned_secs
            .saturating_add(additional_secs)
            .min(now - session.started_at + MAX_FOCUS_MINUTES * 60);
        self.store.write(|tx| session.update_planned(tx, planned))?;
        info!("Focus session extended, {}s remaining", session.remaining_secs(now));
        Ok(session.clone())
    }

    /// One controller step: complete an expired session, otherwise block the
    /// foreground app if the session lists it.
    pub fn tick(&mut self, now: i64, foreground: Option<&str>) -> Result<TickOutcome> {
        self.sync()?;
        let Some(session) = self.active() else {
            return Ok(TickOutcome::Idle);
        };

        if session.is_expired(now) {
            let finished = self.finish(SessionStatus::Completed, now)?;
            return Ok(TickOutcome::Completed(finished));
        }

        let blocked = foreground.filter(|app| session.blocks(app)).map(ToString::to_string);
        if let Some(app) = &blocked {
            debug!("Foreground '{app}' is blocked");
            self.enforcer.block(app);
        }
        Ok(TickOutcome::Running { blocked })
    }

    /// Cancel whatever is active, including a session another process started since
    /// the last tick. Used on daemon exit so no session is left dangling.
    pub fn shutdown(&mut self, now: i64) -> Result<Option<FocusSession>> {
        if let Err(e) = self.sync() {
            warn!("Could not re-read focus state on shutdown, cancelling the known session: {e}");
        }
        if self.active().is_none() {
            return Ok(None);
        }
        self.finish(SessionStatus::Cancelled, now).map(Some)
    }

    pub fn remaining(&self, now: i64) -> Option<i64> {
        self.active().map(|s| s.remaining_secs(now))
    }

    pub fn status(&mut self, now: i64) -> Result<FocusStatus> {
        self.sync()?;
        Ok(match self.active() {
            Some(session) => {
                let elapsed = session.elapsed_secs(now).min(session.planned_secs);
                let progress = if session.planned_secs > 0 {
                    percent(elapsed, session.planned_secs)
                } else {
                    100.0
                };
                FocusStatus {
                    active: true,
                    session: Some(session.clone()),
                    elapsed_secs: elapsed,
                    remaining_secs: session.remaining_secs(now),
                    progress_percent: progress,
                }
            }
            None => FocusStatus {
                active: false,
                session: None,
                elapsed_secs: 0,
                remaining_secs: 0,
                progress_percent: 0.0,
            },
        })
    }

    fn finish(&mut self, status: SessionStatus, ended_at: i64) -> Result<FocusSession> {
        let FocusState::Active(mut session) = std::mem::replace(&mut self.state, FocusState::Idle) else {
            return Err(AppError::NotFound {
                entity: "Active focus session",
            });
        };

        if let Err(e) = self.store.write(|tx| session.finish(tx, status, ended_at)) {
            self.state = FocusState::Active(session);
            return Err(e);
        }
        info!(
            "Focus session {} {status} after {}s",
            session.id.unwrap_or_default(),
            session.elapsed_secs(ended_at)
        );
        Ok(session)
    }

    fn sync(&mut self) -> Result<()> {
        let stored = FocusSession::find_active(self.reader.connection())?;
        let next = match (&self.state, stored) {
            (FocusState::Active(local), None) => {
                info!("Focus session {} ended elsewhere", local.id.unwrap_or_default());
                Some(FocusState::Idle)
            }
            (FocusState::Active(local), Some(stored)) if *local == stored => None,
            (_, Some(stored)) => {
                debug!("Adopting focus session {} from store", stored.id.unwrap_or_default());
                Some(FocusState::Active(stored))
            }
            (FocusState::Idle, None) => None,
        };
        if let Some(next) = next {
            self.state = next;
        }
        Ok(())
    }
}

fn validate_duration(duration_secs: i64) -> Result<()> {
    if duration_secs <= 0 || duration_secs > MAX_FOCUS_MINUTES * 60 {
        return Err(AppError::InvalidInput {
            field: "duration",
            reason: format!("must be between 1 second and {MAX_FOCUS_MINUTES} minutes"),
        });
    }
    Ok(())
}
