//! Shared test utilities.
//!
//! This module provides common setup functions used across test modules.

#![cfg(test)]

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::focus::Enforcer;
use crate::platform::{WindowSample, WindowSignalSource};
use chrono::{FixedOffset, TimeZone};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

/// Create a temporary store with migrations applied.
///
/// Returns a tuple of (Store, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_store() -> (Store, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let store = Store::open(&db_path).expect("Failed to open test store");
    (store, dir)
}

/// UTC+2, a zone without DST so midnights are stable.
pub fn test_tz() -> FixedOffset {
    FixedOffset::east_opt(2 * 3600).expect("valid offset")
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
    test_tz()
        .with_ymd_and_hms(y, m, d, h, min, s)
        .single()
        .expect("unambiguous local time")
        .timestamp()
}

/// Signal source that replays a script. `None` entries fail the call.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<WindowSample>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<WindowSample>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

impl WindowSignalSource for ScriptedSource {
    fn sample(&self) -> Result<WindowSample> {
        let mut script = self.script.lock().map_err(|_| AppError::LockPoisoned)?;
        match script.pop_front().flatten() {
            Some(sample) => Ok(sample),
            None => Err(AppError::TransientSignal {
                reason: "scripted failure".into(),
            }),
        }
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn window(app: &str, title: Option<&str>, idle_seconds: u64) -> WindowSample {
    WindowSample {
        app_id: app.to_string(),
        window_title: title.map(ToString::to_string),
        idle_seconds,
    }
}

/// Enforcer that records every block signal.
#[derive(Default, Clone)]
pub struct RecordingEnforcer {
    pub signals: Arc<Mutex<Vec<String>>>,
}

impl RecordingEnforcer {
    pub fn taken(&self) -> Vec<String> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Enforcer for RecordingEnforcer {
    fn block(&self, app_id: &str) {
        if let Ok(mut signals) = self.signals.lock() {
            signals.push(app_id.to_string());
        }
    }
}
