//! Break and daily-goal reminders. Policies only; delivery goes through a [`Notifier`].

use crate::constants::GOAL_CHECK_SECS;
use crate::settings::Settings;
use crate::stats::{GoalProgress, StatsEngine};
use chrono::{NaiveDate, TimeZone};
use log::{info, warn};
use std::process::{Command, Stdio};

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("{title}: {body}");
    }
}

/// Desktop notifications through `notify-send`, logged when that is unavailable.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        let status = Command::new("notify-send")
            .args(["--app-name=dwell", "--urgency=normal", title, body])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => info!("Sent notification: {title}"),
            Ok(s) => warn!("notify-send exited with {s}; {title}: {body}"),
            Err(e) => warn!("notify-send unavailable ({e}); {title}: {body}"),
        }
    }
}

/// Fires once every `interval_secs` of non-idle time.
#[derive(Debug)]
pub struct BreakReminder {
    interval_secs: i64,
    last_reminded: Option<i64>,
}

impl BreakReminder {
    pub fn new(interval_secs: i64) -> Self {
        Self {
            interval_secs,
            last_reminded: None,
        }
    }

    pub fn set_interval(&mut self, interval_secs: i64) {
        self.interval_secs = interval_secs;
    }

    /// Returns true when a reminder is due at `now`.
    pub fn check(&mut self, now: i64, idle: bool) -> bool {
        if self.interval_secs <= 0 {
            return false;
        }
        let anchor = *self.last_reminded.get_or_insert(now);
        if idle || now - anchor < self.interval_secs {
            return false;
        }
        self.last_reminded = Some(now);
        true
    }
}

/// Fires once per day, the first time the daily goal is reached.
#[derive(Debug, Default)]
pub struct GoalReminder {
    notified_on: Option<NaiveDate>,
}

impl GoalReminder {
    pub fn check(&mut self, progress: &GoalProgress) -> bool {
        if !progress.reached || self.notified_on == Some(progress.date) {
            return false;
        }
        self.notified_on = Some(progress.date);
        true
    }
}

pub struct Reminders {
    enabled: bool,
    breaks: BreakReminder,
    goal: GoalReminder,
    last_goal_check: Option<i64>,
    notifier: Box<dyn Notifier>,
}

impl Reminders {
    pub fn new(settings: &Settings, notifier: Box<dyn Notifier>) -> Self {
        Self {
            enabled: settings.enable_notifications,
            breaks: BreakReminder::new(settings.break_reminder_secs),
            goal: GoalReminder::default(),
            last_goal_check: None,
            notifier,
        }
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.enabled = settings.enable_notifications;
        self.breaks.set_interval(settings.break_reminder_secs);
    }

    pub fn evaluate<Tz: TimeZone>(&mut self, now: i64, idle: bool, stats: &StatsEngine<Tz>, today: NaiveDate) {
        if !self.enabled {
            return;
        }

        if self.breaks.check(now, idle) {
            self.notifier.notify(
                "Time for a break",
                "You've been at your screen for a while. Rest your eyes for a moment.",
            );
        }

        if self.last_goal_check.is_some_and(|last| now - last < GOAL_CHECK_SECS) {
            return;
        }
        self.last_goal_check = Some(now);
        match stats.goal_progress(today) {
            Ok(progress) if self.goal.check(&progress) => self.notifier.notify(
                "Daily goal reached",
                &format!("{} minutes of active time today.", progress.active_minutes),
            ),
            Ok(_) => {}
            Err(e) => warn!("Goal check failed: {e}"),
        }
    }
}
