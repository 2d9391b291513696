//! Daemon lifecycle: single instance, recovery, worker threads, bounded shutdown.

pub mod pidfile;

pub use pidfile::{is_alive, running_pid, terminate, PidFile};

use crate::clock::{local_date, now_ts};
use crate::constants::{
    SETTINGS_RELOAD_SECS, SHUTDOWN_FLUSH_MS, SHUTDOWN_FOCUS_MS, SHUTDOWN_HARD_CUTOFF_MS,
    SHUTDOWN_TRACKER_MS,
};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::focus::{Enforcer, FocusController, LogEnforcer, ProcessEnforcer, TickOutcome};
use crate::platform::{self, UnavailableSource, WindowSignalSource};
use crate::reminders::{DesktopNotifier, LogNotifier, Notifier, Reminders};
use crate::settings::Settings;
use crate::stats::StatsEngine;
use crate::tracker::{sleep_while_running, IntervalAggregator, SampleReader, TrackerService};
use crate::DataPaths;
use chrono::Local;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(30);
const START_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Terminate blocked apps instead of only logging them.
    pub enforce: bool,
    /// Deliver reminders as desktop notifications.
    pub desktop_notifications: bool,
}

/// Written by the running daemon so other processes can report on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonReport {
    pub pid: u32,
    pub started_at: i64,
    pub updated_at: i64,
    pub backend: String,
    pub lost_intervals: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub report: Option<DaemonReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { pid: u32 },
    AlreadyRunning { pid: u32 },
}

pub fn status(paths: &DataPaths) -> Result<DaemonStatus> {
    let pid = running_pid(&paths.pid_file)?;
    let report = pid.and_then(|pid| read_report(paths).filter(|r| r.pid == pid));
    Ok(DaemonStatus {
        running: pid.is_some(),
        pid,
        report,
    })
}

/// Launch `dwell daemon run` in the background. Reports an existing instance
/// instead of starting a second one.
pub fn start_detached(paths: &DataPaths) -> Result<StartOutcome> {
    if let Some(pid) = running_pid(&paths.pid_file)? {
        return Ok(StartOutcome::AlreadyRunning { pid });
    }
    paths.ensure()?;

    let log = OpenOptions::new().create(true).append(true).open(&paths.log_file)?;
    let mut command = Command::new(std::env::current_exe()?);
    command
        .args(["daemon", "run"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log));
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let child = command.spawn()?;
    info!("Spawned daemon process {}", child.id());

    let deadline = Instant::now() + START_WAIT;
    while Instant::now() < deadline {
        if let Some(pid) = running_pid(&paths.pid_file)? {
            return Ok(StartOutcome::Started { pid });
        }
        thread::sleep(Duration::from_millis(100));
    }
    warn!("Daemon has not written its pid file yet, see {}", paths.log_file.display());
    Ok(StartOutcome::Started { pid: child.id() })
}

/// Signal the running daemon and wait for it to exit. Returns false when nothing
/// was running.
pub fn stop(paths: &DataPaths) -> Result<bool> {
    let Some(pid) = running_pid(&paths.pid_file)? else {
        return Ok(false);
    };
    if !terminate(pid) {
        return Err(AppError::InvalidInput {
            field: "pid",
            reason: format!("could not signal process {pid}"),
        });
    }

    let deadline = Instant::now() + Duration::from_millis(SHUTDOWN_HARD_CUTOFF_MS + 1000);
    while is_alive(pid) {
        if Instant::now() >= deadline {
            warn!("Daemon {pid} is still running after the shutdown window");
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    Ok(true)
}

/// Run the daemon in the foreground until SIGINT/SIGTERM.
pub fn run(paths: &DataPaths, options: &DaemonOptions) -> Result<()> {
    paths.ensure()?;
    let pid_file = PidFile::acquire(&paths.pid_file)?;
    let store = Arc::new(Store::open(&paths.database)?);
    let settings = Settings::load(store.reader()?.connection())?;
    let started_at = now_ts();

    IntervalAggregator::new(Arc::clone(&store)).recover(settings.max_gap_secs, started_at)?;

    let enforcer: Box<dyn Enforcer> = if options.enforce {
        Box::new(ProcessEnforcer::new())
    } else {
        Box::new(LogEnforcer)
    };
    let mut controller = FocusController::new(Arc::clone(&store), enforcer)?;
    controller.restore(started_at)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Shutdown signal received");
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| AppError::Io(std::io::Error::other(e.to_string())))?;
    }

    let source: Box<dyn WindowSignalSource> = platform::detect().unwrap_or_else(|e| {
        warn!("Window signal backend unavailable: {e}");
        Box::new(UnavailableSource)
    });
    let backend = source.backend_name().to_string();

    let tracker = TrackerService::new(Arc::clone(&store));
    let tracker_handle = tracker.start(source, settings.clone());

    let notifier: Box<dyn Notifier> = if options.desktop_notifications {
        Box::new(DesktopNotifier)
    } else {
        Box::new(LogNotifier)
    };
    let focus_running = Arc::new(AtomicBool::new(true));
    let focus_loop = FocusLoop {
        stale_after: stale_after(&settings),
        reminders: Reminders::new(&settings, notifier),
        stats: StatsEngine::new(store.reader()?),
        samples: tracker.current(),
        controller,
        last_reload: Instant::now(),
    };
    let focus_handle = focus_loop.spawn(Arc::clone(&focus_running));

    let mut report = DaemonReport {
        pid: pid_file.pid(),
        started_at,
        updated_at: started_at,
        backend,
        lost_intervals: 0,
    };
    write_report(paths, &report);
    info!("Daemon running (pid {}, backend {})", report.pid, report.backend);

    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) {
        if tracker_handle.is_finished() || focus_handle.is_finished() {
            error!("A worker thread exited unexpectedly, shutting down");
            break;
        }
        if last_report.elapsed() >= REPORT_INTERVAL {
            report.updated_at = now_ts();
            report.lost_intervals = tracker.lost_intervals();
            write_report(paths, &report);
            last_report = Instant::now();
        }
        thread::sleep(Duration::from_millis(200));
    }

    shutdown(&tracker, tracker_handle, &focus_running, focus_handle, &store);
    if let Err(e) = fs::remove_file(&paths.status_file) {
        warn!("Failed to remove status file: {e}");
    }
    info!("Daemon stopped ({} interval(s) lost)", tracker.lost_intervals());
    Ok(())
}

/// Close the open interval, cancel the focus session, then checkpoint the store.
/// Each step gets its own budget inside a hard overall cutoff.
fn shutdown(
    tracker: &TrackerService,
    tracker_handle: JoinHandle<()>,
    focus_running: &AtomicBool,
    focus_handle: JoinHandle<()>,
    store: &Arc<Store>,
) {
    let cutoff = Instant::now() + Duration::from_millis(SHUTDOWN_HARD_CUTOFF_MS);
    let budget = |ms: u64| Duration::from_millis(ms).min(cutoff.saturating_duration_since(Instant::now()));

    tracker.stop();
    join_within("tracker", tracker_handle, budget(SHUTDOWN_TRACKER_MS));

    focus_running.store(false, Ordering::SeqCst);
    join_within("focus", focus_handle, budget(SHUTDOWN_FOCUS_MS));

    let store = Arc::clone(store);
    let flush = thread::spawn(move || {
        if let Err(e) = store.checkpoint() {
            warn!("Store checkpoint failed: {e}");
        }
    });
    join_within("checkpoint", flush, budget(SHUTDOWN_FLUSH_MS));
}

fn join_within(name: &str, handle: JoinHandle<()>, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{name} did not finish within {budget:?}, skipping");
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
    if handle.join().is_err() {
        error!("{name} thread panicked");
    }
    true
}

fn stale_after(settings: &Settings) -> i64 {
    i64::try_from(settings.poll_interval_secs.saturating_mul(3)).unwrap_or(i64::MAX)
}

fn write_report(paths: &DataPaths, report: &DaemonReport) {
    let written = serde_json::to_vec_pretty(report)
        .map_err(AppError::from)
        .and_then(|bytes| fs::write(&paths.status_file, bytes).map_err(AppError::from));
    if let Err(e) = written {
        warn!("Failed to write status file: {e}");
    }
}

fn read_report(paths: &DataPaths) -> Option<DaemonReport> {
    let text = fs::read_to_string(&paths.status_file).ok()?;
    serde_json::from_str(&text).ok()
}

/// Focus controller and reminders, ticking once a second on their own thread.
struct FocusLoop {
    controller: FocusController,
    reminders: Reminders,
    stats: StatsEngine,
    samples: SampleReader,
    stale_after: i64,
    last_reload: Instant,
}

impl FocusLoop {
    fn spawn(mut self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                self.tick(now_ts());
                sleep_while_running(&running, Duration::from_secs(crate::constants::FOCUS_TICK_SECS));
            }
            match self.controller.shutdown(now_ts()) {
                Ok(Some(session)) => info!("Cancelled focus session {} on shutdown", session.id.unwrap_or_default()),
                Ok(None) => {}
                Err(e) => error!("Failed to cancel focus session: {e}"),
            }
        })
    }

    fn tick(&mut self, now: i64) {
        if self.last_reload.elapsed() >= Duration::from_secs(SETTINGS_RELOAD_SECS) {
            self.reload_settings();
        }

        let sample = self.samples.latest().filter(|s| now - s.ts <= self.stale_after);
        match self.controller.tick(now, sample.as_ref().map(|s| s.app_id.as_str())) {
            Ok(TickOutcome::Completed(session)) => {
                info!("Focus session {} completed", session.id.unwrap_or_default());
            }
            Ok(_) => {}
            Err(e) => warn!("Focus tick failed: {e}"),
        }

        let idle = sample.as_ref().map_or(true, |s| s.idle);
        self.reminders.evaluate(now, idle, &self.stats, local_date(&Local, now));
    }

    fn reload_settings(&mut self) {
        self.last_reload = Instant::now();
        match Settings::load(self.stats.connection()) {
            Ok(settings) => {
                self.reminders.apply_settings(&settings);
                self.stale_after = stale_after(&settings);
            }
            Err(e) => warn!("Keeping previous reminder settings: {e}"),
        }
    }
}
