pub mod aggregator;
pub mod sampler;

pub use aggregator::{IntervalAggregator, IntervalState, OpenSpan};
pub use sampler::{Sample, Sampler};

use crate::clock::{local_date, now_ts};
use crate::constants::{SECS_PER_DAY, SETTINGS_RELOAD_SECS};
use crate::db::Store;
use crate::platform::{TimedSource, WindowSignalSource};
use crate::settings::Settings;
use chrono::{Local, NaiveDate};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Write side of the latest sample. Only the tracker thread publishes.
#[derive(Clone, Default)]
pub struct SampleSlot {
    inner: Arc<RwLock<Option<Sample>>>,
}

impl SampleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, sample: Sample) {
        match self.inner.write() {
            Ok(mut slot) => *slot = Some(sample),
            Err(poisoned) => *poisoned.into_inner() = Some(sample),
        }
    }

    pub fn reader(&self) -> SampleReader {
        SampleReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of the latest sample.
#[derive(Clone)]
pub struct SampleReader {
    inner: Arc<RwLock<Option<Sample>>>,
}

impl SampleReader {
    pub fn latest(&self) -> Option<Sample> {
        match self.inner.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub struct TrackerService {
    store: Arc<Store>,
    running: Arc<AtomicBool>,
    current: SampleSlot,
    lost_intervals: Arc<AtomicU64>,
}

impl TrackerService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            running: Arc::new(AtomicBool::new(false)),
            current: SampleSlot::new(),
            lost_intervals: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the sampling loop. The open interval is flushed when the loop exits.
    pub fn start(&self, source: Box<dyn WindowSignalSource>, settings: Settings) -> thread::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let lost = Arc::clone(&self.lost_intervals);
        let slot = self.current.clone();
        let store = Arc::clone(&self.store);

        thread::spawn(move || {
            let poll = Duration::from_secs(settings.poll_interval_secs.max(1));
            let source = TimedSource::spawn(source, poll);
            let mut aggregator = IntervalAggregator::new(Arc::clone(&store));
            aggregator.set_poll_interval(settings.poll_interval_secs);
            let mut worker = TrackerLoop {
                sampler: Sampler::new(source, &settings),
                aggregator,
                store,
                settings,
                slot,
                last_reload: Instant::now(),
                last_prune: None,
            };
            info!("Tracker started with {} backend", worker.sampler.backend_name());

            while running.load(Ordering::SeqCst) {
                worker.tick(now_ts());
                lost.store(worker.aggregator.lost_intervals(), Ordering::SeqCst);
                sleep_while_running(&running, Duration::from_secs(worker.settings.poll_interval_secs.max(1)));
            }

            if let Err(e) = worker.aggregator.flush(now_ts()) {
                error!("Failed to flush open interval: {e}");
            }
            lost.store(worker.aggregator.lost_intervals(), Ordering::SeqCst);
            info!("Tracker stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> SampleReader {
        self.current.reader()
    }

    pub fn lost_intervals(&self) -> u64 {
        self.lost_intervals.load(Ordering::SeqCst)
    }
}

struct TrackerLoop {
    sampler: Sampler,
    aggregator: IntervalAggregator,
    store: Arc<Store>,
    settings: Settings,
    slot: SampleSlot,
    last_reload: Instant,
    last_prune: Option<NaiveDate>,
}

impl TrackerLoop {
    fn tick(&mut self, now: i64) {
        if self.last_reload.elapsed() >= Duration::from_secs(SETTINGS_RELOAD_SECS) {
            self.reload_settings();
        }
        self.prune_if_due(now);

        if let Some(sample) = self.sampler.poll(now) {
            self.slot.publish(sample.clone());
            if let Err(e) = self.aggregator.handle(sample) {
                error!("Tracker tick at {now} failed: {e}");
            }
        }
    }

    fn reload_settings(&mut self) {
        self.last_reload = Instant::now();
        let loaded = self
            .store
            .reader()
            .and_then(|reader| Settings::load(reader.connection()));
        match loaded {
            Ok(settings) if settings != self.settings => {
                info!("Settings changed, applying");
                self.sampler.apply_settings(&settings);
                self.aggregator.set_poll_interval(settings.poll_interval_secs);
                self.settings = settings;
            }
            Ok(_) => {}
            Err(e) => warn!("Keeping previous settings: {e}"),
        }
    }

    fn prune_if_due(&mut self, now: i64) {
        let today = local_date(&Local, now);
        if self.last_prune == Some(today) || self.settings.retention_days <= 0 {
            return;
        }
        self.last_prune = Some(today);
        let cutoff = now - self.settings.retention_days * SECS_PER_DAY;
        if let Err(e) = self.aggregator.prune(cutoff) {
            warn!("Retention cleanup failed: {e}");
        }
    }
}

/// Sleep up to `total`, waking early once `running` clears.
pub(crate) fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(step.min(deadline - now));
    }
}
