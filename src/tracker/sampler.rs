use crate::constants::{MAX_SIGNAL_FAILURES, UNKNOWN_APP};
use crate::platform::{TimedSource, WindowSample};
use crate::settings::Settings;
use log::{debug, warn};
use serde::Serialize;
use std::time::Duration;

/// One observation of the foreground app, already classified as idle or active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub app_id: String,
    pub window_title: Option<String>,
    pub idle: bool,
    pub ts: i64,
}

/// Polls the signal source and turns raw readings into [`Sample`]s.
pub struct Sampler {
    source: TimedSource,
    idle_threshold_secs: u64,
    track_window_titles: bool,
    consecutive_failures: u32,
    last_idle: bool,
}

impl Sampler {
    pub fn new(source: TimedSource, settings: &Settings) -> Self {
        Self {
            source,
            idle_threshold_secs: settings.idle_threshold_secs,
            track_window_titles: settings.track_window_titles,
            consecutive_failures: 0,
            last_idle: false,
        }
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.idle_threshold_secs = settings.idle_threshold_secs;
        self.track_window_titles = settings.track_window_titles;
        self.source
            .set_timeout(Duration::from_secs(settings.poll_interval_secs.max(1)));
    }

    pub fn backend_name(&self) -> &'static str {
        self.source.backend_name()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Take one sample at `ts`.
    ///
    /// A failed read yields nothing until failures pile up, after which the
    /// foreground is reported as [`UNKNOWN_APP`] with the last known idle state.
    pub fn poll(&mut self, ts: i64) -> Option<Sample> {
        match self.source.sample() {
            Ok(raw) => {
                if self.consecutive_failures > 0 {
                    debug!("Signal source recovered after {} failure(s)", self.consecutive_failures);
                }
                self.consecutive_failures = 0;
                Some(self.classify(raw, ts))
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    "Sample from {} failed ({} in a row): {e}",
                    self.source.backend_name(),
                    self.consecutive_failures
                );
                (self.consecutive_failures >= MAX_SIGNAL_FAILURES).then(|| Sample {
                    app_id: UNKNOWN_APP.to_string(),
                    window_title: None,
                    idle: self.last_idle,
                    ts,
                })
            }
        }
    }

    fn classify(&mut self, raw: WindowSample, ts: i64) -> Sample {
        let idle = raw.idle_seconds >= self.idle_threshold_secs;
        self.last_idle = idle;
        Sample {
            app_id: raw.app_id,
            window_title: raw.window_title.filter(|_| self.track_window_titles),
            idle,
            ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{window, ScriptedSource};

    fn sampler(script: Vec<Option<WindowSample>>, settings: &Settings) -> Sampler {
        let source = TimedSource::spawn(Box::new(ScriptedSource::new(script)), Duration::from_secs(1));
        Sampler::new(source, settings)
    }

    #[test]
    fn test_idle_threshold_is_inclusive() {
        let settings = Settings {
            idle_threshold_secs: 300,
            ..Settings::default()
        };
        let mut s = sampler(
            vec![Some(window("code", None, 299)), Some(window("code", None, 301))],
            &settings,
        );

        assert!(!s.poll(10).unwrap().idle);
        let idle = s.poll(15).unwrap();
        assert!(idle.idle);
        assert_eq!(idle.ts, 15);
    }

    #[test]
    fn test_titles_dropped_when_disabled() {
        let settings = Settings {
            track_window_titles: false,
            ..Settings::default()
        };
        let mut s = sampler(vec![Some(window("firefox", Some("secret"), 0))], &settings);
        assert_eq!(s.poll(1).unwrap().window_title, None);
    }

    #[test]
    fn test_failures_degrade_to_unknown_app() {
        let mut s = sampler(
            vec![Some(window("code", None, 900)), None, None, None, Some(window("code", None, 0))],
            &Settings::default(),
        );

        assert!(s.poll(1).unwrap().idle);
        assert!(s.poll(2).is_none());
        assert!(s.poll(3).is_none());

        let unknown = s.poll(4).unwrap();
        assert_eq!(unknown.app_id, UNKNOWN_APP);
        assert!(unknown.idle, "keeps the last known idle state");

        assert_eq!(s.poll(5).unwrap().app_id, "code");
        assert_eq!(s.consecutive_failures(), 0);
    }
}
