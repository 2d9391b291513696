use super::{WindowSample, WindowSignalSource};
use crate::error::{AppError, Result};
use log::{debug, error};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs a [`WindowSignalSource`] on its own thread so a hung display-server call can
/// never stall the caller for longer than `timeout`.
///
/// At most one call is in flight. While a timed-out call is still running, later
/// requests fail fast with [`AppError::TransientSignal`] instead of queueing.
pub struct TimedSource {
    requests: Option<Sender<()>>,
    responses: Receiver<Result<WindowSample>>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
    in_flight: bool,
    backend: &'static str,
}

impl TimedSource {
    pub fn spawn(source: Box<dyn WindowSignalSource>, timeout: Duration) -> Self {
        let backend = source.backend_name();
        let (req_tx, req_rx) = mpsc::channel::<()>();
        let (resp_tx, resp_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("window-signal".into())
            .spawn(move || {
                while req_rx.recv().is_ok() {
                    if resp_tx.send(source.sample()).is_err() {
                        break;
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to spawn window signal thread: {e}");
                None
            }
        };

        Self {
            requests: worker.as_ref().map(|_| req_tx),
            responses: resp_rx,
            worker,
            timeout,
            in_flight: false,
            backend,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn sample(&mut self) -> Result<WindowSample> {
        if self.in_flight {
            match self.responses.try_recv() {
                Ok(stale) => {
                    debug!("Discarding late window sample: {:?}", stale.map(|s| s.app_id));
                    self.in_flight = false;
                }
                Err(TryRecvError::Empty) => {
                    return Err(AppError::TransientSignal {
                        reason: "previous window query still running".into(),
                    });
                }
                Err(TryRecvError::Disconnected) => {
                    self.in_flight = false;
                    return Err(worker_gone());
                }
            }
        }

        let requests = self.requests.as_ref().ok_or_else(worker_gone)?;
        requests.send(()).map_err(|_| worker_gone())?;
        self.in_flight = true;

        match self.responses.recv_timeout(self.timeout) {
            Ok(result) => {
                self.in_flight = false;
                result
            }
            Err(RecvTimeoutError::Timeout) => Err(AppError::TransientSignal {
                reason: format!("window query timed out after {:?}", self.timeout),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                self.in_flight = false;
                Err(worker_gone())
            }
        }
    }
}

fn worker_gone() -> AppError {
    AppError::TransientSignal {
        reason: "window signal thread stopped".into(),
    }
}

impl Drop for TimedSource {
    fn drop(&mut self) {
        self.requests.take();
        // A hung backend call keeps its thread alive; only join when it is idle.
        if !self.in_flight {
            if let Some(handle) = self.worker.take() {
                if handle.join().is_err() {
                    error!("Window signal thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{window, ScriptedSource};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct SlowSource {
        release: Arc<AtomicBool>,
    }

    impl WindowSignalSource for SlowSource {
        fn sample(&self) -> Result<WindowSample> {
            while !self.release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(window("code", None, 0))
        }

        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn test_passes_through_results() {
        let source = ScriptedSource::new(vec![Some(window("code", Some("a"), 3)), None]);
        let mut timed = TimedSource::spawn(Box::new(source), Duration::from_secs(1));

        assert_eq!(timed.sample().unwrap().app_id, "code");
        assert!(matches!(timed.sample(), Err(AppError::TransientSignal { .. })));
        assert_eq!(timed.backend_name(), "scripted");
    }

    #[test]
    fn test_hung_call_times_out_and_recovers() {
        let release = Arc::new(AtomicBool::new(false));
        let source = SlowSource {
            release: Arc::clone(&release),
        };
        let mut timed = TimedSource::spawn(Box::new(source), Duration::from_millis(30));

        assert!(matches!(timed.sample(), Err(AppError::TransientSignal { .. })));
        // still hung: fails fast instead of queueing another call
        assert!(matches!(timed.sample(), Err(AppError::TransientSignal { .. })));

        release.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        timed.set_timeout(Duration::from_secs(1));
        assert_eq!(timed.sample().unwrap().app_id, "code");
    }

    struct CrashingSource;

    impl WindowSignalSource for CrashingSource {
        fn sample(&self) -> Result<WindowSample> {
            panic!("backend crashed");
        }

        fn backend_name(&self) -> &'static str {
            "crashing"
        }
    }

    #[test]
    fn test_crashed_worker_reports_fault_and_drops_cleanly() {
        let mut timed = TimedSource::spawn(Box::new(CrashingSource), Duration::from_secs(1));

        assert!(matches!(timed.sample(), Err(AppError::TransientSignal { .. })));
        assert!(matches!(timed.sample(), Err(AppError::TransientSignal { .. })));
        assert!(!timed.in_flight, "nothing is pending once the worker is gone");
        drop(timed);
    }
}
