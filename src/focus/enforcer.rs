use crate::platform::normalize_app_id;
use log::{info, warn};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Receives block decisions from the focus controller.
///
/// Called on every tick the blocked app is in front, so implementations must
/// tolerate repeats.
pub trait Enforcer: Send + Sync {
    fn block(&self, app_id: &str);
}

/// Advisory enforcement: records the decision and does nothing else.
#[derive(Debug, Default)]
pub struct LogEnforcer;

impl Enforcer for LogEnforcer {
    fn block(&self, app_id: &str) {
        info!("Focus mode: '{app_id}' is blocked");
    }
}

/// Terminates processes whose name matches the blocked app.
pub struct ProcessEnforcer {
    system: Mutex<System>,
    own_pid: Pid,
}

impl ProcessEnforcer {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            own_pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for ProcessEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl Enforcer for ProcessEnforcer {
    fn block(&self, app_id: &str) {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All);

        let mut signalled = 0;
        for (pid, process) in system.processes() {
            if *pid == self.own_pid || normalize_app_id(&process.name().to_string_lossy()) != app_id {
                continue;
            }
            let sent = process.kill_with(Signal::Term).unwrap_or_else(|| process.kill());
            if sent {
                signalled += 1;
            } else {
                warn!("Could not signal '{app_id}' (pid {pid})");
            }
        }

        if signalled > 0 {
            info!("Focus mode: terminated {signalled} '{app_id}' process(es)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_enforcer_ignores_missing_app() {
        // no process has this name; must not panic or touch anything
        ProcessEnforcer::new().block("dwell-test-no-such-app");
    }
}
