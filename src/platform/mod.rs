pub mod timed;
pub mod types;

pub use timed::TimedSource;
pub use types::{normalize_app_id, WindowSample, WindowSignalSource};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub mod wayland;

use crate::error::{AppError, Result};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    X11,
    Wayland,
    Unknown,
}

impl SessionKind {
    /// Classify the session from the usual environment variables.
    pub fn from_env(session_type: Option<&str>, wayland_display: bool, x_display: bool) -> Self {
        match session_type.map(str::to_ascii_lowercase).as_deref() {
            Some("wayland") => Self::Wayland,
            Some("x11") => Self::X11,
            Some(_) | None if wayland_display => Self::Wayland,
            Some(_) | None if x_display => Self::X11,
            Some(_) | None => Self::Unknown,
        }
    }

    pub fn current() -> Self {
        let session_type = std::env::var("XDG_SESSION_TYPE").ok();
        Self::from_env(
            session_type.as_deref(),
            std::env::var_os("WAYLAND_DISPLAY").is_some(),
            std::env::var_os("DISPLAY").is_some(),
        )
    }
}

/// Pick the signal source for the running display server.
#[cfg(target_os = "linux")]
pub fn detect() -> Result<Box<dyn WindowSignalSource>> {
    let kind = SessionKind::current();
    info!("Detected display session: {kind:?}");

    match kind {
        SessionKind::Wayland => Ok(Box::new(wayland::WaylandSource::new())),
        SessionKind::X11 => Ok(Box::new(linux::X11Source::connect()?)),
        SessionKind::Unknown => match linux::X11Source::connect() {
            Ok(source) => Ok(Box::new(source)),
            Err(e) => {
                warn!("No display server reachable ({e}), tracking will report faults");
                Ok(Box::new(UnavailableSource))
            }
        },
    }
}

#[cfg(not(target_os = "linux"))]
pub fn detect() -> Result<Box<dyn WindowSignalSource>> {
    warn!("No window signal backend for this platform");
    Ok(Box::new(UnavailableSource))
}

/// Stand-in when no backend can be reached. Every call is a transient fault, so the
/// sampler degrades to the unknown app instead of stopping.
pub struct UnavailableSource;

impl WindowSignalSource for UnavailableSource {
    fn sample(&self) -> Result<WindowSample> {
        Err(AppError::TransientSignal {
            reason: "no display backend available".into(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
