use super::{normalize_app_id, WindowSample, WindowSignalSource};
use crate::constants::UNKNOWN_APP;
use crate::error::{AppError, Result};
use log::debug;
use serde_json::Value;
use std::env;
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use sysinfo::{ProcessesToUpdate, System};

/// Process names of common GUI apps, used when the compositor will not say which
/// window has focus.
const KNOWN_GUI_APPS: &[&str] = &[
    "firefox", "chromium", "chrome", "brave", "code", "cursor", "slack", "discord", "spotify",
    "telegram", "thunderbird", "nautilus", "gnome-terminal", "tilix", "alacritty", "kitty",
    "obs", "gimp", "inkscape", "blender", "steam", "vlc", "mpv", "eog", "evince", "gedit",
    "libreoffice",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    Sway,
    Hyprland,
    Gnome,
    Kde,
    Other,
}

impl Compositor {
    pub fn detect() -> Self {
        if env::var_os("SWAYSOCK").is_some() {
            return Self::Sway;
        }
        if env::var_os("HYPRLAND_INSTANCE_SIGNATURE").is_some() {
            return Self::Hyprland;
        }
        let desktop = env::var("XDG_CURRENT_DESKTOP").unwrap_or_default().to_lowercase();
        if desktop.contains("gnome") {
            Self::Gnome
        } else if desktop.contains("kde") {
            Self::Kde
        } else if desktop.contains("sway") {
            Self::Sway
        } else if desktop.contains("hyprland") {
            Self::Hyprland
        } else {
            Self::Other
        }
    }
}

/// Wayland backend. There is no portable protocol for the focused window, so this asks
/// the compositor's own IPC tool. GNOME only answers on old shells; past that the most
/// recently started known GUI process stands in for the focused app.
pub struct WaylandSource {
    compositor: Compositor,
    system: Mutex<System>,
}

impl WaylandSource {
    pub fn new() -> Self {
        Self {
            compositor: Compositor::detect(),
            system: Mutex::new(System::new()),
        }
    }

    fn active_window(&self) -> Result<Option<(String, Option<String>)>> {
        match self.compositor {
            Compositor::Sway => {
                let tree = run_json("swaymsg", &["-t", "get_tree"])?;
                Ok(find_focused_sway(&tree).map(window_from_sway))
            }
            Compositor::Hyprland => {
                let active = run_json("hyprctl", &["activewindow", "-j"])?;
                Ok(window_from_hyprland(&active))
            }
            Compositor::Gnome => {
                let app = gnome_focused_class().or_else(|| self.recent_gui_app());
                Ok(app.map(|app| (app, None)))
            }
            Compositor::Kde => Ok(kde_active_class()?.map(|app| (app, None))),
            Compositor::Other => Ok(None),
        }
    }

    fn recent_gui_app(&self) -> Option<String> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All);
        most_recent_gui_app(
            system
                .processes()
                .values()
                .map(|p| (p.name().to_string_lossy().to_lowercase(), p.start_time())),
        )
    }

    fn idle_seconds(&self) -> u64 {
        if self.compositor != Compositor::Gnome {
            return 0;
        }
        let output = Command::new("dbus-send")
            .args([
                "--print-reply",
                "--dest=org.gnome.Mutter.IdleMonitor",
                "/org/gnome/Mutter/IdleMonitor/Core",
                "org.gnome.Mutter.IdleMonitor.GetIdletime",
            ])
            .output();
        match output {
            Ok(out) if out.status.success() => {
                parse_mutter_idle(&String::from_utf8_lossy(&out.stdout)).unwrap_or(0)
            }
            Ok(_) | Err(_) => 0,
        }
    }
}

impl Default for WaylandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSignalSource for WaylandSource {
    fn sample(&self) -> Result<WindowSample> {
        let idle_seconds = self.idle_seconds();
        let (app_id, window_title) = self
            .active_window()?
            .unwrap_or_else(|| (UNKNOWN_APP.to_string(), None));
        Ok(WindowSample {
            app_id,
            window_title,
            idle_seconds,
        })
    }

    fn backend_name(&self) -> &'static str {
        "wayland"
    }
}

fn run_json(program: &str, args: &[&str]) -> Result<Value> {
    let output = Command::new(program).args(args).output().map_err(|e| AppError::TransientSignal {
        reason: format!("{program}: {e}"),
    })?;
    if !output.status.success() {
        return Err(AppError::TransientSignal {
            reason: format!("{program} exited with {}", output.status),
        });
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}

fn run_text(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program).args(args).output().map_err(|e| AppError::TransientSignal {
        reason: format!("{program}: {e}"),
    })?;
    if !output.status.success() {
        return Err(AppError::TransientSignal {
            reason: format!("{program} exited with {}", output.status),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Ask GNOME Shell for the focused window's class. Shell 45 and later refuse `Eval`.
fn gnome_focused_class() -> Option<String> {
    let reply = run_text(
        "gdbus",
        &[
            "call",
            "--session",
            "--dest",
            "org.gnome.Shell",
            "--object-path",
            "/org/gnome/Shell",
            "--method",
            "org.gnome.Shell.Eval",
            "global.display.get_focus_window()?.get_wm_class() || \"\"",
        ],
    );
    match reply {
        Ok(reply) => parse_gnome_eval(&reply),
        Err(e) => {
            debug!("GNOME Shell Eval unavailable: {e}");
            None
        }
    }
}

/// Parse a reply such as `(true, '"firefox"')`.
fn parse_gnome_eval(reply: &str) -> Option<String> {
    let body = reply.strip_prefix("(true,")?;
    let quoted = body.split_once('\'')?.1.rsplit_once('\'')?.0;
    let class = quoted.trim_matches('"').trim();
    (!class.is_empty()).then(|| normalize_app_id(class))
}

fn kde_active_class() -> Result<Option<String>> {
    let window_id = run_text("qdbus", &["org.kde.KWin", "/KWin", "org.kde.KWin.activeWindow"])?;
    if window_id.is_empty() {
        return Ok(None);
    }
    let class = run_text(
        "qdbus",
        &[
            "org.kde.KWin",
            &format!("/KWin/Window{window_id}"),
            "org.kde.KWin.Window.resourceClass",
        ],
    )?;
    Ok((!class.is_empty()).then(|| normalize_app_id(&class)))
}

/// The known GUI app with the latest process start time, ignoring ourselves.
fn most_recent_gui_app(processes: impl Iterator<Item = (String, u64)>) -> Option<String> {
    processes
        .filter(|(name, _)| !name.contains("dwell"))
        .filter_map(|(name, started)| {
            KNOWN_GUI_APPS
                .iter()
                .find(|known| name.contains(*known))
                .map(|known| (started, *known))
        })
        .max_by_key(|(started, _)| *started)
        .map(|(_, known)| known.to_string())
}

fn find_focused_sway(node: &Value) -> Option<&Value> {
    if node.get("focused").and_then(Value::as_bool) == Some(true) {
        return Some(node);
    }
    ["nodes", "floating_nodes"]
        .iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_array))
        .flatten()
        .find_map(find_focused_sway)
}

fn window_from_sway(node: &Value) -> (String, Option<String>) {
    let app = node
        .get("app_id")
        .and_then(Value::as_str)
        .or_else(|| {
            node.pointer("/window_properties/class")
                .and_then(Value::as_str)
        })
        .map_or_else(|| UNKNOWN_APP.to_string(), normalize_app_id);
    let title = node.get("name").and_then(Value::as_str).map(ToString::to_string);
    (app, title)
}

fn window_from_hyprland(active: &Value) -> Option<(String, Option<String>)> {
    let class = active.get("class").and_then(Value::as_str)?;
    if class.is_empty() {
        return None;
    }
    let title = active.get("title").and_then(Value::as_str).map(ToString::to_string);
    Some((normalize_app_id(class), title))
}

/// Parse `dbus-send` output such as `   uint64 12345` (milliseconds).
fn parse_mutter_idle(output: &str) -> Option<u64> {
    output
        .lines()
        .find(|line| line.contains("uint64"))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|ms| ms.parse::<u64>().ok())
        .map(|ms| ms / 1000)
}
