use super::{normalize_app_id, WindowSample, WindowSignalSource};
use crate::constants::UNKNOWN_APP;
use crate::error::{AppError, Result};
use x11rb::connection::Connection;
use x11rb::protocol::screensaver;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

/// X11 backend: EWMH active window plus the MIT-SCREEN-SAVER idle counter.
pub struct X11Source {
    conn: RustConnection,
    root: Window,
    net_active_window: Atom,
    net_wm_name: Atom,
    utf8_string: Atom,
}

fn signal_fault(what: &str, err: impl std::fmt::Display) -> AppError {
    AppError::TransientSignal {
        reason: format!("{what}: {err}"),
    }
}

impl X11Source {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(|e| signal_fault("connect", e))?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| signal_fault("screen", "no root window"))?;

        let intern = |name: &str| -> Result<Atom> {
            conn.intern_atom(false, name.as_bytes())
                .map_err(|e| signal_fault("intern_atom", e))?
                .reply()
                .map(|r| r.atom)
                .map_err(|e| signal_fault("intern_atom", e))
        };
        let net_active_window = intern("_NET_ACTIVE_WINDOW")?;
        let net_wm_name = intern("_NET_WM_NAME")?;
        let utf8_string = intern("UTF8_STRING")?;

        Ok(Self {
            conn,
            root,
            net_active_window,
            net_wm_name,
            utf8_string,
        })
    }

    fn property(&self, window: Window, atom: Atom, kind: impl Into<Atom>) -> Result<Vec<u8>> {
        let reply = self
            .conn
            .get_property(false, window, atom, kind, 0, 1024)
            .map_err(|e| signal_fault("get_property", e))?
            .reply()
            .map_err(|e| signal_fault("get_property", e))?;
        Ok(reply.value)
    }

    fn active_window(&self) -> Result<Option<Window>> {
        let value = self.property(self.root, self.net_active_window, AtomEnum::WINDOW)?;
        let window = value
            .get(..4)
            .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
            .map(u32::from_ne_bytes)
            .filter(|id| *id != 0);
        Ok(window)
    }

    fn title(&self, window: Window) -> Result<Option<String>> {
        let mut raw = self.property(window, self.net_wm_name, self.utf8_string)?;
        if raw.is_empty() {
            raw = self.property(window, AtomEnum::WM_NAME.into(), AtomEnum::STRING)?;
        }
        Ok(String::from_utf8(raw).ok().filter(|s| !s.is_empty()))
    }

    /// WM_CLASS is "instance\0class\0"; the class part is the more stable name.
    fn app_class(&self, window: Window) -> Result<Option<String>> {
        let raw = self.property(window, AtomEnum::WM_CLASS.into(), AtomEnum::STRING)?;
        let text = String::from_utf8_lossy(&raw);
        let mut parts = text.split('\0').filter(|s| !s.is_empty());
        let instance = parts.next().map(ToString::to_string);
        let class = parts.next().map(ToString::to_string);
        Ok(class.or(instance))
    }

    fn idle_seconds(&self) -> Result<u64> {
        let info = screensaver::query_info(&self.conn, self.root)
            .map_err(|e| signal_fault("screensaver", e))?
            .reply()
            .map_err(|e| signal_fault("screensaver", e))?;
        Ok(u64::from(info.ms_since_user_input / 1000))
    }
}

impl WindowSignalSource for X11Source {
    fn sample(&self) -> Result<WindowSample> {
        let idle_seconds = self.idle_seconds()?;
        let Some(window) = self.active_window()? else {
            return Ok(WindowSample {
                app_id: UNKNOWN_APP.to_string(),
                window_title: None,
                idle_seconds,
            });
        };

        let app_id = self
            .app_class(window)?
            .map_or_else(|| UNKNOWN_APP.to_string(), |class| normalize_app_id(&class));

        Ok(WindowSample {
            app_id,
            window_title: self.title(window)?,
            idle_seconds,
        })
    }

    fn backend_name(&self) -> &'static str {
        "x11"
    }
}
