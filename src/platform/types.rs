use crate::error::Result;

/// One observation of the desktop: who is in front and how long input has been absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSample {
    pub app_id: String,
    pub window_title: Option<String>,
    pub idle_seconds: u64,
}

/// Display-server introspection. Implemented once per backend; the tracker only
/// sees this trait.
pub trait WindowSignalSource: Send + Sync {
    fn sample(&self) -> Result<WindowSample>;

    fn backend_name(&self) -> &'static str;
}

/// Lowercase and trim an app identifier so presets match regardless of WM_CLASS casing.
pub fn normalize_app_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}
