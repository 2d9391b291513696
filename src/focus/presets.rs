use crate::constants::MAX_FOCUS_MINUTES;
use crate::error::{AppError, Result};
use std::collections::BTreeSet;

/// Named session lengths, in minutes.
pub const DURATION_PRESETS: &[(&str, i64)] = &[
    ("pomodoro", 25),
    ("short", 15),
    ("medium", 45),
    ("long", 60),
    ("deep_work", 90),
];

/// Named sets of app identifiers to block.
pub const APP_PRESETS: &[(&str, &[&str])] = &[
    ("social", &["discord", "slack", "telegram", "signal"]),
    ("video", &["youtube", "netflix", "vlc", "mpv", "totem"]),
    ("browsing", &["firefox", "chromium", "chrome", "brave"]),
    ("games", &["steam", "lutris", "retroarch"]),
    (
        "all",
        &["discord", "slack", "telegram", "youtube", "firefox", "chromium", "steam"],
    ),
];

fn unknown(name: &str) -> AppError {
    AppError::UnknownPreset {
        name: name.to_string(),
    }
}

/// Duration of a named preset, in seconds.
pub fn duration(name: &str) -> Result<i64> {
    DURATION_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, minutes)| minutes * 60)
        .ok_or_else(|| unknown(name))
}

pub fn apps(name: &str) -> Result<BTreeSet<String>> {
    APP_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, ids)| ids.iter().map(ToString::to_string).collect())
        .ok_or_else(|| unknown(name))
}

/// Accept either a preset name or a plain number of minutes.
pub fn resolve_duration(arg: &str) -> Result<i64> {
    let Ok(minutes) = arg.trim().parse::<i64>() else {
        return duration(arg.trim());
    };
    if !(1..=MAX_FOCUS_MINUTES).contains(&minutes) {
        return Err(AppError::InvalidInput {
            field: "duration",
            reason: format!("must be between 1 and {MAX_FOCUS_MINUTES} minutes"),
        });
    }
    Ok(minutes * 60)
}

/// Seconds for an extension of `minutes`, rejecting values that do not fit.
pub fn extension_secs(minutes: i64) -> Result<i64> {
    minutes
        .checked_mul(60)
        .filter(|secs| *secs > 0)
        .ok_or_else(|| AppError::InvalidInput {
            field: "minutes",
            reason: format!("must be a positive number of minutes, got {minutes}"),
        })
}

/// Union of the named app presets.
pub fn resolve_apps<S: AsRef<str>>(names: &[S]) -> Result<BTreeSet<String>> {
    let mut resolved = BTreeSet::new();
    for name in names {
        resolved.extend(apps(name.as_ref())?);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_presets() {
        assert_eq!(duration("pomodoro").unwrap(), 1500);
        assert_eq!(duration("deep_work").unwrap(), 5400);
    }

    #[test]
    fn test_unknown_preset_fails() {
        assert!(matches!(duration("nap"), Err(AppError::UnknownPreset { name }) if name == "nap"));
        assert!(matches!(apps("music"), Err(AppError::UnknownPreset { .. })));
    }

    #[test]
    fn test_resolve_duration_accepts_minutes() {
        assert_eq!(resolve_duration("10").unwrap(), 600);
        assert_eq!(resolve_duration("short").unwrap(), 900);
        assert!(matches!(resolve_duration("0"), Err(AppError::InvalidInput { .. })));
        assert!(matches!(resolve_duration("1441"), Err(AppError::InvalidInput { .. })));
    }

    #[test]
    fn test_resolve_apps_unions_presets() {
        let apps = resolve_apps(&["social", "games"]).unwrap();
        assert!(apps.contains("discord"));
        assert!(apps.contains("steam"));
        assert_eq!(apps.len(), 7);
    }

    #[test]
    fn test_extension_secs_rejects_overflow() {
        assert_eq!(extension_secs(5).unwrap(), 300);
        assert!(matches!(extension_secs(i64::MAX), Err(AppError::InvalidInput { .. })));
        assert!(matches!(extension_secs(0), Err(AppError::InvalidInput { .. })));
    }
}
