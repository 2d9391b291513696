use clap::Subcommand;
use dwell::clock::now_ts;
use dwell::focus::presets::{self, APP_PRESETS, DURATION_PRESETS};
use dwell::focus::{FocusController, LogEnforcer};
use dwell::platform::normalize_app_id;
use dwell::Result;
use std::sync::Arc;

use super::{open_store, print_json};

#[derive(Subcommand)]
pub enum FocusAction {
    /// Start a session
    Start {
        /// Preset name (pomodoro, short, medium, long, deep_work) or minutes
        #[arg(default_value = "pomodoro")]
        duration: String,
        /// App presets to block (social, video, browsing, games, all)
        #[arg(long = "preset")]
        presets: Vec<String>,
        /// Individual app identifiers to block
        #[arg(long = "app")]
        apps: Vec<String>,
    },
    /// Cancel the active session
    Stop,
    /// Show the active session
    Status,
    /// Add minutes to the active session
    Extend { minutes: i64 },
    /// List duration and app presets
    Presets,
}

pub fn run(action: FocusAction) -> Result<()> {
    if matches!(action, FocusAction::Presets) {
        for (name, minutes) in DURATION_PRESETS {
            println!("{name:<10} {minutes} min");
        }
        for (name, apps) in APP_PRESETS {
            println!("{name:<10} {}", apps.join(", "));
        }
        return Ok(());
    }

    let (_paths, store) = open_store()?;
    let mut focus = FocusController::new(Arc::new(store), Box::new(LogEnforcer))?;
    let now = now_ts();

    match action {
        FocusAction::Start {
            duration,
            presets: preset_names,
            apps,
        } => {
            let secs = presets::resolve_duration(&duration)?;
            let mut blocked = presets::resolve_apps(&preset_names)?;
            blocked.extend(apps.iter().map(|a| normalize_app_id(a)));
            let session = focus.start(secs, blocked, now)?;
            print_json(&session)?;
        }
        FocusAction::Stop => match focus.stop(now)? {
            Some(session) => print_json(&session)?,
            None => println!("No active focus session"),
        },
        FocusAction::Status => print_json(&focus.status(now)?)?,
        FocusAction::Extend { minutes } => {
            print_json(&focus.extend(presets::extension_secs(minutes)?, now)?)?;
        }
        FocusAction::Presets => {}
    }
    Ok(())
}
