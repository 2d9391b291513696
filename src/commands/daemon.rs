use clap::Subcommand;
use dwell::daemon::{self, DaemonOptions, StartOutcome};
use dwell::{DataPaths, Result};

use super::print_json;

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Run in the foreground until interrupted
    Run {
        /// Terminate blocked apps instead of only logging them
        #[arg(long)]
        enforce: bool,
        /// Deliver reminders through notify-send
        #[arg(long)]
        notify: bool,
    },
    /// Start in the background
    Start,
    /// Stop the background daemon
    Stop,
    /// Report whether the daemon is running
    Status,
}

pub fn run(action: DaemonAction) -> Result<()> {
    let paths = DataPaths::resolve()?;

    match action {
        DaemonAction::Run { enforce, notify } => {
            let options = DaemonOptions {
                enforce,
                desktop_notifications: notify,
            };
            daemon::run(&paths, &options)?;
        }
        DaemonAction::Start => match daemon::start_detached(&paths)? {
            StartOutcome::Started { pid } => println!("Daemon started (pid {pid})"),
            StartOutcome::AlreadyRunning { pid } => println!("Daemon already running (pid {pid})"),
        },
        DaemonAction::Stop => {
            if daemon::stop(&paths)? {
                println!("Daemon stopped");
            } else {
                println!("Daemon is not running");
            }
        }
        DaemonAction::Status => print_json(&daemon::status(&paths)?)?,
    }
    Ok(())
}
