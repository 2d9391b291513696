use clap::{Parser, Subcommand};
use env_logger::Env;

#[allow(clippy::print_stdout, clippy::print_stderr, reason = "CLI output")]
mod commands;

#[derive(Parser)]
#[command(name = "dwell", version, about = "Desktop usage tracker with focus mode")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Background tracker lifecycle
    Daemon {
        #[command(subcommand)]
        action: commands::daemon::DaemonAction,
    },
    /// Usage statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Daily totals for the last few days, oldest first
    Trend {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Focus sessions
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// App categories used by the productivity score
    Category {
        #[command(subcommand)]
        action: commands::category::CategoryAction,
    },
    /// Export daily usage
    Export(commands::export::ExportArgs),
}

/// The daemon logs lifecycle events at `info`. One-shot commands keep stderr quiet
/// unless something goes wrong, since their stdout is often piped.
fn default_log_filter(command: &Commands) -> &'static str {
    match command {
        Commands::Daemon {
            action: commands::daemon::DaemonAction::Run { .. },
        } => "info",
        Commands::Daemon { .. }
        | Commands::Stats { .. }
        | Commands::Trend { .. }
        | Commands::Focus { .. }
        | Commands::Config { .. }
        | Commands::Category { .. }
        | Commands::Export(_) => "warn",
    }
}

#[allow(clippy::print_stderr, reason = "CLI output")]
fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(default_log_filter(&cli.command)))
        .init();

    let result = match cli.command {
        Commands::Daemon { action } => commands::daemon::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Trend { days } => commands::stats::trend(days),
        Commands::Focus { action } => commands::focus::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Category { action } => commands::category::run(action),
        Commands::Export(args) => commands::export::run(&args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
