use chrono::{Local, NaiveDate};
use clap::Subcommand;
use dwell::clock::{day_end, day_start, local_date, now_ts};
use dwell::stats::{RangeSpec, StatsEngine};
use dwell::{AppError, Result};

use super::{open_store, print_json};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Per-app totals for today
    Today,
    /// Per-app totals for the last 7 days
    Week,
    /// Per-app totals for this calendar month
    Month,
    /// Per-app totals between two dates (inclusive)
    Range { from: NaiveDate, to: NaiveDate },
    /// Breakdown of one day (default today)
    Day { date: Option<NaiveDate> },
    /// Daily totals for one app
    App {
        app: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Progress towards the daily goal
    Goal { date: Option<NaiveDate> },
    /// Focus session summary
    Focus {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Weekly overview
    Summary,
    /// Productivity score for one day (default today)
    Productivity { date: Option<NaiveDate> },
    /// Compare active time of two days
    Compare { first: NaiveDate, second: NaiveDate },
}

pub(crate) fn date_range(from: NaiveDate, to: NaiveDate) -> Result<RangeSpec> {
    if to < from {
        return Err(AppError::InvalidInput {
            field: "range",
            reason: "end date is before start date".into(),
        });
    }
    Ok(RangeSpec::Custom {
        start_ts: day_start(&Local, from),
        end_ts: day_end(&Local, to),
    })
}

pub fn run(action: StatsAction) -> Result<()> {
    let (_paths, store) = open_store()?;
    let stats = StatsEngine::new(store.reader()?);
    let now = now_ts();
    let today = local_date(&Local, now);

    match action {
        StatsAction::Today => print_json(&stats.rollup(RangeSpec::Today, now)?),
        StatsAction::Week => print_json(&stats.rollup(RangeSpec::Week, now)?),
        StatsAction::Month => print_json(&stats.rollup(RangeSpec::Month, now)?),
        StatsAction::Range { from, to } => print_json(&stats.rollup(date_range(from, to)?, now)?),
        StatsAction::Day { date } => print_json(&stats.day_summary(date.unwrap_or(today))?),
        StatsAction::App { app, days } => print_json(&stats.app_history(&app, days, now)?),
        StatsAction::Goal { date } => print_json(&stats.goal_progress(date.unwrap_or(today))?),
        StatsAction::Focus { days } => print_json(&stats.focus_stats(days, now)?),
        StatsAction::Summary => print_json(&stats.week_summary(now)?),
        StatsAction::Productivity { date } => print_json(&stats.productivity(date.unwrap_or(today))?),
        StatsAction::Compare { first, second } => print_json(&stats.compare_days(first, second)?),
    }
}

pub fn trend(days: u32) -> Result<()> {
    let (_paths, store) = open_store()?;
    let stats = StatsEngine::new(store.reader()?);
    print_json(&stats.trend(days, now_ts())?)
}
