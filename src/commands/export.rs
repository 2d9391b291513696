use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use dwell::clock::now_ts;
use dwell::stats::{export, RangeSpec, StatsEngine};
use dwell::Result;
use std::path::PathBuf;

use super::open_store;
use super::stats::date_range;

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Json,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Period {
    Today,
    Week,
    Month,
}

#[derive(Args)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value = "json")]
    format: Format,
    #[arg(long, value_enum, default_value = "week", conflicts_with_all = ["from", "to"])]
    period: Period,
    /// First day (inclusive); requires --to
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,
    /// Last day (inclusive)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,
    /// Write to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

pub fn run(args: &ExportArgs) -> Result<()> {
    let (_paths, store) = open_store()?;
    let stats = StatsEngine::new(store.reader()?);

    let spec = match (args.from, args.to) {
        (Some(from), Some(to)) => date_range(from, to)?,
        _ => match args.period {
            Period::Today => RangeSpec::Today,
            Period::Week => RangeSpec::Week,
            Period::Month => RangeSpec::Month,
        },
    };
    let (start, end) = stats.range(spec, now_ts())?;
    let buckets = stats.daily_buckets(start, end)?;

    let text = match args.format {
        Format::Json => export::to_json(start, end, &buckets)?,
        Format::Csv => export::to_csv(&buckets)?,
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, text)?;
            eprintln!("Exported {} row(s) to {}", buckets.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
