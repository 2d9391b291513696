//! Read-side statistics over persisted intervals.
//!
//! Every query is recomputed from the interval table inside a single read
//! snapshot, so identical data always yields identical results.

pub mod export;

use crate::clock::{dates_between, day_end, day_start, local_date, split_at_midnights};
use crate::db::{IntervalFilter, IntervalPages, StoreReader};
use crate::error::{AppError, Result};
use crate::models::{AppCategory, FocusSession, SessionStatus};
use crate::settings::{self, ConfigKey};
use chrono::{Datelike, Days, Local, NaiveDate, TimeZone};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Time range for a rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// The current local day.
    Today,
    /// The last 7 local days, today included.
    Week,
    /// The current calendar month.
    Month,
    /// Half-open `[start_ts, end_ts)`; intervals are clipped to it.
    Custom { start_ts: i64, end_ts: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_secs: i64,
}

/// Active seconds for one app on one local day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    #[serde(rename = "app_identifier")]
    pub app_id: String,
    #[serde(rename = "duration_seconds")]
    pub duration_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppUsage {
    pub app_id: String,
    pub duration_secs: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub active_secs: i64,
    pub idle_secs: i64,
    pub interval_count: usize,
    pub apps: Vec<AppUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekSummary {
    pub days: Vec<DailyTotal>,
    pub total_secs: i64,
    pub daily_average_secs: i64,
    pub top_apps: Vec<AppUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub date: NaiveDate,
    pub active_minutes: i64,
    pub goal_minutes: i64,
    pub percent: f64,
    pub reached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FocusStats {
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub active: usize,
    pub focused_secs: i64,
    pub completion_rate: f64,
}

/// How an app counts towards the productivity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Productivity {
    Productive,
    Neutral,
    Unproductive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductivityScore {
    pub date: NaiveDate,
    /// Productive time plus half the neutral time, as a share of active time.
    pub score: f64,
    pub productive_secs: i64,
    pub neutral_secs: i64,
    pub unproductive_secs: i64,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayTotals {
    pub date: NaiveDate,
    pub active_secs: i64,
    pub app_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Same,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayComparison {
    pub first: DayTotals,
    pub second: DayTotals,
    pub difference_secs: i64,
    /// Change relative to the first day; zero when the first day has no usage.
    pub percent_change: f64,
    pub direction: Direction,
}

const TOP_APPS: usize = 5;

const PRODUCTIVE_PATTERNS: &[&str] = &[
    "code", "vim", "emacs", "sublime", "idea", "pycharm", "terminal", "konsole", "alacritty",
    "kitty", "libreoffice", "gimp", "inkscape", "blender", "krita", "notion", "obsidian",
    "logseq", "joplin", "thunderbird", "evolution", "geary",
];

const UNPRODUCTIVE_PATTERNS: &[&str] = &[
    "youtube", "netflix", "twitch", "reddit", "twitter", "facebook", "instagram", "tiktok",
    "discord", "slack", "telegram", "steam", "lutris", "game",
];

/// `part` as a percentage of `whole`, to two decimals. Zero when `whole` is not positive.
pub fn percent(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    let basis_points = i128::from(part) * 10_000 / i128::from(whole);
    let clamped = basis_points.clamp(i128::from(i32::MIN), i128::from(i32::MAX));
    i32::try_from(clamped).map_or(0.0, |bp| f64::from(bp) / 100.0)
}

/// Classify an app by name alone. Explicit categories take precedence, see
/// [`StatsEngine::productivity`].
pub fn classify(app_id: &str) -> Productivity {
    let app = app_id.to_lowercase();
    if PRODUCTIVE_PATTERNS.iter().any(|p| app.contains(p)) {
        Productivity::Productive
    } else if UNPRODUCTIVE_PATTERNS.iter().any(|p| app.contains(p)) {
        Productivity::Unproductive
    } else {
        Productivity::Neutral
    }
}

fn recommendation(score: f64) -> &'static str {
    if score >= 80.0 {
        "Excellent focus. Keep it up."
    } else if score >= 60.0 {
        "Good balance. A few more focus sessions would help."
    } else if score >= 40.0 {
        "Room for improvement. Try focus mode more often."
    } else if score >= 20.0 {
        "High distraction. Block the noisiest apps during focus sessions."
    } else {
        "Consider a break from screens."
    }
}

pub struct StatsEngine<Tz: TimeZone = Local> {
    reader: StoreReader,
    tz: Tz,
}

impl StatsEngine<Local> {
    pub fn new(reader: StoreReader) -> Self {
        Self::with_timezone(reader, Local)
    }
}

impl<Tz: TimeZone> StatsEngine<Tz> {
    pub fn with_timezone(reader: StoreReader, tz: Tz) -> Self {
        Self { reader, tz }
    }

    pub fn connection(&self) -> &Connection {
        self.reader.connection()
    }

    /// Resolve `spec` to a concrete `[start, end)` relative to `now`.
    pub fn range(&self, spec: RangeSpec, now: i64) -> Result<(i64, i64)> {
        let today = local_date(&self.tz, now);
        let range = match spec {
            RangeSpec::Today => (day_start(&self.tz, today), day_end(&self.tz, today)),
            RangeSpec::Week => {
                let first = today.checked_sub_days(Days::new(6)).unwrap_or(today);
                (day_start(&self.tz, first), day_end(&self.tz, today))
            }
            RangeSpec::Month => {
                let first = today.with_day(1).unwrap_or(today);
                let next = first.checked_add_months(chrono::Months::new(1)).unwrap_or(today);
                (day_start(&self.tz, first), day_start(&self.tz, next))
            }
            RangeSpec::Custom { start_ts, end_ts } => {
                if end_ts <= start_ts {
                    return Err(AppError::InvalidInput {
                        field: "range",
                        reason: "end must be after start".into(),
                    });
                }
                (start_ts, end_ts)
            }
        };
        Ok(range)
    }

    /// Active seconds per app over the range. Idle time is excluded.
    pub fn rollup(&self, spec: RangeSpec, now: i64) -> Result<BTreeMap<String, i64>> {
        let (start, end) = self.range(spec, now)?;
        self.reader.snapshot(|conn| {
            let mut totals = BTreeMap::new();
            for interval in IntervalPages::new(conn, IntervalFilter::range(start, end)) {
                let interval = interval?;
                if interval.idle {
                    continue;
                }
                let secs = interval.clipped_secs(start, end);
                if secs > 0 {
                    *totals.entry(interval.app_id).or_insert(0) += secs;
                }
            }
            Ok(totals)
        })
    }

    /// Active seconds per app per local day over `[start, end)`, sorted by date then app.
    pub fn daily_buckets(&self, start: i64, end: i64) -> Result<Vec<DailyBucket>> {
        self.reader.snapshot(|conn| self.buckets_in(conn, IntervalFilter::range(start, end)))
    }

    /// Total active seconds for each of the last `days` local days, oldest first.
    /// Days without usage are reported as zero.
    pub fn trend(&self, days: u32, now: i64) -> Result<Vec<DailyTotal>> {
        self.daily_totals(days, now, None)
    }

    pub fn app_history(&self, app_id: &str, days: u32, now: i64) -> Result<Vec<DailyTotal>> {
        self.daily_totals(days, now, Some(app_id))
    }

    pub fn day_summary(&self, date: NaiveDate) -> Result<DaySummary> {
        let (start, end) = (day_start(&self.tz, date), day_end(&self.tz, date));
        self.reader.snapshot(|conn| {
            let mut active = BTreeMap::new();
            let mut idle_secs = 0;
            let mut interval_count = 0;
            for interval in IntervalPages::new(conn, IntervalFilter::range(start, end)) {
                let interval = interval?;
                let secs = interval.clipped_secs(start, end);
                interval_count += 1;
                if interval.idle {
                    idle_secs += secs;
                } else {
                    *active.entry(interval.app_id).or_insert(0) += secs;
                }
            }
            let apps = ranked(active);
            Ok(DaySummary {
                date,
                active_secs: apps.iter().map(|a| a.duration_secs).sum(),
                idle_secs,
                interval_count,
                apps,
            })
        })
    }

    pub fn week_summary(&self, now: i64) -> Result<WeekSummary> {
        let days = self.trend(7, now)?;
        let mut top_apps = ranked(self.rollup(RangeSpec::Week, now)?);
        top_apps.truncate(TOP_APPS);
        let total_secs: i64 = days.iter().map(|d| d.total_secs).sum();
        Ok(WeekSummary {
            daily_average_secs: total_secs / 7,
            total_secs,
            days,
            top_apps,
        })
    }

    /// Active time on `date` against the configured daily goal.
    pub fn goal_progress(&self, date: NaiveDate) -> Result<GoalProgress> {
        let goal_minutes = settings::get(self.reader.connection(), ConfigKey::DailyGoalMinutes)?
            .as_int()
            .unwrap_or_default();
        let active_minutes = self.day_summary(date)?.active_secs / 60;
        Ok(GoalProgress {
            date,
            active_minutes,
            goal_minutes,
            percent: percent(active_minutes, goal_minutes),
            reached: goal_minutes > 0 && active_minutes >= goal_minutes,
        })
    }

    /// Focus sessions started in the last `days` local days.
    pub fn focus_stats(&self, days: u32, now: i64) -> Result<FocusStats> {
        let today = local_date(&self.tz, now);
        let first = today
            .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
            .unwrap_or(today);
        let sessions = FocusSession::find_since(self.reader.connection(), day_start(&self.tz, first))?;

        let mut stats = FocusStats {
            total: sessions.len(),
            ..FocusStats::default()
        };
        for session in &sessions {
            match session.status {
                SessionStatus::Completed => stats.completed += 1,
                SessionStatus::Cancelled => stats.cancelled += 1,
                SessionStatus::Active => stats.active += 1,
            }
            stats.focused_secs += session.elapsed_secs(now).min(session.planned_secs);
        }
        let finished = stats.completed + stats.cancelled;
        stats.completion_rate = percent(
            i64::try_from(stats.completed).unwrap_or(i64::MAX),
            i64::try_from(finished).unwrap_or(i64::MAX),
        );
        Ok(stats)
    }

    /// Score a day's active time. Apps with a stored category count as productive or
    /// unproductive by its flag; the rest are classified by name.
    pub fn productivity(&self, date: NaiveDate) -> Result<ProductivityScore> {
        let summary = self.day_summary(date)?;
        let categories: BTreeMap<String, bool> = AppCategory::find_all(self.reader.connection())?
            .into_iter()
            .map(|c| (c.app_id, c.productive))
            .collect();

        let (mut productive_secs, mut neutral_secs, mut unproductive_secs) = (0, 0, 0);
        for app in &summary.apps {
            let class = match categories.get(&app.app_id) {
                Some(true) => Productivity::Productive,
                Some(false) => Productivity::Unproductive,
                None => classify(&app.app_id),
            };
            match class {
                Productivity::Productive => productive_secs += app.duration_secs,
                Productivity::Neutral => neutral_secs += app.duration_secs,
                Productivity::Unproductive => unproductive_secs += app.duration_secs,
            }
        }

        let score = percent(productive_secs * 2 + neutral_secs, summary.active_secs * 2).min(100.0);
        Ok(ProductivityScore {
            date,
            score,
            productive_secs,
            neutral_secs,
            unproductive_secs,
            recommendation: recommendation(score),
        })
    }

    /// Active time on `second` compared with `first`.
    pub fn compare_days(&self, first: NaiveDate, second: NaiveDate) -> Result<DayComparison> {
        let totals = |date| {
            self.day_summary(date).map(|s| DayTotals {
                date,
                active_secs: s.active_secs,
                app_count: s.apps.len(),
            })
        };
        let (first, second) = (totals(first)?, totals(second)?);
        let difference_secs = second.active_secs - first.active_secs;
        Ok(DayComparison {
            percent_change: percent(difference_secs, first.active_secs),
            direction: match difference_secs.cmp(&0) {
                std::cmp::Ordering::Greater => Direction::Up,
                std::cmp::Ordering::Less => Direction::Down,
                std::cmp::Ordering::Equal => Direction::Same,
            },
            difference_secs,
            first,
            second,
        })
    }

    fn daily_totals(&self, days: u32, now: i64, app_id: Option<&str>) -> Result<Vec<DailyTotal>> {
        if days == 0 {
            return Ok(Vec::new());
        }
        let today = local_date(&self.tz, now);
        let first = today
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(today);

        let mut filter = IntervalFilter::range(day_start(&self.tz, first), day_end(&self.tz, today));
        if let Some(app_id) = app_id {
            filter = filter.for_app(app_id);
        }
        let buckets = self.reader.snapshot(|conn| self.buckets_in(conn, filter))?;

        let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for bucket in buckets {
            *per_day.entry(bucket.date).or_insert(0) += bucket.duration_secs;
        }
        Ok(dates_between(first, today)
            .into_iter()
            .map(|date| DailyTotal {
                date,
                total_secs: per_day.get(&date).copied().unwrap_or(0),
            })
            .collect())
    }

    fn buckets_in(&self, conn: &Connection, filter: IntervalFilter) -> Result<Vec<DailyBucket>> {
        let (start, end) = (
            filter.start_ts.unwrap_or(i64::MIN),
            filter.end_ts.unwrap_or(i64::MAX),
        );
        let mut totals: BTreeMap<(NaiveDate, String), i64> = BTreeMap::new();
        for interval in IntervalPages::new(conn, filter) {
            let interval = interval?;
            if interval.idle {
                continue;
            }
            let clipped = (interval.start_ts.max(start), interval.end_ts.min(end));
            // stored intervals never cross midnight; split anyway for clipped legacy rows
            for (s, e) in split_at_midnights(&self.tz, clipped.0, clipped.1) {
                let key = (local_date(&self.tz, s), interval.app_id.clone());
                *totals.entry(key).or_insert(0) += e - s;
            }
        }
        Ok(totals
            .into_iter()
            .map(|((date, app_id), duration_secs)| DailyBucket {
                date,
                app_id,
                duration_secs,
            })
            .collect())
    }
}

/// Apps by descending duration with their share of the total.
fn ranked(totals: BTreeMap<String, i64>) -> Vec<AppUsage> {
    let sum: i64 = totals.values().sum();
    let mut apps: Vec<AppUsage> = totals
        .into_iter()
        .map(|(app_id, duration_secs)| AppUsage {
            percentage: percent(duration_secs, sum),
            app_id,
            duration_secs,
        })
        .collect();
    apps.sort_by(|a, b| b.duration_secs.cmp(&a.duration_secs).then_with(|| a.app_id.cmp(&b.app_id)));
    apps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::models::UsageInterval;
    use crate::test_utils::{at, setup_test_store, test_tz};
    use chrono::FixedOffset;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn seed(store: &Store, rows: &[(&str, i64, i64, bool)]) {
        store
            .write(|tx| {
                for (app, start, end, idle) in rows {
                    UsageInterval::new(app, None, *start, *end, *idle).insert(tx)?;
                }
                Ok(())
            })
            .unwrap();
    }

    fn engine(store: &Store) -> StatsEngine<FixedOffset> {
        StatsEngine::with_timezone(store.reader().unwrap(), test_tz())
    }

    fn setup() -> (Store, TempDir) {
        setup_test_store()
    }

    #[test]
    fn test_rollup_today_excludes_idle() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(
            &store,
            &[
                ("code", t, t + 600, false),
                ("code", t + 600, t + 900, true),
                ("firefox", t + 900, t + 1200, false),
                ("code", t + 1200, t + 1500, false),
            ],
        );

        let totals = engine(&store).rollup(RangeSpec::Today, t + 2000).unwrap();
        assert_eq!(totals.get("code"), Some(&900));
        assert_eq!(totals.get("firefox"), Some(&300));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn test_rollup_is_deterministic() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(&store, &[("a", t, t + 10, false), ("b", t + 10, t + 25, false)]);

        let stats = engine(&store);
        let first = stats.rollup(RangeSpec::Today, t + 100).unwrap();
        let second = stats.rollup(RangeSpec::Today, t + 100).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_range_clips_intervals() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(&store, &[("a", t, t + 100, false)]);

        let totals = engine(&store)
            .rollup(RangeSpec::Custom { start_ts: t + 40, end_ts: t + 70 }, 0)
            .unwrap();
        assert_eq!(totals.get("a"), Some(&30));

        let bad = engine(&store).rollup(RangeSpec::Custom { start_ts: 5, end_ts: 5 }, 0);
        assert!(matches!(bad, Err(AppError::InvalidInput { .. })));
    }

    #[test]
    fn test_week_and_month_ranges() {
        let (store, _dir) = setup();
        let stats = engine(&store);
        let now = at(2024, 5, 10, 12, 0, 0);

        let (start, end) = stats.range(RangeSpec::Week, now).unwrap();
        assert_eq!(start, at(2024, 5, 4, 0, 0, 0));
        assert_eq!(end, at(2024, 5, 11, 0, 0, 0));

        let (start, end) = stats.range(RangeSpec::Month, now).unwrap();
        assert_eq!(start, at(2024, 5, 1, 0, 0, 0));
        assert_eq!(end, at(2024, 6, 1, 0, 0, 0));
    }

    #[test]
    fn test_trend_has_no_gaps() {
        let (store, _dir) = setup();
        let day1 = at(2024, 5, 8, 10, 0, 0);
        let day3 = at(2024, 5, 10, 10, 0, 0);
        seed(&store, &[("a", day1, day1 + 60, false), ("a", day3, day3 + 120, false)]);

        let trend = engine(&store).trend(5, day3 + 500).unwrap();
        let totals: Vec<i64> = trend.iter().map(|d| d.total_secs).collect();
        assert_eq!(totals, vec![0, 0, 60, 0, 120]);
        assert_eq!(trend[0].date, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        assert_eq!(trend[4].date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert!(engine(&store).trend(0, day3).unwrap().is_empty());
    }

    #[test]
    fn test_day_summary_and_app_history() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(
            &store,
            &[
                ("code", t, t + 300, false),
                ("code", t + 300, t + 400, true),
                ("slack", t + 400, t + 500, false),
            ],
        );

        let stats = engine(&store);
        let summary = stats.day_summary(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()).unwrap();
        assert_eq!(summary.active_secs, 400);
        assert_eq!(summary.idle_secs, 100);
        assert_eq!(summary.interval_count, 3);
        assert_eq!(summary.apps[0].app_id, "code");
        assert!((summary.apps[0].percentage - 75.0).abs() < 1e-9);

        let history = stats.app_history("slack", 2, t).unwrap();
        assert_eq!(history.iter().map(|d| d.total_secs).collect::<Vec<_>>(), vec![0, 100]);
    }

    #[test]
    fn test_goal_progress_uses_configured_goal() {
        let (store, _dir) = setup();
        store
            .write(|tx| settings::set(tx, ConfigKey::DailyGoalMinutes, "10", 0).map(|_| ()))
            .unwrap();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(&store, &[("code", t, t + 600, false)]);

        let progress = engine(&store)
            .goal_progress(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .unwrap();
        assert_eq!(progress.active_minutes, 10);
        assert!(progress.reached);
    }

    #[test]
    fn test_focus_stats_counts_by_status() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        store
            .write(|tx| {
                let mut done = FocusSession::new(t, 600, BTreeSet::new());
                done.save(tx)?;
                done.finish(tx, SessionStatus::Completed, t + 600)?;
                let mut quit = FocusSession::new(t + 1000, 600, BTreeSet::new());
                quit.save(tx)?;
                quit.finish(tx, SessionStatus::Cancelled, t + 1100)
            })
            .unwrap();

        let stats = engine(&store).focus_stats(1, t + 2000).unwrap();
        assert_eq!((stats.total, stats.completed, stats.cancelled), (2, 1, 1));
        assert_eq!(stats.focused_secs, 700);
        assert!((stats.completion_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_is_exact_to_two_decimals() {
        assert!((percent(1, 3) - 33.33).abs() < 1e-9);
        assert!((percent(-50, 200) + 25.0).abs() < 1e-9);
        assert!(percent(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_productivity_weighs_neutral_time_half() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(
            &store,
            &[
                ("code", t, t + 600, false),
                ("nautilus", t + 600, t + 800, false),
                ("discord", t + 800, t + 1000, false),
                ("code", t + 1000, t + 1200, true),
            ],
        );

        let score = engine(&store)
            .productivity(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .unwrap();
        assert_eq!((score.productive_secs, score.neutral_secs, score.unproductive_secs), (600, 200, 200));
        // (600 + 200 / 2) / 1000
        assert!((score.score - 70.0).abs() < 1e-9);
        assert_eq!(score.recommendation, recommendation(70.0));
    }

    #[test]
    fn test_stored_category_overrides_name_patterns() {
        let (store, _dir) = setup();
        let t = at(2024, 5, 10, 9, 0, 0);
        seed(&store, &[("slack", t, t + 300, false), ("code", t + 300, t + 600, false)]);
        store
            .write(|tx| {
                AppCategory::new("slack", "work chat", true)?.save(tx, 0)?;
                AppCategory::new("code", "games", false)?.save(tx, 0)
            })
            .unwrap();

        let score = engine(&store)
            .productivity(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .unwrap();
        assert_eq!((score.productive_secs, score.unproductive_secs), (300, 300));
        assert!((score.score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_day_scores_zero() {
        let (store, _dir) = setup();
        let score = engine(&store)
            .productivity(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .unwrap();
        assert!(score.score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_compare_days_reports_change() {
        let (store, _dir) = setup();
        let mon = at(2024, 5, 6, 9, 0, 0);
        let tue = at(2024, 5, 7, 9, 0, 0);
        seed(
            &store,
            &[
                ("code", mon, mon + 400, false),
                ("code", tue, tue + 300, false),
                ("slack", tue + 300, tue + 600, false),
            ],
        );

        let stats = engine(&store);
        let first = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let second = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        let cmp = stats.compare_days(first, second).unwrap();
        assert_eq!(cmp.difference_secs, 200);
        assert_eq!(cmp.direction, Direction::Up);
        assert!((cmp.percent_change - 50.0).abs() < 1e-9);
        assert_eq!((cmp.first.app_count, cmp.second.app_count), (1, 2));

        let back = stats.compare_days(second, first).unwrap();
        assert_eq!(back.direction, Direction::Down);
        let same = stats.compare_days(first, first).unwrap();
        assert_eq!(same.direction, Direction::Same);
    }
}
