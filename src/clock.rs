//! Unix-second timestamps and local calendar-day arithmetic.
//!
//! Everything is generic over [`chrono::TimeZone`] so callers can use `Local` in the
//! daemon and fixed offsets in tests.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Calendar date of `ts` in `tz`.
pub fn local_date<Tz: TimeZone>(tz: &Tz, ts: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .unwrap_or_default()
        .with_timezone(tz)
        .date_naive()
}

/// Timestamp of the first instant of `date` in `tz`.
///
/// When midnight does not exist (DST gap), the first existing hour is used.
pub fn day_start<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    for hour in 0..4 {
        let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
        if let Some(dt) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            return dt.timestamp();
        }
    }
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Start of the local day following `date`.
pub fn day_end<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    day_start(tz, date.checked_add_days(Days::new(1)).unwrap_or(date))
}

/// First local midnight strictly after `ts`.
pub fn next_midnight<Tz: TimeZone>(tz: &Tz, ts: i64) -> i64 {
    day_end(tz, local_date(tz, ts))
}

/// Split `[start, end)` at every local midnight inside it. Empty spans are dropped.
pub fn split_at_midnights<Tz: TimeZone>(tz: &Tz, start: i64, end: i64) -> Vec<(i64, i64)> {
    let mut pieces = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let boundary = next_midnight(tz, cursor).min(end);
        // guard against a non-advancing boundary from odd zone data
        let boundary = if boundary <= cursor { end } else { boundary };
        pieces.push((cursor, boundary));
        cursor = boundary;
    }
    pieces
}

/// Inclusive list of dates from `first` to `last`.
pub fn dates_between(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    first.iter_days().take_while(|d| *d <= last).collect()
}
