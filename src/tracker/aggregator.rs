use crate::clock::split_at_midnights;
use crate::constants::{MAX_WRITE_RETRIES, SUSPEND_GAP_SECS};
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{OpenInterval, UsageInterval};
use chrono::{Local, TimeZone};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::sync::Arc;

use super::Sample;

/// The interval currently being extended by incoming samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSpan {
    pub app_id: String,
    pub window_title: Option<String>,
    pub idle: bool,
    pub start_ts: i64,
}

impl OpenSpan {
    fn from_sample(sample: &Sample) -> Self {
        Self {
            app_id: sample.app_id.clone(),
            window_title: sample.window_title.clone(),
            idle: sample.idle,
            start_ts: sample.ts,
        }
    }

    fn matches(&self, sample: &Sample) -> bool {
        self.app_id == sample.app_id && self.idle == sample.idle
    }

    fn marker(&self, last_seen: i64) -> OpenInterval {
        OpenInterval {
            app_id: self.app_id.clone(),
            window_title: self.window_title.clone(),
            start_ts: self.start_ts,
            last_seen,
            idle: self.idle,
        }
    }

    /// Closed pieces for `[start_ts, end)`, one per local day.
    fn close_at<Tz: TimeZone>(&self, tz: &Tz, end: i64) -> Vec<UsageInterval> {
        pieces(tz, &self.app_id, self.window_title.as_deref(), self.start_ts, end, self.idle)
    }
}

fn pieces<Tz: TimeZone>(
    tz: &Tz,
    app_id: &str,
    title: Option<&str>,
    start: i64,
    end: i64,
    idle: bool,
) -> Vec<UsageInterval> {
    split_at_midnights(tz, start, end)
        .into_iter()
        .map(|(s, e)| UsageInterval::new(app_id, title, s, e, idle))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalState {
    NoOpenInterval,
    Open(OpenSpan),
}

#[derive(Clone)]
enum MarkerUpdate {
    Set(OpenInterval),
    Touch(i64),
    Clear,
}

impl MarkerUpdate {
    fn apply(&self, conn: &Connection) -> Result<()> {
        match self {
            Self::Set(marker) => marker.upsert(conn),
            Self::Touch(ts) => OpenInterval::touch(conn, *ts),
            Self::Clear => OpenInterval::clear(conn),
        }
    }
}

struct PendingWrite {
    pieces: Vec<UsageInterval>,
    attempts: u32,
}

/// Turns the sample stream into closed, non-overlapping, single-day intervals.
///
/// Owns the only mutable copy of the open interval. Every transition commits the
/// closed pieces and the open-interval marker in one store transaction.
pub struct IntervalAggregator<Tz: TimeZone = Local> {
    store: Arc<Store>,
    tz: Tz,
    state: IntervalState,
    last_sample_ts: Option<i64>,
    /// Latest instant already attributed to some interval. New spans never start
    /// before it, so a clock stepping back cannot count the same wall time twice.
    high_water: Option<i64>,
    suspend_gap_secs: i64,
    pending: Option<PendingWrite>,
    /// The stored marker lags the in-memory state and must be rewritten in full.
    marker_stale: bool,
    lost_intervals: u64,
}

impl IntervalAggregator<Local> {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_timezone(store, Local)
    }
}

impl<Tz: TimeZone> IntervalAggregator<Tz> {
    pub fn with_timezone(store: Arc<Store>, tz: Tz) -> Self {
        Self {
            store,
            tz,
            state: IntervalState::NoOpenInterval,
            last_sample_ts: None,
            high_water: None,
            suspend_gap_secs: SUSPEND_GAP_SECS,
            pending: None,
            marker_stale: false,
            lost_intervals: 0,
        }
    }

    /// Gaps between samples longer than this are treated as downtime.
    pub fn set_poll_interval(&mut self, poll_secs: u64) {
        let three_polls = i64::try_from(poll_secs.saturating_mul(3)).unwrap_or(i64::MAX);
        self.suspend_gap_secs = three_polls.max(SUSPEND_GAP_SECS);
    }

    pub fn state(&self) -> &IntervalState {
        &self.state
    }

    pub fn current(&self) -> Option<&OpenSpan> {
        match &self.state {
            IntervalState::Open(span) => Some(span),
            IntervalState::NoOpenInterval => None,
        }
    }

    pub fn lost_intervals(&self) -> u64 {
        self.lost_intervals
    }

    /// Close an interval left open by a previous process.
    ///
    /// Time up to the last heartbeat keeps its recorded idle flag. Whatever lies
    /// between the heartbeat and `start + max_gap` (never past `now`) is unknown and
    /// persisted as idle.
    pub fn recover(&mut self, max_gap_secs: i64, now: i64) -> Result<usize> {
        let Some(marker) = OpenInterval::load(self.store.reader()?.connection())? else {
            return Ok(0);
        };

        let start = marker.start_ts;
        let known_end = marker.last_seen.clamp(start, now.max(start));
        let unknown_end = start.saturating_add(max_gap_secs.max(0)).min(now);
        let title = marker.window_title.as_deref();

        let mut closed = pieces(&self.tz, &marker.app_id, title, start, known_end, marker.idle);
        if unknown_end > known_end {
            closed.extend(pieces(&self.tz, &marker.app_id, title, known_end, unknown_end, true));
        }

        let mut persisted = 0;
        self.store.write(|tx| {
            for piece in &mut closed {
                match piece.insert(tx) {
                    Ok(()) => persisted += 1,
                    Err(e @ AppError::Integrity { .. }) => error!("Recovery skipped interval: {e}"),
                    Err(e) => return Err(e),
                }
            }
            OpenInterval::clear(tx)
        })?;

        let closed_at = known_end.max(unknown_end);
        self.raise_high_water(closed_at);
        info!(
            "Recovered open interval for '{}' started at {start}: {persisted} piece(s) closed at {closed_at}",
            marker.app_id
        );
        Ok(persisted)
    }

    /// Apply one sample.
    ///
    /// State always advances. An `Integrity` error means a closed interval was
    /// rejected by the store and dropped; it is returned so the caller can report it.
    pub fn handle(&mut self, sample: Sample) -> Result<()> {
        let retry_failed = !self.retry_pending();
        let mut closed = Vec::new();

        if let Some(last) = self.last_sample_ts {
            let accounted = self.high_water.unwrap_or(last);
            if sample.ts < last {
                warn!(
                    "Clock moved backwards ({last} -> {}), no new interval starts before {accounted}",
                    sample.ts
                );
                closed.extend(self.take_open_until(accounted));
            } else if sample.ts - last > self.suspend_gap_secs {
                info!("Sample gap of {}s, treating as downtime", sample.ts - last);
                closed.extend(self.take_open_until(accounted));
            }
        }

        self.last_sample_ts = Some(sample.ts);
        let ts = self.high_water.map_or(sample.ts, |hw| sample.ts.max(hw));
        let sample = Sample { ts, ..sample };

        let marker = match &mut self.state {
            IntervalState::NoOpenInterval => {
                let span = OpenSpan::from_sample(&sample);
                let marker = MarkerUpdate::Set(span.marker(ts));
                self.state = IntervalState::Open(span);
                marker
            }
            IntervalState::Open(span) if span.matches(&sample) => {
                let crossed = span.close_at(&self.tz, ts);
                if crossed.len() > 1 {
                    // carry the span over midnight: persist finished days, reopen at
                    // the start of the current one
                    let (finished, today) = crossed.split_at(crossed.len() - 1);
                    closed.extend_from_slice(finished);
                    span.start_ts = today.first().map_or(ts, |t| t.start_ts);
                    MarkerUpdate::Set(span.marker(ts))
                } else {
                    MarkerUpdate::Touch(ts)
                }
            }
            IntervalState::Open(span) => {
                closed.extend(span.close_at(&self.tz, ts));
                let next = OpenSpan::from_sample(&sample);
                debug!(
                    "Interval switch {}({}) -> {}({}) at {ts}",
                    span.app_id, span.idle, next.app_id, next.idle
                );
                let marker = MarkerUpdate::Set(next.marker(ts));
                *span = next;
                marker
            }
        };

        self.raise_high_water(ts);
        self.commit(closed, &marker, retry_failed)
    }

    /// Close the open interval at `now` (or at the last sample if the gap since is
    /// downtime) and persist everything. Used on shutdown.
    pub fn flush(&mut self, now: i64) -> Result<()> {
        let retry_failed = !self.retry_pending();
        let end = match (self.last_sample_ts, self.high_water) {
            (Some(last), Some(accounted)) if now < last || now - last > self.suspend_gap_secs => accounted,
            _ => now,
        };
        let closed = self.take_open_until(end);
        let result = self.commit(closed, &MarkerUpdate::Clear, retry_failed);

        if let Some(pending) = self.pending.take() {
            error!(
                "Dropping {} unpersisted interval piece(s) on flush",
                pending.pieces.len()
            );
            self.lost_intervals += 1;
        }
        result
    }

    /// Delete closed intervals that ended before `cutoff`.
    pub fn prune(&self, cutoff: i64) -> Result<usize> {
        let removed = self
            .store
            .write(|tx| UsageInterval::delete_ended_before(tx, cutoff))?;
        if removed > 0 {
            info!("Pruned {removed} interval(s) older than {cutoff}");
        }
        Ok(removed)
    }

    fn raise_high_water(&mut self, ts: i64) {
        self.high_water = Some(self.high_water.map_or(ts, |hw| hw.max(ts)));
    }

    fn take_open_until(&mut self, end: i64) -> Vec<UsageInterval> {
        match std::mem::replace(&mut self.state, IntervalState::NoOpenInterval) {
            IntervalState::Open(span) => {
                let closed = span.close_at(&self.tz, end);
                if closed.is_empty() {
                    debug!("Discarding zero-width interval for '{}' at {end}", span.app_id);
                }
                closed
            }
            IntervalState::NoOpenInterval => Vec::new(),
        }
    }

    /// The marker describing the in-memory state as a whole.
    fn full_marker(&self) -> MarkerUpdate {
        match &self.state {
            IntervalState::Open(span) => {
                let last_seen = self.high_water.map_or(span.start_ts, |hw| hw.max(span.start_ts));
                MarkerUpdate::Set(span.marker(last_seen))
            }
            IntervalState::NoOpenInterval => MarkerUpdate::Clear,
        }
    }

    fn commit(&mut self, mut closed: Vec<UsageInterval>, marker: &MarkerUpdate, retry_failed: bool) -> Result<()> {
        // a touch only moves last_seen, which is wrong if the stored marker names an older span
        let marker = if self.marker_stale { self.full_marker() } else { marker.clone() };
        if closed.is_empty() {
            return self.write_marker(&marker);
        }

        if retry_failed {
            // keep ordering: nothing newer may land while an older write is pending
            self.buffer(closed);
            self.marker_stale = true;
            return Ok(());
        }

        let result = self.store.write(|tx| {
            for piece in &mut closed {
                piece.insert(tx)?;
            }
            marker.apply(tx)
        });

        match result {
            Ok(()) => {
                self.marker_stale = false;
                Ok(())
            }
            Err(e @ AppError::Integrity { .. }) => {
                error!("Rejected interval write: {e}");
                self.lost_intervals += 1;
                self.write_marker(&marker)?;
                Err(e)
            }
            Err(e) if e.is_retryable() => {
                warn!("Store unavailable, buffering closed interval: {e}");
                self.buffer(closed);
                self.marker_stale = true;
                Ok(())
            }
            Err(e) => {
                error!("Failed to persist interval: {e}");
                self.lost_intervals += 1;
                self.marker_stale = true;
                Err(e)
            }
        }
    }

    fn write_marker(&mut self, marker: &MarkerUpdate) -> Result<()> {
        match self.store.write(|tx| marker.apply(tx)) {
            Ok(()) => {
                self.marker_stale = false;
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                debug!("Open interval marker not updated: {e}");
                self.marker_stale = true;
                Ok(())
            }
            Err(e) => {
                self.marker_stale = true;
                Err(e)
            }
        }
    }

    fn buffer(&mut self, pieces: Vec<UsageInterval>) {
        if let Some(dropped) = self.pending.replace(PendingWrite { pieces, attempts: 1 }) {
            error!(
                "Dropping buffered interval for '{}' to make room",
                dropped.pieces.first().map_or("?", |p| p.app_id.as_str())
            );
            self.lost_intervals += 1;
        }
    }

    /// Try the pending write again, bringing a stale marker up to date in the same
    /// transaction. Returns false if the write is still pending.
    fn retry_pending(&mut self) -> bool {
        let Some(mut pending) = self.pending.take() else {
            return true;
        };

        let marker = self.marker_stale.then(|| self.full_marker());
        let result = self.store.write(|tx| {
            for piece in &mut pending.pieces {
                piece.insert(tx)?;
            }
            marker.as_ref().map_or(Ok(()), |m| m.apply(tx))
        });

        match result {
            Ok(()) => {
                info!("Persisted buffered interval after {} attempt(s)", pending.attempts + 1);
                if marker.is_some() {
                    self.marker_stale = false;
                }
                true
            }
            Err(e) if e.is_retryable() => {
                pending.attempts += 1;
                if pending.attempts >= MAX_WRITE_RETRIES {
                    error!("Giving up on buffered interval after {} attempts: {e}", pending.attempts);
                    self.lost_intervals += 1;
                    true
                } else {
                    self.pending = Some(pending);
                    false
                }
            }
            Err(e) => {
                error!("Buffered interval rejected: {e}");
                self.lost_intervals += 1;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::IntervalFilter;
    use crate::test_utils::{at, setup_test_store, test_tz};
    use chrono::FixedOffset;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (IntervalAggregator<FixedOffset>, Arc<Store>, TempDir) {
        let (store, dir) = setup_test_store();
        let store = Arc::new(store);
        let aggregator = IntervalAggregator::with_timezone(Arc::clone(&store), test_tz());
        (aggregator, store, dir)
    }

    /// An aggregator whose store gives up on a held write lock at once.
    fn setup_contended() -> (IntervalAggregator<FixedOffset>, Arc<Store>, Connection, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = Arc::new(Store::open_with_busy_timeout(&db_path, Duration::ZERO).unwrap());
        let aggregator = IntervalAggregator::with_timezone(Arc::clone(&store), test_tz());
        let holder = Connection::open(&db_path).unwrap();
        (aggregator, store, holder, dir)
    }

    fn write_marker(store: &Store, app: &str, start_ts: i64, last_seen: i64) {
        store
            .write(|tx| {
                OpenInterval {
                    app_id: app.into(),
                    window_title: None,
                    start_ts,
                    last_seen,
                    idle: false,
                }
                .upsert(tx)
            })
            .unwrap();
    }

    fn sample(app: &str, idle: bool, ts: i64) -> Sample {
        Sample {
            app_id: app.to_string(),
            window_title: None,
            idle,
            ts,
        }
    }

    fn persisted(store: &Store) -> Vec<UsageInterval> {
        let reader = store.reader().unwrap();
        reader
            .intervals(IntervalFilter::default())
            .collect::<Result<_>>()
            .unwrap()
    }

    fn marker(store: &Store) -> Option<OpenInterval> {
        OpenInterval::load(store.reader().unwrap().connection()).unwrap()
    }

    #[test]
    fn test_app_switch_closes_previous_interval() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        agg.handle(sample("a", false, t + 5)).unwrap();
        agg.handle(sample("b", false, t + 5)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].app_id.as_str(), closed[0].start_ts, closed[0].end_ts), ("a", t, t + 5));
        assert!(!closed[0].idle);

        let open = agg.current().unwrap();
        assert_eq!((open.app_id.as_str(), open.start_ts), ("b", t + 5));
        assert_eq!(marker(&store).unwrap().start_ts, t + 5);
    }

    #[test]
    fn test_idle_flip_opens_idle_interval() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        agg.handle(sample("a", true, t + 60)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert!(!closed[0].idle);
        let open = agg.current().unwrap();
        assert!(open.idle);
        assert_eq!(open.start_ts, t + 60);
    }

    #[test]
    fn test_zero_width_switch_is_discarded() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        agg.handle(sample("b", false, t)).unwrap();
        agg.handle(sample("c", false, t + 3)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1, "a had zero width and must not be stored");
        assert_eq!(closed[0].app_id, "b");
    }

    #[test]
    fn test_switch_across_midnight_yields_two_pieces() {
        let (mut agg, store, _dir) = setup();
        let before = at(2024, 5, 1, 23, 50, 0);
        let midnight = at(2024, 5, 2, 0, 0, 0);
        let after = at(2024, 5, 2, 0, 2, 0);

        agg.handle(sample("a", false, before)).unwrap();
        // keep the gap below the suspend threshold
        for ts in (before..after).step_by(60).skip(1) {
            agg.handle(sample("a", false, ts)).unwrap();
        }
        agg.handle(sample("b", false, after)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 2);
        assert_eq!((closed[0].start_ts, closed[0].end_ts), (before, midnight));
        assert_eq!((closed[1].start_ts, closed[1].end_ts), (midnight, after));
    }

    #[test]
    fn test_same_app_over_midnight_reopens_at_midnight() {
        let (mut agg, store, _dir) = setup();
        let before = at(2024, 5, 1, 23, 59, 58);
        let midnight = at(2024, 5, 2, 0, 0, 0);

        agg.handle(sample("a", false, before)).unwrap();
        agg.handle(sample("a", false, midnight + 3)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].start_ts, closed[0].end_ts), (before, midnight));
        assert_eq!(agg.current().unwrap().start_ts, midnight);
        assert_eq!(marker(&store).unwrap().start_ts, midnight);
    }

    #[test]
    fn test_suspend_gap_closes_at_last_sample() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        agg.handle(sample("a", false, t + 5)).unwrap();
        agg.handle(sample("a", false, t + 5 + 3600)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].end_ts, t + 5, "downtime is not counted");
        assert_eq!(agg.current().unwrap().start_ts, t + 5 + 3600);
    }

    #[test]
    fn test_backwards_clock_closes_at_last_sample() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        agg.handle(sample("a", false, t + 10)).unwrap();
        agg.handle(sample("b", false, t - 100)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].start_ts, closed[0].end_ts), (t, t + 10));
        assert_eq!(agg.current().unwrap().app_id, "b");
    }

    #[test]
    fn test_flush_closes_open_interval_and_clears_marker() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        agg.handle(sample("a", false, t + 5)).unwrap();
        agg.flush(t + 7).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].end_ts, t + 7);
        assert!(agg.current().is_none());
        assert!(marker(&store).is_none());
    }

    #[test]
    fn test_recover_splits_known_and_unknown_time() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);
        store
            .write(|tx| {
                OpenInterval {
                    app_id: "a".into(),
                    window_title: Some("doc".into()),
                    start_ts: t,
                    last_seen: t + 600,
                    idle: false,
                }
                .upsert(tx)
            })
            .unwrap();

        let closed_count = agg.recover(3600, t + 86_400).unwrap();
        assert_eq!(closed_count, 2);

        let closed = persisted(&store);
        assert_eq!((closed[0].start_ts, closed[0].end_ts, closed[0].idle), (t, t + 600, false));
        assert_eq!((closed[1].start_ts, closed[1].end_ts, closed[1].idle), (t + 600, t + 3600, true));
        assert!(marker(&store).is_none(), "no interval remains open");
    }

    #[test]
    fn test_recover_never_extends_past_now() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);
        store
            .write(|tx| {
                OpenInterval {
                    app_id: "a".into(),
                    window_title: None,
                    start_ts: t,
                    last_seen: t,
                    idle: false,
                }
                .upsert(tx)
            })
            .unwrap();

        agg.recover(3600, t + 120).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].end_ts, closed[0].idle), (t + 120, true));
    }

    #[test]
    fn test_recover_without_marker_is_noop() {
        let (mut agg, _store, _dir) = setup();
        assert_eq!(agg.recover(3600, 1_000).unwrap(), 0);
    }

    #[test]
    fn test_integrity_error_is_reported_and_state_advances() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);
        store
            .write(|tx| UsageInterval::new("a", None, t + 2, t + 4, false).insert(tx))
            .unwrap();

        agg.handle(sample("a", false, t)).unwrap();
        let result = agg.handle(sample("b", false, t + 5));

        assert!(matches!(result, Err(AppError::Integrity { .. })));
        assert_eq!(agg.current().unwrap().app_id, "b");
        assert_eq!(agg.lost_intervals(), 1);
        assert_eq!(persisted(&store).len(), 1, "existing record untouched");
    }

    #[test]
    fn test_random_walk_never_overlaps_or_zero_width() {
        let (mut agg, store, _dir) = setup();
        let apps = ["a", "b", "c"];
        let mut ts = at(2024, 5, 1, 22, 0, 0);
        let mut seed: u64 = 42;

        for _ in 0..800 {
            // small LCG so the walk is deterministic
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let pick = usize::try_from((seed >> 33) % 3).unwrap();
            let idle = (seed >> 40) % 5 == 0;
            ts += i64::try_from((seed >> 20) % 20).unwrap();
            let _ = agg.handle(sample(apps[pick], idle, ts));
        }
        agg.flush(ts + 1).unwrap();

        let closed = persisted(&store);
        assert!(!closed.is_empty());
        for app in apps {
            let mine: Vec<_> = closed.iter().filter(|i| i.app_id == app).collect();
            assert!(mine.iter().all(|i| i.end_ts > i.start_ts));
            assert!(mine.windows(2).all(|w| w[0].end_ts <= w[1].start_ts));
        }
        assert_eq!(agg.lost_intervals(), 0);
    }

    #[test]
    fn test_recover_keeps_heartbeat_time_beyond_max_gap() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);
        write_marker(&store, "code", t, t + 7200);

        assert_eq!(agg.recover(3600, t + 86_400).unwrap(), 1);

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].start_ts, closed[0].end_ts, closed[0].idle), (t, t + 7200, false));
    }

    #[test]
    fn test_clock_step_back_never_double_counts_wall_time() {
        let (mut agg, store, _dir) = setup();
        let t = at(2024, 5, 1, 10, 0, 0);

        for ts in (t..=t + 120).step_by(10) {
            agg.handle(sample("a", false, ts)).unwrap();
        }
        // clock jumps back two minutes, another app comes to the front
        for ts in (t..=t + 120).step_by(10) {
            agg.handle(sample("b", false, ts)).unwrap();
        }
        agg.handle(sample("c", false, t + 130)).unwrap();

        let closed = persisted(&store);
        let total: i64 = closed.iter().map(UsageInterval::duration_secs).sum();
        assert!(total <= 130, "stored {total}s over a 130s wall span: {closed:?}");
        assert_eq!((closed[0].app_id.as_str(), closed[0].end_ts), ("a", t + 120));
        assert!(closed.iter().filter(|i| i.app_id == "b").all(|i| i.start_ts >= t + 120));
        assert_eq!(agg.lost_intervals(), 0);
    }

    #[test]
    fn test_unavailable_store_buffers_then_retries() {
        let (mut agg, store, holder, _dir) = setup_contended();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        agg.handle(sample("b", false, t + 10)).unwrap();
        assert!(persisted(&store).is_empty(), "write is held back while the lock is taken");

        holder.execute_batch("COMMIT").unwrap();
        agg.handle(sample("b", false, t + 15)).unwrap();

        let closed = persisted(&store);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].app_id.as_str(), closed[0].start_ts, closed[0].end_ts), ("a", t, t + 10));
        assert_eq!(agg.lost_intervals(), 0);

        let stored = marker(&store).unwrap();
        assert_eq!((stored.app_id.as_str(), stored.start_ts, stored.last_seen), ("b", t + 10, t + 15));
    }

    #[test]
    fn test_marker_follows_new_span_after_outage() {
        let (mut agg, store, holder, _dir) = setup_contended();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        agg.handle(sample("b", false, t + 10)).unwrap();
        holder.execute_batch("COMMIT").unwrap();
        agg.handle(sample("b", false, t + 15)).unwrap();
        agg.handle(sample("b", false, t + 20)).unwrap();

        // crash here: a fresh process recovers b, not a second copy of a
        let mut next = IntervalAggregator::with_timezone(Arc::clone(&store), test_tz());
        assert_eq!(next.recover(3600, t + 25).unwrap(), 2);

        let closed = persisted(&store);
        let spans: Vec<_> = closed
            .iter()
            .map(|i| (i.app_id.as_str(), i.start_ts, i.end_ts, i.idle))
            .collect();
        assert_eq!(
            spans,
            vec![("a", t, t + 10, false), ("b", t + 10, t + 20, false), ("b", t + 20, t + 25, true)]
        );
    }

    #[test]
    fn test_buffered_write_is_dropped_after_max_retries() {
        let (mut agg, store, holder, _dir) = setup_contended();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        agg.handle(sample("b", false, t + 10)).unwrap();

        // the first failed attempt buffered it; each later sample retries once more
        for i in 1..MAX_WRITE_RETRIES - 1 {
            agg.handle(sample("b", false, t + 10 + i64::from(i))).unwrap();
            assert_eq!(agg.lost_intervals(), 0, "still pending after attempt {}", i + 1);
        }
        agg.handle(sample("b", false, t + 20)).unwrap();
        assert_eq!(agg.lost_intervals(), 1);

        holder.execute_batch("COMMIT").unwrap();
        agg.handle(sample("b", false, t + 25)).unwrap();
        assert!(persisted(&store).is_empty(), "the dropped interval is never written");
        assert_eq!(agg.lost_intervals(), 1);
    }

    #[test]
    fn test_second_close_during_outage_displaces_buffer() {
        let (mut agg, _store, holder, _dir) = setup_contended();
        let t = at(2024, 5, 1, 10, 0, 0);

        agg.handle(sample("a", false, t)).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        agg.handle(sample("b", false, t + 10)).unwrap();
        agg.handle(sample("c", false, t + 20)).unwrap();

        assert_eq!(agg.lost_intervals(), 1);
        holder.execute_batch("COMMIT").unwrap();
    }
}
