use crate::constants::QUERY_PAGE_SIZE;
use crate::error::Result;
use crate::models::UsageInterval;
use rusqlite::{params, Connection};
use std::collections::VecDeque;

/// Selects closed intervals that overlap `[start_ts, end_ts)`, optionally for one app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalFilter {
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub app_id: Option<String>,
}

impl IntervalFilter {
    pub fn range(start_ts: i64, end_ts: i64) -> Self {
        Self {
            start_ts: Some(start_ts),
            end_ts: Some(end_ts),
            app_id: None,
        }
    }

    pub fn for_app(mut self, app_id: &str) -> Self {
        self.app_id = Some(app_id.to_string());
        self
    }
}

/// Lazy, restartable sequence of intervals ordered by `(start_ts, id)`.
///
/// Rows are fetched a page at a time with keyset pagination, so no statement stays
/// open between pages. Call [`IntervalPages::restart`] (or build a new one) to
/// iterate again from the beginning.
pub struct IntervalPages<'a> {
    conn: &'a Connection,
    filter: IntervalFilter,
    cursor: Option<(i64, i64)>,
    buffer: VecDeque<UsageInterval>,
    exhausted: bool,
}

impl<'a> IntervalPages<'a> {
    pub fn new(conn: &'a Connection, filter: IntervalFilter) -> Self {
        Self {
            conn,
            filter,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fetch_page(&mut self) -> Result<()> {
        let (after_start, after_id) = self.cursor.unwrap_or((i64::MIN, i64::MIN));
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, app_id, window_title, start_ts, end_ts, idle
             FROM usage_intervals
             WHERE (start_ts > ?1 OR (start_ts = ?1 AND id > ?2))
               AND (?3 IS NULL OR end_ts > ?3)
               AND (?4 IS NULL OR start_ts < ?4)
               AND (?5 IS NULL OR app_id = ?5)
             ORDER BY start_ts, id
             LIMIT ?6",
        )?;

        let limit = i64::try_from(QUERY_PAGE_SIZE).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![
                after_start,
                after_id,
                self.filter.start_ts,
                self.filter.end_ts,
                self.filter.app_id,
                limit,
            ],
            UsageInterval::from_row,
        )?;

        for row in rows {
            self.buffer.push_back(row?);
        }

        if self.buffer.len() < QUERY_PAGE_SIZE {
            self.exhausted = true;
        }
        if let Some(last) = self.buffer.back() {
            self.cursor = Some((last.start_ts, last.id.unwrap_or(i64::MAX)));
        }
        Ok(())
    }
}

impl Iterator for IntervalPages<'_> {
    type Item = Result<UsageInterval>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_store;

    fn seed(store: &crate::db::Store, count: i64) {
        store
            .write(|tx| {
                for i in 0..count {
                    let app = if i % 2 == 0 { "code" } else { "firefox" };
                    UsageInterval::new(app, None, i * 10, i * 10 + 10, false).insert(tx)?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_pages_cover_every_row_in_order() {
        let (store, _dir) = setup_test_store();
        let total = i64::try_from(QUERY_PAGE_SIZE).unwrap() * 2 + 7;
        seed(&store, total);
        let reader = store.reader().unwrap();

        let starts: Vec<i64> = reader
            .intervals(IntervalFilter::default())
            .map(|r| r.unwrap().start_ts)
            .collect();

        assert_eq!(starts.len(), usize::try_from(total).unwrap());
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_filter_by_range_and_app() {
        let (store, _dir) = setup_test_store();
        seed(&store, 10);
        let reader = store.reader().unwrap();

        let found: Vec<UsageInterval> = reader
            .intervals(IntervalFilter::range(25, 65).for_app("code"))
            .collect::<Result<_>>()
            .unwrap();

        // code owns [20,30), [40,50), [60,70)
        let starts: Vec<i64> = found.iter().map(|i| i.start_ts).collect();
        assert_eq!(starts, vec![20, 40, 60]);
    }

    #[test]
    fn test_restart_yields_same_sequence() {
        let (store, _dir) = setup_test_store();
        seed(&store, 5);
        let reader = store.reader().unwrap();

        let mut pages = reader.intervals(IntervalFilter::default());
        let first: Vec<i64> = pages.by_ref().map(|r| r.unwrap().start_ts).collect();
        pages.restart();
        let second: Vec<i64> = pages.map(|r| r.unwrap().start_ts).collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
