//! Tree (JSON) and flat (CSV) encodings of daily buckets.

use super::DailyBucket;
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub range: ExportRange,
    pub days: Vec<ExportDay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    pub start_ts: i64,
    pub end_ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDay {
    pub date: NaiveDate,
    pub total_seconds: i64,
    pub apps: Vec<ExportApp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportApp {
    pub app_identifier: String,
    pub duration_seconds: i64,
}

pub fn document(start_ts: i64, end_ts: i64, buckets: &[DailyBucket]) -> ExportDocument {
    let mut days: BTreeMap<NaiveDate, Vec<ExportApp>> = BTreeMap::new();
    for bucket in buckets {
        days.entry(bucket.date).or_default().push(ExportApp {
            app_identifier: bucket.app_id.clone(),
            duration_seconds: bucket.duration_secs,
        });
    }

    ExportDocument {
        range: ExportRange { start_ts, end_ts },
        days: days
            .into_iter()
            .map(|(date, apps)| ExportDay {
                date,
                total_seconds: apps.iter().map(|a| a.duration_seconds).sum(),
                apps,
            })
            .collect(),
    }
}

pub fn to_json(start_ts: i64, end_ts: i64, buckets: &[DailyBucket]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&document(start_ts, end_ts, buckets))?)
}

/// One row per daily bucket under the header `date,app_identifier,duration_seconds`.
pub fn to_csv(buckets: &[DailyBucket]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for bucket in buckets {
        writer.serialize(bucket)?;
    }
    if buckets.is_empty() {
        writer.write_record(["date", "app_identifier", "duration_seconds"])?;
    }
    let bytes = writer.into_inner().map_err(|e| AppError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| AppError::InvalidInput {
        field: "csv",
        reason: e.to_string(),
    })
}

pub fn parse_json(text: &str) -> Result<Vec<DailyBucket>> {
    let doc: ExportDocument = serde_json::from_str(text)?;
    Ok(doc
        .days
        .into_iter()
        .flat_map(|day| {
            let date = day.date;
            day.apps.into_iter().map(move |app| DailyBucket {
                date,
                app_id: app.app_identifier,
                duration_secs: app.duration_seconds,
            })
        })
        .collect())
}

pub fn parse_csv(text: &str) -> Result<Vec<DailyBucket>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let rows = reader.deserialize().collect::<std::result::Result<Vec<DailyBucket>, _>>()?;
    Ok(rows)
}

/// Per-app totals across all buckets, comparable with a rollup over the same range.
pub fn totals(buckets: &[DailyBucket]) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for bucket in buckets {
        *totals.entry(bucket.app_id.clone()).or_insert(0) += bucket.duration_secs;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageInterval;
    use crate::stats::{RangeSpec, StatsEngine};
    use crate::test_utils::{at, setup_test_store, test_tz};

    #[test]
    fn test_exports_reproduce_rollup_totals() {
        let (store, _dir) = setup_test_store();
        let late = at(2024, 5, 9, 23, 0, 0);
        let early = at(2024, 5, 10, 8, 0, 0);
        store
            .write(|tx| {
                UsageInterval::new("code", None, late, late + 1800, false).insert(tx)?;
                UsageInterval::new("slack", None, late + 1800, late + 2400, false).insert(tx)?;
                UsageInterval::new("code", None, early, early + 900, false).insert(tx)?;
                UsageInterval::new("code", None, early + 900, early + 1000, true).insert(tx)
            })
            .unwrap();

        let stats = StatsEngine::with_timezone(store.reader().unwrap(), test_tz());
        let spec = RangeSpec::Custom {
            start_ts: at(2024, 5, 9, 0, 0, 0),
            end_ts: at(2024, 5, 11, 0, 0, 0),
        };
        let (start, end) = stats.range(spec, 0).unwrap();
        let buckets = stats.daily_buckets(start, end).unwrap();
        let expected = stats.rollup(spec, 0).unwrap();

        let from_json = parse_json(&to_json(start, end, &buckets).unwrap()).unwrap();
        let from_csv = parse_csv(&to_csv(&buckets).unwrap()).unwrap();

        assert_eq!(totals(&from_json), expected);
        assert_eq!(totals(&from_csv), expected);
        assert_eq!(expected.get("code"), Some(&2700));
    }

    #[test]
    fn test_csv_layout() {
        let buckets = vec![DailyBucket {
            date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            app_id: "code".into(),
            duration_secs: 42,
        }];
        let csv = to_csv(&buckets).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("date,app_identifier,duration_seconds"));
        assert_eq!(lines.next(), Some("2024-05-10,code,42"));
        assert_eq!(to_csv(&[]).unwrap().trim(), "date,app_identifier,duration_seconds");
    }

    #[test]
    fn test_json_tree_groups_by_day() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let buckets = vec![
            DailyBucket { date, app_id: "a".into(), duration_secs: 10 },
            DailyBucket { date, app_id: "b".into(), duration_secs: 5 },
        ];
        let doc = document(0, 1, &buckets);
        assert_eq!(doc.days.len(), 1);
        assert_eq!(doc.days[0].total_seconds, 15);
        assert_eq!(doc.days[0].apps.len(), 2);
    }
}
