//! Time-of-day scheduled CSV source.
//!
//! Each row carries a `Date` and a `Time`. A row becomes due when the local
//! wall clock reaches its `Time`; `updated_on` is `Date` + `Time`. Rows are
//! handed out in time-of-day order, and a row whose time has already passed is
//! handed out immediately.

use crate::{RecordSource, SourceError, SourceResult};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use shotlink_database::MachineStatusRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const REQUIRED_COLUMNS: &[&str] = &[
    "_id",
    "data.machine_id",
    "data.machine_status",
    "data.shot_count",
    "data.shot_status",
    "data.status",
    "Date",
    "Time",
];

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];
const TIME_FORMATS: &[&str] = &["%I:%M:%S %p", "%H:%M:%S"];

/// Wall-clock time of day, injectable for tests.
pub type Clock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// One CSV row. Columns not listed here (such as `data.downtime_status`)
/// are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "data.machine_id")]
    machine_id: i64,
    #[serde(rename = "data.machine_status")]
    machine_status: String,
    #[serde(rename = "data.shot_count")]
    shot_count: i64,
    #[serde(rename = "data.shot_status")]
    shot_status: i64,
    #[serde(rename = "data.status")]
    status: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
}

#[derive(Debug, Clone)]
struct ScheduledRecord {
    due: NaiveTime,
    record: MachineStatusRecord,
}

fn parse_with<T>(raw: &str, formats: &[&str], parse: impl Fn(&str, &str) -> Option<T>) -> Option<T> {
    formats.iter().find_map(|format| parse(raw, format))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl CsvRow {
    fn into_scheduled(self, line: u64) -> SourceResult<ScheduledRecord> {
        let invalid = |reason: String| SourceError::InvalidRow { line, reason };

        if self.id.is_empty() {
            return Err(invalid("empty _id".to_string()));
        }
        let machine_status = parse_flag(&self.machine_status)
            .ok_or_else(|| invalid(format!("bad data.machine_status {:?}", self.machine_status)))?;
        let date = parse_with(&self.date, DATE_FORMATS, |raw, format| {
            NaiveDate::parse_from_str(raw, format).ok()
        })
        .ok_or_else(|| invalid(format!("bad Date {:?}", self.date)))?;
        let time = parse_with(&self.time, TIME_FORMATS, |raw, format| {
            NaiveTime::parse_from_str(raw, format).ok()
        })
        .ok_or_else(|| invalid(format!("bad Time {:?}", self.time)))?;

        Ok(ScheduledRecord {
            due: time,
            record: MachineStatusRecord {
                id: self.id,
                machine_id: self.machine_id,
                machine_status,
                shot_count: self.shot_count,
                shot_status: self.shot_status,
                status: self.status,
                updated_on: NaiveDateTime::new(date, time),
            },
        })
    }
}

/// Hands out CSV rows when their time of day comes up.
pub struct ScheduledCsvSource {
    pending: Vec<ScheduledRecord>,
    clock: Clock,
}

impl ScheduledCsvSource {
    /// Load a schedule from a CSV file.
    pub fn from_path(path: &Path) -> SourceResult<Self> {
        info!(path = %path.display(), "Loading record schedule");
        Self::from_reader(File::open(path)?)
    }

    /// Load a schedule from any CSV reader.
    ///
    /// A missing required column fails the load. Individual rows that cannot
    /// be parsed are skipped with a warning.
    pub fn from_reader<R: Read>(reader: R) -> SourceResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == *column) {
                return Err(SourceError::InvalidRow {
                    line: 1,
                    reason: format!("missing column {column}"),
                });
            }
        }

        let mut pending = Vec::new();
        let mut skipped = 0usize;
        for (index, row) in csv.deserialize::<CsvRow>().enumerate() {
            let line = index as u64 + 2;
            let scheduled = row
                .map_err(SourceError::from)
                .and_then(|row| row.into_scheduled(line));
            match scheduled {
                Ok(scheduled) => pending.push(scheduled),
                Err(e) => {
                    skipped += 1;
                    warn!(line, error = %e, "Skipping CSV row");
                }
            }
        }

        // Stable, so rows sharing a time keep file order.
        pending.sort_by_key(|scheduled| scheduled.due);
        info!(rows = pending.len(), skipped, "Record schedule loaded");

        Ok(Self {
            pending,
            clock: Arc::new(|| Local::now().time()),
        })
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

#[async_trait]
impl RecordSource for ScheduledCsvSource {
    async fn next_record(&mut self) -> SourceResult<Option<MachineStatusRecord>> {
        let Some(next) = self.pending.first().cloned() else {
            return Ok(None);
        };

        let now = (self.clock)();
        if next.due > now {
            let wait = (next.due - now).to_std().unwrap_or_default();
            debug!(
                record_id = %next.record.id,
                wait_ms = wait.as_millis() as u64,
                "Waiting for next scheduled record"
            );
            tokio::time::sleep(wait).await;
        }

        Ok(Some(next.record))
    }

    async fn mark_consumed(&mut self, id: &str) -> SourceResult<()> {
        // Only the first pending row: later rows may reuse the id with newer values.
        if let Some(index) = self.pending.iter().position(|scheduled| scheduled.record.id == id) {
            self.pending.remove(index);
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CSV: &str = "\
_id,data.machine_id,data.machine_status,data.shot_count,data.shot_status,data.status,data.downtime_status,Date,Time
r-late,4,True,120,1,running,0,03/01/2024,08:00:10 AM
r-early,4,False,119,0,idle,1,03/01/2024,08:00:05 AM
r-bad,4,maybe,118,0,idle,1,03/01/2024,08:00:01 AM
";

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_load_orders_by_time_and_skips_bad_rows() {
        let source = ScheduledCsvSource::from_reader(CSV.as_bytes()).unwrap();
        let ids: Vec<&str> = source.pending.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["r-early", "r-late"]);
    }

    #[test]
    fn test_row_fields_and_updated_on() {
        let source = ScheduledCsvSource::from_reader(CSV.as_bytes()).unwrap();
        let late = &source.pending[1].record;

        assert_eq!(late.machine_id, 4);
        assert!(late.machine_status);
        assert_eq!(late.shot_count, 120);
        assert_eq!(late.status, "running");
        assert_eq!(
            late.updated_on,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_time(at(8, 0, 10))
        );
    }

    #[test]
    fn test_iso_date_accepted() {
        let csv = "\
_id,data.machine_id,data.machine_status,data.shot_count,data.shot_status,data.status,Date,Time
a,1,1,2,0,running,2024-03-01,13:30:00
";
        let source = ScheduledCsvSource::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(source.pending[0].due, at(13, 30, 0));
    }

    #[test]
    fn test_missing_column_fails_load() {
        let csv = "_id,data.machine_id\na,1\n";
        assert!(matches!(
            ScheduledCsvSource::from_reader(csv.as_bytes()),
            Err(SourceError::InvalidRow { line: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_row_is_due() {
        let mut source = ScheduledCsvSource::from_reader(CSV.as_bytes())
            .unwrap()
            .with_clock(|| at(8, 0, 0));

        let started = tokio::time::Instant::now();
        let record = source.next_record().await.unwrap().unwrap();

        assert_eq!(record.id, "r-early");
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_rows_are_yielded_immediately() {
        let mut source = ScheduledCsvSource::from_reader(CSV.as_bytes())
            .unwrap()
            .with_clock(|| at(9, 0, 0));

        let started = tokio::time::Instant::now();
        for expected in ["r-early", "r-late"] {
            let record = source.next_record().await.unwrap().unwrap();
            assert_eq!(record.id, expected);
            source.mark_consumed(&record.id).await.unwrap();
        }

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(source.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeated_id_yields_every_row() {
        let csv = "\
_id,data.machine_id,data.machine_status,data.shot_count,data.shot_status,data.status,Date,Time
r1,4,True,200,1,running,03/01/2024,08:00:10 AM
r1,4,True,100,1,running,03/01/2024,08:00:05 AM
";
        let mut source = ScheduledCsvSource::from_reader(csv.as_bytes())
            .unwrap()
            .with_clock(|| at(9, 0, 0));

        let first = source.next_record().await.unwrap().unwrap();
        source.mark_consumed(&first.id).await.unwrap();
        let second = source.next_record().await.unwrap().unwrap();
        source.mark_consumed(&second.id).await.unwrap();

        assert_eq!((first.shot_count, second.shot_count), (100, 200));
        assert!(source.next_record().await.unwrap().is_none());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        std::fs::write(&path, CSV).unwrap();

        let source = ScheduledCsvSource::from_path(&path).unwrap();
        assert_eq!(source.remaining(), 2);
    }
}
