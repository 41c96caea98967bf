//! Time-ordered trend classification and calendar aggregates.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::runner::result::ExportedResultsBundle;

use super::summary::{rate, run_duration_ms, run_passed};

/// Window of most recent runs considered for trend classification.
const TREND_WINDOW: usize = 5;

/// Minimum samples before a trend is classified at all.
const TREND_MIN_SAMPLES: usize = 3;

/// Direction of a test case's recent performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
    InsufficientData,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Improving => write!(f, "improving"),
            TrendDirection::Degrading => write!(f, "degrading"),
            TrendDirection::Stable => write!(f, "stable"),
            TrendDirection::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

/// Recent-trend classification for one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendClassification {
    pub direction: TrendDirection,
    /// Runs actually considered (up to the window size).
    pub sample_count: usize,
    pub first_half_avg: f64,
    pub second_half_avg: f64,
}

/// Classifies the recent trend of a chronologically sorted pass/fail
/// sequence.
///
/// Takes the last up-to-five samples, splits them into halves by index
/// (first half gets the extra sample on odd counts) and compares the
/// average pass value of each half against a fixed delta. Deliberately
/// cheap; fewer than three samples is `insufficient_data`.
pub fn classify_trend(passes: &[bool], delta: f64) -> TrendClassification {
    let window_start = passes.len().saturating_sub(TREND_WINDOW);
    let window = &passes[window_start..];

    if window.len() < TREND_MIN_SAMPLES {
        return TrendClassification {
            direction: TrendDirection::InsufficientData,
            sample_count: window.len(),
            first_half_avg: 0.0,
            second_half_avg: 0.0,
        };
    }

    let mid = (window.len() + 1) / 2;
    let avg = |slice: &[bool]| {
        slice.iter().filter(|p| **p).count() as f64 / slice.len() as f64
    };
    let first_half_avg = avg(&window[..mid]);
    let second_half_avg = avg(&window[mid..]);

    let direction = if second_half_avg - first_half_avg > delta {
        TrendDirection::Improving
    } else if first_half_avg - second_half_avg > delta {
        TrendDirection::Degrading
    } else {
        TrendDirection::Stable
    };

    TrendClassification {
        direction,
        sample_count: window.len(),
        first_half_avg,
        second_half_avg,
    }
}

/// Computes per-test-case trends from chronologically sorted records.
pub fn trends_by_test_case(
    records: &[ExportedResultsBundle],
    delta: f64,
) -> BTreeMap<String, TrendClassification> {
    let mut sequences: BTreeMap<String, Vec<bool>> = BTreeMap::new();
    for record in records {
        sequences
            .entry(record.bundle.config.test_case.clone())
            .or_default()
            .push(run_passed(record));
    }
    sequences
        .into_iter()
        .map(|(case, passes)| (case, classify_trend(&passes, delta)))
        .collect()
}

/// One UTC calendar day of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub run_count: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub avg_duration_ms: f64,
}

/// One ISO week of runs, keyed on its Monday, rolled up from the daily
/// aggregates by run-count-weighted averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub week_start: NaiveDate,
    pub run_count: usize,
    pub pass_rate: f64,
    pub avg_duration_ms: f64,
}

/// Buckets records by the UTC date portion of `exported_at`.
pub fn daily_aggregates(records: &[ExportedResultsBundle]) -> Vec<DailyAggregate> {
    let mut buckets: BTreeMap<NaiveDate, (usize, usize, u64)> = BTreeMap::new();
    for record in records {
        let date = record.exported_at.date_naive();
        let entry = buckets.entry(date).or_default();
        entry.0 += 1;
        if run_passed(record) {
            entry.1 += 1;
        }
        entry.2 += run_duration_ms(record);
    }

    buckets
        .into_iter()
        .map(|(date, (run_count, passed, total_ms))| DailyAggregate {
            date,
            run_count,
            passed,
            pass_rate: rate(passed, run_count),
            avg_duration_ms: if run_count == 0 {
                0.0
            } else {
                total_ms as f64 / run_count as f64
            },
        })
        .collect()
}

/// Rolls daily aggregates up into ISO weeks.
///
/// The weekly pass rate is the run-count-weighted average of the daily
/// pass rates, not a re-scan of raw records — a known approximation kept
/// for stability of historical numbers.
pub fn weekly_aggregates(daily: &[DailyAggregate]) -> Vec<WeeklyAggregate> {
    let mut buckets: BTreeMap<NaiveDate, (usize, f64, f64)> = BTreeMap::new();
    for day in daily {
        let week = day.date.iso_week();
        let monday = NaiveDate::from_isoywd_opt(week.year(), week.week(), Weekday::Mon)
            .expect("valid ISO week from an existing date");
        let entry = buckets.entry(monday).or_default();
        entry.0 += day.run_count;
        entry.1 += day.pass_rate * day.run_count as f64;
        entry.2 += day.avg_duration_ms * day.run_count as f64;
    }

    buckets
        .into_iter()
        .map(
            |(week_start, (run_count, weighted_pass, weighted_duration))| WeeklyAggregate {
                week_start,
                run_count,
                pass_rate: if run_count == 0 {
                    0.0
                } else {
                    weighted_pass / run_count as f64
                },
                avg_duration_ms: if run_count == 0 {
                    0.0
                } else {
                    weighted_duration / run_count as f64
                },
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::record_at;
    use chrono::{TimeZone, Utc};

    const DELTA: f64 = 0.2;

    #[test]
    fn test_trend_insufficient_data() {
        let trend = classify_trend(&[true, false], DELTA);
        assert_eq!(trend.direction, TrendDirection::InsufficientData);
        assert_eq!(trend.sample_count, 2);
    }

    #[test]
    fn test_trend_improving_spec_example() {
        // fail, fail, fail, pass, pass: halves [f,f,f] and [p,p].
        let trend = classify_trend(&[false, false, false, true, true], DELTA);
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert_eq!(trend.first_half_avg, 0.0);
        assert_eq!(trend.second_half_avg, 1.0);
    }

    #[test]
    fn test_trend_degrading() {
        let trend = classify_trend(&[true, true, true, false, false], DELTA);
        assert_eq!(trend.direction, TrendDirection::Degrading);
    }

    #[test]
    fn test_trend_stable() {
        let trend = classify_trend(&[true, false, true, false, true], DELTA);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_trend_uses_last_five_only() {
        // Ten fails followed by a three-fail, two-pass window.
        let mut passes = vec![false; 10];
        passes.extend([false, false, false, true, true]);
        let trend = classify_trend(&passes, DELTA);
        assert_eq!(trend.direction, TrendDirection::Improving);
        assert_eq!(trend.sample_count, 5);
    }

    #[test]
    fn test_trend_three_samples_split_two_one() {
        let trend = classify_trend(&[false, false, true], DELTA);
        assert_eq!(trend.first_half_avg, 0.0);
        assert_eq!(trend.second_half_avg, 1.0);
        assert_eq!(trend.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_daily_and_weekly_buckets() {
        // Two runs on Monday 2026-01-05, one on Tuesday, one the next week.
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2026, 1, 6, 10, 0, 0).unwrap();
        let next_week = Utc.with_ymd_and_hms(2026, 1, 14, 10, 0, 0).unwrap();

        let records = vec![
            record_at("case", "generic", true, monday),
            record_at("case", "generic", false, monday),
            record_at("case", "generic", true, tuesday),
            record_at("case", "generic", true, next_week),
        ];

        let daily = daily_aggregates(&records);
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].run_count, 2);
        assert_eq!(daily[0].pass_rate, 0.5);
        assert_eq!(daily[1].run_count, 1);

        let weekly = weekly_aggregates(&daily);
        assert_eq!(weekly.len(), 2);
        assert_eq!(
            weekly[0].week_start,
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        );
        assert_eq!(weekly[0].run_count, 3);
        // Weighted: (0.5 * 2 + 1.0 * 1) / 3.
        assert!((weekly[0].pass_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            weekly[1].week_start,
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap()
        );
    }
}
