//! Historical analytics over exported run records.
//!
//! [`analyze`] is a pure function from a slice of history records to an
//! [`AnalysisResult`]: summary statistics, per-dimension groupings,
//! trends, calendar aggregates and rule-based insights. Apart from the
//! `generated_at` stamp the output depends only on the input records,
//! so re-running analysis over the same history yields the same
//! numbers. All groupings are `BTreeMap`s to keep serialized output
//! deterministic.

pub mod insights;
pub mod summary;
pub mod trends;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runner::result::ExportedResultsBundle;

pub use insights::{generate_insights, Insight, InsightType, Severity};
pub use summary::{
    group_by_agent, group_by_evaluator, group_by_test_case, overall_summary, AgentStats,
    BreakdownStats, DurationStats, EvaluatorStats, OverallSummary, TestCaseStats,
};
pub use trends::{
    classify_trend, daily_aggregates, trends_by_test_case, weekly_aggregates, DailyAggregate,
    TrendClassification, TrendDirection, WeeklyAggregate,
};

/// Tunable cutoffs for trend and insight rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisThresholds {
    /// Pass rates below this are flagged as low.
    pub low_pass_rate: f64,
    /// Pass rates below this escalate the low-pass-rate insight to critical.
    pub critical_pass_rate: f64,
    /// Pass rates at or above this count as sustained high performance.
    pub sustained_pass_rate: f64,
    /// Evaluator skip rates above this are flagged as anomalous.
    pub high_skip_rate: f64,
    /// Minimum half-to-half pass-rate change for a trend to register.
    pub trend_delta: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            low_pass_rate: 0.5,
            critical_pass_rate: 0.2,
            sustained_pass_rate: 0.95,
            high_skip_rate: 0.5,
            trend_delta: 0.2,
        }
    }
}

/// How much of the input made it into the analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub total_records: usize,
    pub analyzed_records: usize,
    /// Records dropped for failing basic validity checks.
    pub skipped_records: usize,
}

/// The complete output of one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub generated_at: DateTime<Utc>,
    pub metadata: AnalysisMetadata,
    pub overall: OverallSummary,
    pub test_cases: BTreeMap<String, TestCaseStats>,
    pub agents: BTreeMap<String, AgentStats>,
    pub evaluators: BTreeMap<String, EvaluatorStats>,
    pub trends: BTreeMap<String, TrendClassification>,
    pub daily: Vec<DailyAggregate>,
    pub weekly: Vec<WeeklyAggregate>,
    pub insights: Vec<Insight>,
}

/// Analyzes exported run records.
///
/// Invalid records (empty run id, or a completion time before the
/// start time) are dropped and counted in the metadata rather than
/// poisoning the aggregates. Remaining records are sorted by export
/// time before trend classification, so the caller may pass them in
/// any order.
pub fn analyze(
    records: &[ExportedResultsBundle],
    thresholds: &AnalysisThresholds,
) -> AnalysisResult {
    let total_records = records.len();
    let mut valid: Vec<&ExportedResultsBundle> =
        records.iter().filter(|r| is_valid(r)).collect();
    let skipped_records = total_records - valid.len();
    valid.sort_by_key(|r| r.exported_at);
    let sorted: Vec<ExportedResultsBundle> = valid.into_iter().cloned().collect();

    debug!(
        "Analyzing {} of {} records ({} skipped)",
        sorted.len(),
        total_records,
        skipped_records
    );

    let overall = overall_summary(&sorted);
    let test_cases = group_by_test_case(&sorted);
    let agents = group_by_agent(&sorted);
    let evaluators = group_by_evaluator(&sorted);
    let trends = trends_by_test_case(&sorted, thresholds.trend_delta);
    let daily = daily_aggregates(&sorted);
    let weekly = weekly_aggregates(&daily);
    let insights = generate_insights(&test_cases, &evaluators, &trends, thresholds);

    AnalysisResult {
        generated_at: Utc::now(),
        metadata: AnalysisMetadata {
            total_records,
            analyzed_records: sorted.len(),
            skipped_records,
        },
        overall,
        test_cases,
        agents,
        evaluators,
        trends,
        daily,
        weekly,
        insights,
    }
}

fn is_valid(record: &ExportedResultsBundle) -> bool {
    !record.bundle.run_id.trim().is_empty()
        && record.bundle.completed_at >= record.bundle.started_at
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    use crate::config::{AgentSpec, RunConfig, SourceRef};
    use crate::runner::result::{
        AgentExecutionResult, EvaluationResult, ExportedResultsBundle, ResultsBundle, Summary,
    };

    /// A record exported at a fixed base time plus `offset` minutes.
    pub fn record(
        test_case: &str,
        agent: &str,
        passed: bool,
        offset: i64,
    ) -> ExportedResultsBundle {
        let base = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        record_at(test_case, agent, passed, base + ChronoDuration::minutes(offset))
    }

    /// A one-evaluation record exported at the given time.
    pub fn record_at(
        test_case: &str,
        agent: &str,
        passed: bool,
        exported_at: DateTime<Utc>,
    ) -> ExportedResultsBundle {
        let evaluation = if passed {
            EvaluationResult::passed("files_changed", "changes detected")
        } else {
            EvaluationResult::failed("files_changed", "agent produced no diff")
        };
        record_with_evaluations(test_case, agent, vec![evaluation], exported_at)
    }

    /// A record with caller-chosen evaluations exported at the given time.
    pub fn record_with_evaluations(
        test_case: &str,
        agent: &str,
        evaluations: Vec<EvaluationResult>,
        exported_at: DateTime<Utc>,
    ) -> ExportedResultsBundle {
        let started_at = exported_at - ChronoDuration::seconds(10);
        let completed_at = started_at + ChronoDuration::seconds(5);
        let summary = Summary::derive(&evaluations);
        let bundle = ResultsBundle {
            run_id: format!("run-{}", exported_at.timestamp_millis()),
            config: RunConfig::new(test_case, SourceRef::new("./repo"))
                .with_agent(AgentSpec::new(agent)),
            started_at,
            completed_at,
            agent_result: AgentExecutionResult::completed(agent, 0, Duration::from_secs(5)),
            evaluations,
            summary,
            error: None,
        };
        ExportedResultsBundle {
            bundle,
            exported_at,
        }
    }
}
