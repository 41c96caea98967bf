//! Overall and grouped statistics over historical run records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::runner::result::{
    AgentStatus, EvaluationStatus, ExportedResultsBundle, OverallStatus,
};

/// Duration statistics in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: f64,
}

impl DurationStats {
    /// Computes stats over a set of durations. Empty input yields zeros.
    pub fn from_durations(durations: &[u64]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let min_ms = *durations.iter().min().expect("non-empty");
        let max_ms = *durations.iter().max().expect("non-empty");
        let avg_ms = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
        Self {
            min_ms,
            max_ms,
            avg_ms,
        }
    }
}

/// Single-pass summary over every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallSummary {
    pub total_runs: usize,
    pub passed_runs: usize,
    pub partial_runs: usize,
    pub failed_runs: usize,
    /// Fraction of runs with overall status `passed`.
    pub pass_rate: f64,
    pub evaluations_passed: usize,
    pub evaluations_failed: usize,
    pub evaluations_skipped: usize,
    pub agent_successes: usize,
    pub agent_failures: usize,
    pub agent_timeouts: usize,
    pub total_duration_ms: u64,
    pub avg_duration_ms: f64,
}

/// Pass-rate breakdown along a complementary dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakdownStats {
    pub run_count: usize,
    pub passed: usize,
    pub pass_rate: f64,
}

/// Per-test-case statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCaseStats {
    pub run_count: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub duration: DurationStats,
    /// Which agents ran this test case, and how they fared.
    pub agents: BTreeMap<String, BreakdownStats>,
}

/// Per-agent-type statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub run_count: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub duration: DurationStats,
    /// Which test cases this agent ran, and how it fared on each.
    pub test_cases: BTreeMap<String, BreakdownStats>,
}

/// Per-evaluator statistics across all runs it appeared in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorStats {
    pub run_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// passed / run_count.
    pub pass_rate: f64,
    /// skipped / run_count.
    pub skip_rate: f64,
    pub avg_duration_ms: f64,
}

/// Guarded division: `0.0` when the denominator is zero.
pub fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Wall-clock duration of one run in milliseconds.
pub fn run_duration_ms(record: &ExportedResultsBundle) -> u64 {
    (record.bundle.completed_at - record.bundle.started_at)
        .num_milliseconds()
        .max(0) as u64
}

/// Returns true if the run's overall status is `passed`.
pub fn run_passed(record: &ExportedResultsBundle) -> bool {
    record.bundle.summary.overall_status == OverallStatus::Passed
}

/// Computes the overall summary in a single pass.
pub fn overall_summary(records: &[ExportedResultsBundle]) -> OverallSummary {
    let mut summary = OverallSummary::default();

    for record in records {
        summary.total_runs += 1;
        match record.bundle.summary.overall_status {
            OverallStatus::Passed => summary.passed_runs += 1,
            OverallStatus::Partial => summary.partial_runs += 1,
            OverallStatus::Failed => summary.failed_runs += 1,
        }
        match record.bundle.agent_result.status {
            AgentStatus::Success => summary.agent_successes += 1,
            AgentStatus::Failed => summary.agent_failures += 1,
            AgentStatus::Timeout => summary.agent_timeouts += 1,
        }
        for evaluation in &record.bundle.evaluations {
            match evaluation.status {
                EvaluationStatus::Passed => summary.evaluations_passed += 1,
                EvaluationStatus::Failed => summary.evaluations_failed += 1,
                EvaluationStatus::Skipped => summary.evaluations_skipped += 1,
            }
        }
        summary.total_duration_ms += run_duration_ms(record);
    }

    summary.pass_rate = rate(summary.passed_runs, summary.total_runs);
    summary.avg_duration_ms = if summary.total_runs == 0 {
        0.0
    } else {
        summary.total_duration_ms as f64 / summary.total_runs as f64
    };
    summary
}

/// Groups records by test case.
pub fn group_by_test_case(
    records: &[ExportedResultsBundle],
) -> BTreeMap<String, TestCaseStats> {
    let mut groups: BTreeMap<String, (Vec<u64>, TestCaseStats)> = BTreeMap::new();

    for record in records {
        let entry = groups
            .entry(record.bundle.config.test_case.clone())
            .or_default();
        let (durations, stats) = entry;

        stats.run_count += 1;
        if run_passed(record) {
            stats.passed += 1;
        }
        durations.push(run_duration_ms(record));

        let agent = stats
            .agents
            .entry(record.bundle.agent_result.agent_type.clone())
            .or_default();
        agent.run_count += 1;
        if run_passed(record) {
            agent.passed += 1;
        }
    }

    finalize_groups(groups, |stats, durations| {
        stats.pass_rate = rate(stats.passed, stats.run_count);
        stats.duration = DurationStats::from_durations(durations);
        for breakdown in stats.agents.values_mut() {
            breakdown.pass_rate = rate(breakdown.passed, breakdown.run_count);
        }
    })
}

/// Groups records by agent type.
pub fn group_by_agent(records: &[ExportedResultsBundle]) -> BTreeMap<String, AgentStats> {
    let mut groups: BTreeMap<String, (Vec<u64>, AgentStats)> = BTreeMap::new();

    for record in records {
        let entry = groups
            .entry(record.bundle.agent_result.agent_type.clone())
            .or_default();
        let (durations, stats) = entry;

        stats.run_count += 1;
        if run_passed(record) {
            stats.passed += 1;
        }
        durations.push(run_duration_ms(record));

        let case = stats
            .test_cases
            .entry(record.bundle.config.test_case.clone())
            .or_default();
        case.run_count += 1;
        if run_passed(record) {
            case.passed += 1;
        }
    }

    finalize_groups(groups, |stats, durations| {
        stats.pass_rate = rate(stats.passed, stats.run_count);
        stats.duration = DurationStats::from_durations(durations);
        for breakdown in stats.test_cases.values_mut() {
            breakdown.pass_rate = rate(breakdown.passed, breakdown.run_count);
        }
    })
}

/// Groups evaluation results by evaluator name.
pub fn group_by_evaluator(
    records: &[ExportedResultsBundle],
) -> BTreeMap<String, EvaluatorStats> {
    let mut groups: BTreeMap<String, (Vec<u64>, EvaluatorStats)> = BTreeMap::new();

    for record in records {
        for evaluation in &record.bundle.evaluations {
            let entry = groups.entry(evaluation.evaluator.clone()).or_default();
            let (durations, stats) = entry;
            stats.run_count += 1;
            match evaluation.status {
                EvaluationStatus::Passed => stats.passed += 1,
                EvaluationStatus::Failed => stats.failed += 1,
                EvaluationStatus::Skipped => stats.skipped += 1,
            }
            durations.push(evaluation.duration_ms);
        }
    }

    finalize_groups(groups, |stats, durations| {
        stats.pass_rate = rate(stats.passed, stats.run_count);
        stats.skip_rate = rate(stats.skipped, stats.run_count);
        stats.avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };
    })
}

fn finalize_groups<S>(
    groups: BTreeMap<String, (Vec<u64>, S)>,
    mut finalize: impl FnMut(&mut S, &[u64]),
) -> BTreeMap<String, S> {
    groups
        .into_iter()
        .map(|(key, (durations, mut stats))| {
            finalize(&mut stats, &durations);
            (key, stats)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::record;

    #[test]
    fn test_rate_guards_zero() {
        assert_eq!(rate(3, 0), 0.0);
        assert_eq!(rate(1, 4), 0.25);
    }

    #[test]
    fn test_duration_stats() {
        let stats = DurationStats::from_durations(&[100, 300, 200]);
        assert_eq!(stats.min_ms, 100);
        assert_eq!(stats.max_ms, 300);
        assert_eq!(stats.avg_ms, 200.0);
        assert_eq!(DurationStats::from_durations(&[]), DurationStats::default());
    }

    #[test]
    fn test_overall_summary_counts() {
        let records = vec![
            record("case-a", "generic", true, 0),
            record("case-a", "generic", false, 1),
            record("case-b", "other", true, 2),
        ];
        let summary = overall_summary(&records);
        assert_eq!(summary.total_runs, 3);
        assert_eq!(summary.passed_runs, 2);
        assert_eq!(summary.failed_runs, 1);
        assert!((summary.pass_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.evaluations_passed, 2);
        assert_eq!(summary.evaluations_failed, 1);
    }

    #[test]
    fn test_group_by_test_case_breakdown() {
        let records = vec![
            record("case-a", "generic", true, 0),
            record("case-a", "other", false, 1),
            record("case-b", "generic", true, 2),
        ];
        let groups = group_by_test_case(&records);
        assert_eq!(groups.len(), 2);

        let case_a = &groups["case-a"];
        assert_eq!(case_a.run_count, 2);
        assert_eq!(case_a.pass_rate, 0.5);
        assert_eq!(case_a.agents.len(), 2);
        assert_eq!(case_a.agents["generic"].pass_rate, 1.0);
        assert_eq!(case_a.agents["other"].pass_rate, 0.0);
    }

    #[test]
    fn test_group_by_evaluator_rates() {
        let records = vec![
            record("case-a", "generic", true, 0),
            record("case-a", "generic", false, 1),
        ];
        let groups = group_by_evaluator(&records);
        let stats = &groups["files_changed"];
        assert_eq!(stats.run_count, 2);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pass_rate, 0.5);
        assert_eq!(stats.skip_rate, 0.0);
    }
}
