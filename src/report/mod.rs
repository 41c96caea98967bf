//! Plain-text rendering of run results and analysis output.
//!
//! Rendering is string-building only; the CLI decides where the text
//! goes. Formatting aims at terminals: fixed section headers, one fact
//! per line, no colour.

use std::fmt::Write;

use crate::analytics::{AnalysisResult, Severity, TrendDirection};
use crate::runner::result::{EvaluationStatus, ResultsBundle};

const RULE: &str = "============================================================";

/// Renders one run's results bundle as a human-readable report.
pub fn render_bundle(bundle: &ResultsBundle) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Run report: {}", bundle.run_id);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Test case:      {}", bundle.config.test_case);
    let _ = writeln!(out, "Agent:          {}", bundle.agent_result.agent_type);
    let _ = writeln!(out, "Agent status:   {}", bundle.agent_result.status);
    let _ = writeln!(out, "Agent exit:     {}", bundle.agent_result.exit_code);
    let _ = writeln!(out, "Started:        {}", bundle.started_at.to_rfc3339());
    let _ = writeln!(out, "Completed:      {}", bundle.completed_at.to_rfc3339());
    let _ = writeln!(out, "Overall status: {}", bundle.summary.overall_status);
    if let Some(error) = &bundle.error {
        let _ = writeln!(out, "Run error:      {}", error);
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Evaluations ({} passed, {} failed, {} skipped):",
        bundle.summary.passed, bundle.summary.failed, bundle.summary.skipped
    );
    for evaluation in &bundle.evaluations {
        let marker = match evaluation.status {
            EvaluationStatus::Passed => "PASS",
            EvaluationStatus::Failed => "FAIL",
            EvaluationStatus::Skipped => "SKIP",
        };
        let _ = writeln!(
            out,
            "  [{}] {} ({} ms): {}",
            marker, evaluation.evaluator, evaluation.duration_ms, evaluation.message
        );
        if let Some(error) = &evaluation.error {
            let _ = writeln!(out, "         error: {}", error);
        }
        for (metric, value) in &evaluation.metrics {
            let _ = writeln!(out, "         {} = {}", metric, value);
        }
    }

    out
}

/// Renders an analysis result as a human-readable report.
pub fn render_analysis(analysis: &AnalysisResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(
        out,
        "Analysis of {} runs (generated {})",
        analysis.metadata.analyzed_records,
        analysis.generated_at.to_rfc3339()
    );
    let _ = writeln!(out, "{}", RULE);
    if analysis.metadata.skipped_records > 0 {
        let _ = writeln!(
            out,
            "Skipped {} invalid record(s) of {} total.",
            analysis.metadata.skipped_records, analysis.metadata.total_records
        );
    }

    let overall = &analysis.overall;
    let _ = writeln!(out);
    let _ = writeln!(out, "Overall:");
    let _ = writeln!(
        out,
        "  runs: {} ({} passed, {} partial, {} failed), pass rate {:.1}%",
        overall.total_runs,
        overall.passed_runs,
        overall.partial_runs,
        overall.failed_runs,
        overall.pass_rate * 100.0
    );
    let _ = writeln!(
        out,
        "  agents: {} succeeded, {} failed, {} timed out",
        overall.agent_successes, overall.agent_failures, overall.agent_timeouts
    );
    let _ = writeln!(
        out,
        "  avg run duration: {:.0} ms",
        overall.avg_duration_ms
    );

    if !analysis.test_cases.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Test cases:");
        for (name, stats) in &analysis.test_cases {
            let trend = analysis
                .trends
                .get(name)
                .map(|t| t.direction)
                .unwrap_or(TrendDirection::InsufficientData);
            let _ = writeln!(
                out,
                "  {}: {} runs, {:.1}% pass rate, trend {}",
                name,
                stats.run_count,
                stats.pass_rate * 100.0,
                trend
            );
        }
    }

    if !analysis.agents.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Agents:");
        for (name, stats) in &analysis.agents {
            let _ = writeln!(
                out,
                "  {}: {} runs, {:.1}% pass rate, avg {:.0} ms",
                name,
                stats.run_count,
                stats.pass_rate * 100.0,
                stats.duration.avg_ms
            );
        }
    }

    if !analysis.evaluators.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Evaluators:");
        for (name, stats) in &analysis.evaluators {
            let _ = writeln!(
                out,
                "  {}: {} runs, {:.1}% pass, {:.1}% skip",
                name,
                stats.run_count,
                stats.pass_rate * 100.0,
                stats.skip_rate * 100.0
            );
        }
    }

    if !analysis.insights.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Insights:");
        for insight in &analysis.insights {
            let severity = match insight.severity {
                Severity::Critical => "CRITICAL",
                Severity::Warning => "WARNING",
                Severity::Info => "INFO",
            };
            let _ = writeln!(out, "  [{}] {}", severity, insight.title);
            let _ = writeln!(out, "    {}", insight.description);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{analyze, AnalysisThresholds};
    use crate::analytics::test_support::record;
    use crate::config::{AgentSpec, RunConfig, SourceRef};
    use crate::runner::result::{AgentExecutionResult, EvaluationResult, Summary};
    use chrono::Utc;
    use std::time::Duration;

    fn sample_bundle() -> ResultsBundle {
        let evaluations = vec![
            EvaluationResult::passed("files_changed", "3 files changed"),
            EvaluationResult::skipped("coverage", "no baseline"),
        ];
        let summary = Summary::derive(&evaluations);
        ResultsBundle {
            run_id: "run-42".into(),
            config: RunConfig::new("fix-parser", SourceRef::new("./repo"))
                .with_agent(AgentSpec::new("generic")),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            agent_result: AgentExecutionResult::completed("generic", 0, Duration::from_secs(2)),
            evaluations,
            summary,
            error: None,
        }
    }

    #[test]
    fn test_render_bundle_sections() {
        let text = render_bundle(&sample_bundle());
        assert!(text.contains("Run report: run-42"));
        assert!(text.contains("Test case:      fix-parser"));
        assert!(text.contains("[PASS] files_changed"));
        assert!(text.contains("[SKIP] coverage"));
        assert!(text.contains("1 passed, 0 failed, 1 skipped"));
    }

    #[test]
    fn test_render_analysis_sections() {
        let records = vec![
            record("case-a", "generic", true, 0),
            record("case-a", "generic", false, 1),
            record("case-a", "generic", false, 2),
        ];
        let analysis = analyze(&records, &AnalysisThresholds::default());
        let text = render_analysis(&analysis);
        assert!(text.contains("Analysis of 3 runs"));
        assert!(text.contains("Test cases:"));
        assert!(text.contains("case-a: 3 runs"));
        assert!(text.contains("Evaluators:"));
        assert!(text.contains("files_changed"));
        assert!(text.contains("Insights:"));
    }
}
