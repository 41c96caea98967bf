//! Rule-based insight generation over computed statistics.
//!
//! Every rule reads already-aggregated numbers, never raw records, so
//! insight generation stays cheap and deterministic. Rules only fire
//! once their sample-count floor is met to avoid noise from tiny
//! histories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::summary::{EvaluatorStats, TestCaseStats};
use super::trends::{TrendClassification, TrendDirection};
use super::AnalysisThresholds;

/// What kind of observation an insight records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Regression,
    Improvement,
    Anomaly,
    Recommendation,
}

/// How urgent an insight is. Ordering is sort order in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// One actionable observation derived from the aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_type: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// The test case or evaluator the insight is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Minimum runs before pass-rate and skip-rate rules fire.
const MIN_RUNS_FOR_RATES: usize = 3;

/// Minimum runs before the sustained-high-pass-rate rule fires.
const MIN_RUNS_FOR_SUSTAINED: usize = 5;

/// Applies every insight rule and returns the results sorted by
/// severity (critical first). The sort is stable, so insights of equal
/// severity keep rule order; within one rule, map iteration order keeps
/// them alphabetical.
pub fn generate_insights(
    test_cases: &BTreeMap<String, TestCaseStats>,
    evaluators: &BTreeMap<String, EvaluatorStats>,
    trends: &BTreeMap<String, TrendClassification>,
    thresholds: &AnalysisThresholds,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    low_pass_rates(test_cases, thresholds, &mut insights);
    sustained_high_pass_rates(test_cases, thresholds, &mut insights);
    degrading_trends(trends, &mut insights);
    high_skip_rates(evaluators, thresholds, &mut insights);
    low_evaluator_pass_rates(evaluators, thresholds, &mut insights);

    insights.sort_by_key(|insight| insight.severity);
    insights
}

fn low_pass_rates(
    test_cases: &BTreeMap<String, TestCaseStats>,
    thresholds: &AnalysisThresholds,
    insights: &mut Vec<Insight>,
) {
    for (name, stats) in test_cases {
        if stats.run_count < MIN_RUNS_FOR_RATES || stats.pass_rate >= thresholds.low_pass_rate {
            continue;
        }
        let severity = if stats.pass_rate < thresholds.critical_pass_rate {
            Severity::Critical
        } else {
            Severity::Warning
        };
        insights.push(Insight {
            insight_type: InsightType::Recommendation,
            severity,
            title: format!("Low pass rate for {}", name),
            description: format!(
                "{} passed only {:.0}% of {} runs. Review recent failures \
                 for a common cause.",
                name,
                stats.pass_rate * 100.0,
                stats.run_count
            ),
            context: Some(name.clone()),
        });
    }
}

fn sustained_high_pass_rates(
    test_cases: &BTreeMap<String, TestCaseStats>,
    thresholds: &AnalysisThresholds,
    insights: &mut Vec<Insight>,
) {
    for (name, stats) in test_cases {
        if stats.run_count < MIN_RUNS_FOR_SUSTAINED
            || stats.pass_rate < thresholds.sustained_pass_rate
        {
            continue;
        }
        insights.push(Insight {
            insight_type: InsightType::Improvement,
            severity: Severity::Info,
            title: format!("Sustained high pass rate for {}", name),
            description: format!(
                "{} passed {:.0}% of {} runs. The case may be too easy for \
                 the agents under test.",
                name,
                stats.pass_rate * 100.0,
                stats.run_count
            ),
            context: Some(name.clone()),
        });
    }
}

fn degrading_trends(
    trends: &BTreeMap<String, TrendClassification>,
    insights: &mut Vec<Insight>,
) {
    for (test_case, trend) in trends {
        if trend.direction != TrendDirection::Degrading {
            continue;
        }
        insights.push(Insight {
            insight_type: InsightType::Regression,
            severity: Severity::Warning,
            title: format!("Degrading trend for {}", test_case),
            description: format!(
                "Recent pass rate dropped from {:.0}% to {:.0}% over the \
                 last {} runs.",
                trend.first_half_avg * 100.0,
                trend.second_half_avg * 100.0,
                trend.sample_count
            ),
            context: Some(test_case.clone()),
        });
    }
}

fn high_skip_rates(
    evaluators: &BTreeMap<String, EvaluatorStats>,
    thresholds: &AnalysisThresholds,
    insights: &mut Vec<Insight>,
) {
    for (name, stats) in evaluators {
        if stats.run_count < MIN_RUNS_FOR_RATES || stats.skip_rate <= thresholds.high_skip_rate {
            continue;
        }
        insights.push(Insight {
            insight_type: InsightType::Anomaly,
            severity: Severity::Warning,
            title: format!("Evaluator {} mostly skipped", name),
            description: format!(
                "{} skipped {:.0}% of {} runs. Its preconditions are rarely \
                 met; check run configuration.",
                name,
                stats.skip_rate * 100.0,
                stats.run_count
            ),
            context: Some(name.clone()),
        });
    }
}

fn low_evaluator_pass_rates(
    evaluators: &BTreeMap<String, EvaluatorStats>,
    thresholds: &AnalysisThresholds,
    insights: &mut Vec<Insight>,
) {
    for (name, stats) in evaluators {
        // Mostly-skipped evaluators already surface as anomalies; a
        // pass rate computed over a handful of non-skipped runs is not
        // meaningful on top of that.
        if stats.run_count < MIN_RUNS_FOR_RATES
            || stats.skip_rate >= thresholds.high_skip_rate
            || stats.pass_rate >= thresholds.low_pass_rate
        {
            continue;
        }
        insights.push(Insight {
            insight_type: InsightType::Recommendation,
            severity: Severity::Warning,
            title: format!("Evaluator {} rarely passes", name),
            description: format!(
                "{} passed {:.0}% of {} runs. Verify the evaluator's \
                 expectations still match what agents can produce.",
                name,
                stats.pass_rate * 100.0,
                stats.run_count
            ),
            context: Some(name.clone()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> AnalysisThresholds {
        AnalysisThresholds::default()
    }

    fn test_case(run_count: usize, passed: usize) -> TestCaseStats {
        TestCaseStats {
            run_count,
            passed,
            pass_rate: if run_count == 0 {
                0.0
            } else {
                passed as f64 / run_count as f64
            },
            ..Default::default()
        }
    }

    fn case_map(name: &str, stats: TestCaseStats) -> BTreeMap<String, TestCaseStats> {
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), stats);
        map
    }

    fn evaluator(run_count: usize, passed: usize, skipped: usize) -> EvaluatorStats {
        EvaluatorStats {
            run_count,
            passed,
            failed: run_count - passed - skipped,
            skipped,
            pass_rate: passed as f64 / run_count as f64,
            skip_rate: skipped as f64 / run_count as f64,
            avg_duration_ms: 0.0,
        }
    }

    fn generate(
        test_cases: BTreeMap<String, TestCaseStats>,
        evaluators: BTreeMap<String, EvaluatorStats>,
        trends: BTreeMap<String, TrendClassification>,
    ) -> Vec<Insight> {
        generate_insights(&test_cases, &evaluators, &trends, &thresholds())
    }

    #[test]
    fn test_low_pass_rate_warning_and_critical() {
        let insights = generate(
            case_map("case-a", test_case(10, 4)),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].severity, Severity::Warning);
        assert_eq!(insights[0].insight_type, InsightType::Recommendation);
        assert_eq!(insights[0].context.as_deref(), Some("case-a"));

        let insights = generate(
            case_map("case-a", test_case(10, 1)),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert_eq!(insights[0].severity, Severity::Critical);
    }

    #[test]
    fn test_no_rate_insights_under_sample_floor() {
        let insights = generate(
            case_map("case-a", test_case(2, 0)),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(insights.is_empty());
    }

    #[test]
    fn test_sustained_high_pass_rate() {
        let insights = generate(
            case_map("case-a", test_case(6, 6)),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::Improvement);
        assert_eq!(insights[0].severity, Severity::Info);

        // Four perfect runs is still under the sustained floor.
        let insights = generate(
            case_map("case-a", test_case(4, 4)),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(insights.is_empty());
    }

    #[test]
    fn test_degrading_trend_insight() {
        let mut trends = BTreeMap::new();
        trends.insert(
            "case-a".to_string(),
            TrendClassification {
                direction: TrendDirection::Degrading,
                sample_count: 5,
                first_half_avg: 1.0,
                second_half_avg: 0.0,
            },
        );
        let insights = generate(
            case_map("case-a", test_case(5, 3)),
            BTreeMap::new(),
            trends,
        );
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::Regression);
        assert_eq!(insights[0].context.as_deref(), Some("case-a"));
    }

    #[test]
    fn test_high_skip_rate_anomaly() {
        // Four runs, three skipped.
        let mut evaluators = BTreeMap::new();
        evaluators.insert("files_changed".to_string(), evaluator(4, 1, 3));
        let insights = generate(
            case_map("case-a", test_case(4, 3)),
            evaluators,
            BTreeMap::new(),
        );
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::Anomaly);
        assert_eq!(insights[0].severity, Severity::Warning);
        assert_eq!(insights[0].context.as_deref(), Some("files_changed"));
    }

    #[test]
    fn test_low_evaluator_pass_rate_excludes_mostly_skipped() {
        // Mostly skipped: anomaly only, no pass-rate recommendation.
        let mut evaluators = BTreeMap::new();
        evaluators.insert("flaky".to_string(), evaluator(4, 0, 3));
        let insights = generate(BTreeMap::new(), evaluators, BTreeMap::new());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::Anomaly);

        // Rarely skipped but rarely passing: the recommendation fires.
        let mut evaluators = BTreeMap::new();
        evaluators.insert("strict".to_string(), evaluator(4, 1, 0));
        let insights = generate(BTreeMap::new(), evaluators, BTreeMap::new());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::Recommendation);
        assert_eq!(insights[0].context.as_deref(), Some("strict"));
    }

    #[test]
    fn test_sorted_critical_first() {
        let mut trends = BTreeMap::new();
        trends.insert(
            "case-a".to_string(),
            TrendClassification {
                direction: TrendDirection::Degrading,
                sample_count: 5,
                first_half_avg: 0.7,
                second_half_avg: 0.0,
            },
        );
        let insights = generate(case_map("case-a", test_case(10, 1)), BTreeMap::new(), trends);
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].severity, Severity::Critical);
        assert_eq!(insights[1].severity, Severity::Warning);
    }
}
