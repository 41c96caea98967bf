//! Result schema for evaluation runs.
//!
//! Everything persisted for a run lives here: the agent execution record,
//! one evaluation result per configured evaluator, and the assembled
//! [`ResultsBundle`] with its derived [`Summary`]. The summary derivation
//! is the single source of pass/fail semantics consumed downstream by the
//! analytics layer.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Maximum characters kept when summarizing stdout/stderr inline.
const OUTPUT_SUMMARY_LIMIT: usize = 10_000;

/// Status of the agent execution stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent exited with code 0.
    Success,
    /// Agent exited non-zero or the adapter reported an error.
    Failed,
    /// Agent was terminated after exceeding its time budget.
    Timeout,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Success => write!(f, "success"),
            AgentStatus::Failed => write!(f, "failed"),
            AgentStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Token counters reported by an agent, when its output exposes them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input/prompt tokens.
    pub input_tokens: u64,
    /// Output/completion tokens.
    pub output_tokens: u64,
    /// Cached tokens (if applicable).
    pub cached_tokens: u64,
}

impl TokenUsage {
    /// Creates new token usage counters.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            cached_tokens: 0,
        }
    }

    /// Returns total tokens used.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One entry in the normalized message/tool-call trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry index (1-based).
    pub index: u32,
    /// Kind of entry ("message", "tool_call", "tool_result", ...).
    pub kind: String,
    /// Short description of what happened.
    pub detail: String,
    /// Whether the step succeeded, when the adapter can tell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Normalized execution log produced by an agent adapter.
///
/// Adapters translate vendor-specific output into this shape so the rest
/// of the pipeline never parses raw agent output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedLog {
    /// Model used, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token counters, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Cost in USD, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    /// Message/tool-call trace.
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    /// Adapter-specific extras.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl NormalizedLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the token usage.
    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Appends a trace entry.
    pub fn push_entry(&mut self, kind: impl Into<String>, detail: impl Into<String>) {
        let index = self.entries.len() as u32 + 1;
        self.entries.push(LogEntry {
            index,
            kind: kind.into(),
            detail: detail.into(),
            success: None,
        });
    }
}

/// Record of the agent execution stage of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionResult {
    /// Agent type tag that was executed.
    pub agent_type: String,
    /// Outcome of the execution.
    pub status: AgentStatus,
    /// Exit code from the agent process (-1 when unknown).
    pub exit_code: i32,
    /// Wall-clock duration of the execution.
    pub duration_ms: u64,
    /// Captured stdout (truncated).
    pub stdout_summary: String,
    /// Captured stderr (truncated).
    pub stderr_summary: String,
    /// Paths to full stdout/stderr captures under the artifacts dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<PathBuf>,
    /// Normalized execution log from the adapter.
    #[serde(default)]
    pub log: NormalizedLog,
    /// Error message when the adapter itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentExecutionResult {
    /// Creates a result for a completed agent process.
    pub fn completed(
        agent_type: impl Into<String>,
        exit_code: i32,
        duration: Duration,
    ) -> Self {
        let status = if exit_code == 0 {
            AgentStatus::Success
        } else {
            AgentStatus::Failed
        };
        Self {
            agent_type: agent_type.into(),
            status,
            exit_code,
            duration_ms: duration.as_millis() as u64,
            stdout_summary: String::new(),
            stderr_summary: String::new(),
            stdout_path: None,
            stderr_path: None,
            log: NormalizedLog::new(),
            error: None,
        }
    }

    /// Creates a result for an adapter-level failure.
    pub fn failed(
        agent_type: impl Into<String>,
        duration: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            status: AgentStatus::Failed,
            exit_code: -1,
            duration_ms: duration.as_millis() as u64,
            stdout_summary: String::new(),
            stderr_summary: String::new(),
            stdout_path: None,
            stderr_path: None,
            log: NormalizedLog::new(),
            error: Some(error.into()),
        }
    }

    /// Creates a result for a timed-out agent.
    pub fn timed_out(agent_type: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent_type: agent_type.into(),
            status: AgentStatus::Timeout,
            exit_code: -1,
            duration_ms: timeout.as_millis() as u64,
            stdout_summary: String::new(),
            stderr_summary: String::new(),
            stdout_path: None,
            stderr_path: None,
            log: NormalizedLog::new(),
            error: Some(format!("agent timed out after {:?}", timeout)),
        }
    }

    /// Sets the stdout summary (truncated).
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout_summary = truncate_string(stdout.into(), OUTPUT_SUMMARY_LIMIT);
        self
    }

    /// Sets the stderr summary (truncated).
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr_summary = truncate_string(stderr.into(), OUTPUT_SUMMARY_LIMIT);
        self
    }

    /// Sets the normalized log.
    pub fn with_log(mut self, log: NormalizedLog) -> Self {
        self.log = log;
        self
    }

    /// Returns true if the agent completed successfully.
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// Status of one evaluator's judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Evaluator ran and the run met its criteria.
    Passed,
    /// Evaluator ran and the run did not meet its criteria, or the
    /// evaluator itself errored/timed out.
    Failed,
    /// Preconditions were not met; no scoring was attempted.
    Skipped,
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationStatus::Passed => write!(f, "passed"),
            EvaluationStatus::Failed => write!(f, "failed"),
            EvaluationStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One evaluator's result for one run.
///
/// Exactly one of these exists per configured evaluator per run, even
/// when the evaluator itself crashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Evaluator name tag.
    pub evaluator: String,
    /// Outcome.
    pub status: EvaluationStatus,
    /// Numeric/structured metrics reported by the evaluator.
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Human-readable explanation of the outcome.
    #[serde(default)]
    pub message: String,
    /// Evaluation duration.
    pub duration_ms: u64,
    /// When the evaluation finished.
    pub timestamp: DateTime<Utc>,
    /// Optional named assertion scores (0.0 to 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertions: Option<BTreeMap<String, f64>>,
    /// Files the evaluator wrote under its artifacts subdirectory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<PathBuf>>,
    /// Error detail when the evaluator itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    /// Creates a passed result.
    pub fn passed(evaluator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(evaluator, EvaluationStatus::Passed, message)
    }

    /// Creates a failed result.
    pub fn failed(evaluator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(evaluator, EvaluationStatus::Failed, message)
    }

    /// Creates a skipped result.
    pub fn skipped(evaluator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(evaluator, EvaluationStatus::Skipped, message)
    }

    fn with_status(
        evaluator: impl Into<String>,
        status: EvaluationStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            evaluator: evaluator.into(),
            status,
            metrics: BTreeMap::new(),
            message: message.into(),
            duration_ms: 0,
            timestamp: Utc::now(),
            assertions: None,
            artifacts: None,
            error: None,
        }
    }

    /// Adds a metric.
    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// Sets the error detail.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Adds a named assertion score.
    pub fn with_assertion(mut self, name: impl Into<String>, score: f64) -> Self {
        self.assertions
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), score);
        self
    }
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every evaluator passed (and at least one ran).
    Passed,
    /// Some evaluators skipped while at least one passed and none failed.
    Partial,
    /// At least one evaluator failed, or none produced a judgment.
    Failed,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Passed => write!(f, "passed"),
            OverallStatus::Partial => write!(f, "partial"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Derived per-run evaluator counts and the overall status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Number of configured evaluators.
    pub total_evaluators: usize,
    /// Evaluators that passed.
    pub passed: usize,
    /// Evaluators that failed.
    pub failed: usize,
    /// Evaluators that skipped.
    pub skipped: usize,
    /// Derived overall status for the run.
    pub overall_status: OverallStatus,
}

impl Summary {
    /// Derives the summary from a run's evaluation results.
    ///
    /// Rules, in order: `failed` if any evaluator failed; `partial` if
    /// any skipped while at least one passed; `passed` if all passed and
    /// at least one ran; otherwise `failed` (zero evaluators, or all
    /// skipped).
    pub fn derive(results: &[EvaluationResult]) -> Self {
        let total = results.len();
        let passed = results
            .iter()
            .filter(|r| r.status == EvaluationStatus::Passed)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == EvaluationStatus::Failed)
            .count();
        let skipped = results
            .iter()
            .filter(|r| r.status == EvaluationStatus::Skipped)
            .count();

        let overall_status = if failed > 0 {
            OverallStatus::Failed
        } else if skipped > 0 && passed > 0 {
            OverallStatus::Partial
        } else if passed == total && total > 0 {
            OverallStatus::Passed
        } else {
            OverallStatus::Failed
        };

        Self {
            total_evaluators: total,
            passed,
            failed,
            skipped,
            overall_status,
        }
    }
}

/// The complete structured record of one run's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsBundle {
    /// Unique run identifier.
    pub run_id: String,
    /// Snapshot of the configuration the run was started with.
    pub config: RunConfig,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed.
    pub completed_at: DateTime<Utc>,
    /// Agent execution record.
    pub agent_result: AgentExecutionResult,
    /// One result per configured evaluator, in configured order.
    pub evaluations: Vec<EvaluationResult>,
    /// Derived counts and overall status.
    pub summary: Summary,
    /// Run-level error for failures outside the agent/evaluator stages
    /// (e.g. workspace preparation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultsBundle {
    /// Returns true if the run's overall status is not `failed`.
    pub fn is_success(&self) -> bool {
        self.summary.overall_status != OverallStatus::Failed
    }
}

/// A results bundle plus its export timestamp: one line of the
/// append-only history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedResultsBundle {
    /// The run record.
    #[serde(flatten)]
    pub bundle: ResultsBundle,
    /// When the bundle was appended to the history.
    pub exported_at: DateTime<Utc>,
}

impl ExportedResultsBundle {
    /// Wraps a bundle with the current timestamp.
    pub fn new(bundle: ResultsBundle) -> Self {
        Self {
            bundle,
            exported_at: Utc::now(),
        }
    }
}

/// Truncates a string to a maximum length.
fn truncate_string(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}
