//! Run orchestration.
//!
//! The orchestrator owns the end-to-end lifecycle of one evaluation run:
//! workspace preparation, agent execution, evaluator fan-out, summary
//! assembly and workspace teardown. Stages advance through an explicit
//! state machine; any failure at any stage still yields exactly one
//! [`ResultsBundle`] and still tears the workspace down.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::runner::agents::{AgentInvocation, AgentRegistry};
use crate::runner::evaluators::files_changed::{TreeManifest, BASELINE_MANIFEST};
use crate::runner::evaluators::{EvaluatorRegistry, EvaluatorRunner};
use crate::runner::result::{
    AgentExecutionResult, EvaluationResult, ResultsBundle, Summary,
};
use crate::workspace::{WorkspaceManager, WorkspaceView};
use crate::error::AgentError;

/// Pipeline states for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    ExecutingAgent,
    Evaluating,
    Aggregating,
    Done,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Preparing => write!(f, "preparing"),
            RunState::ExecutingAgent => write!(f, "executing_agent"),
            RunState::Evaluating => write!(f, "evaluating"),
            RunState::Aggregating => write!(f, "aggregating"),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Sequences one run through the pipeline.
pub struct Orchestrator {
    agents: Arc<AgentRegistry>,
    evaluators: Arc<EvaluatorRegistry>,
}

impl Orchestrator {
    /// Creates an orchestrator with the builtin registries.
    pub fn new() -> Self {
        Self {
            agents: Arc::new(AgentRegistry::with_defaults()),
            evaluators: Arc::new(EvaluatorRegistry::with_defaults()),
        }
    }

    /// Creates an orchestrator over custom registries.
    pub fn with_registries(
        agents: Arc<AgentRegistry>,
        evaluators: Arc<EvaluatorRegistry>,
    ) -> Self {
        Self { agents, evaluators }
    }

    /// Executes one run end to end.
    ///
    /// Always returns a bundle — workspace failures, agent failures,
    /// evaluator failures and panics inside the pipeline all surface as
    /// structured statuses, never as a missing result.
    pub async fn run(&self, config: RunConfig) -> ResultsBundle {
        let run_id = format!("run-{}", Uuid::new_v4());
        let started_at = Utc::now();
        let mut state = RunState::Idle;

        info!("Starting {} for test case '{}'", run_id, config.test_case);
        state = transition(&run_id, state, RunState::Preparing);

        let manager = WorkspaceManager::for_config(&config);
        let handle = match manager.create_workspace(&config).await {
            Ok(handle) => handle,
            Err(e) => {
                // Nothing was executed; no agent/evaluator stage runs on
                // a partial workspace.
                error!("{}: workspace preparation failed: {}", run_id, e);
                transition(&run_id, state, RunState::Failed);
                return failed_bundle(run_id, config, started_at, e.to_string());
            }
        };

        let view = handle.view();
        let stage_config = config.clone();
        let agents = Arc::clone(&self.agents);
        let evaluators = Arc::clone(&self.evaluators);
        let stage_run_id = run_id.clone();

        // Stages run on their own task so a panic anywhere inside them is
        // caught at this boundary and still produces a failed bundle.
        let staged = tokio::spawn(async move {
            execute_stages(stage_run_id, stage_config, agents, evaluators, view).await
        })
        .await;

        // The agent and evaluator transitions are logged inside the
        // staged task; by the time it settles the pipeline has either
        // reached evaluating or crashed.
        state = match &staged {
            Ok(_) => transition(&run_id, RunState::Evaluating, RunState::Aggregating),
            Err(_) => transition(&run_id, state, RunState::Aggregating),
        };

        let (agent_result, evaluations, run_error) = match staged {
            Ok((agent_result, evaluations)) => (agent_result, evaluations, None),
            Err(join_error) => {
                error!("{}: pipeline stage crashed: {}", run_id, join_error);
                (
                    AgentExecutionResult::failed(
                        config.agent.agent_type.clone(),
                        Duration::ZERO,
                        "pipeline crashed before the agent completed",
                    ),
                    Vec::new(),
                    Some(format!("pipeline stage crashed: {}", join_error)),
                )
            }
        };

        let summary = Summary::derive(&evaluations);
        let bundle = ResultsBundle {
            run_id: run_id.clone(),
            config: config.clone(),
            started_at,
            completed_at: Utc::now(),
            agent_result,
            evaluations,
            summary,
            error: run_error,
        };

        // Persist the bundle under artifacts before teardown so retained
        // workspaces carry their own record.
        let bundle_path = handle.artifacts_dir.join("results_bundle.json");
        if let Ok(json) = serde_json::to_string_pretty(&bundle) {
            if let Err(e) = std::fs::write(&bundle_path, json) {
                warn!("{}: failed to write bundle to artifacts: {}", run_id, e);
            }
        }

        if let Err(e) = manager.cleanup(handle, config.keep_workspace) {
            warn!("{}: workspace cleanup failed: {}", run_id, e);
        }

        let final_state = if bundle.summary.overall_status == crate::runner::result::OverallStatus::Failed
        {
            RunState::Failed
        } else {
            RunState::Done
        };
        transition(&run_id, state, final_state);
        info!(
            "{} finished with overall status {}",
            run_id, bundle.summary.overall_status
        );

        bundle
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs and performs a state transition.
fn transition(run_id: &str, from: RunState, to: RunState) -> RunState {
    info!("{}: {} -> {}", run_id, from, to);
    to
}

/// Runs the agent and evaluator stages. Never aborts early: agent
/// failures and timeouts are recorded and evaluation still proceeds.
async fn execute_stages(
    run_id: String,
    config: RunConfig,
    agents: Arc<AgentRegistry>,
    evaluators: Arc<EvaluatorRegistry>,
    view: WorkspaceView,
) -> (AgentExecutionResult, Vec<EvaluationResult>) {
    // Baseline snapshot for diff-based evaluators, captured before the
    // agent can touch anything.
    match TreeManifest::compute(&view.modified_dir) {
        Ok(manifest) => {
            if let Err(e) = manifest.save(&view.artifacts_dir.join(BASELINE_MANIFEST)) {
                warn!("{}: failed to save baseline manifest: {}", run_id, e);
            }
        }
        Err(e) => warn!("{}: failed to compute baseline manifest: {}", run_id, e),
    }

    let state = transition(&run_id, RunState::Preparing, RunState::ExecutingAgent);
    info!("{}: executing agent '{}'", run_id, config.agent.agent_type);
    let agent_result = execute_agent(&run_id, &config, &agents, &view).await;

    transition(&run_id, state, RunState::Evaluating);
    info!(
        "{}: evaluating with {} evaluator(s)",
        run_id,
        config.evaluators.len()
    );
    let runner = EvaluatorRunner::new(
        evaluators,
        config.timeouts.evaluator(),
        config.evaluator_concurrency,
    );
    let evaluations = runner.run_all(&config.evaluators, &view).await;

    (agent_result, evaluations)
}

/// Executes exactly one agent, serially, against the working copy.
async fn execute_agent(
    run_id: &str,
    config: &RunConfig,
    agents: &AgentRegistry,
    view: &WorkspaceView,
) -> AgentExecutionResult {
    let agent_type = config.agent.agent_type.clone();

    let adapter = match agents.create(&config.agent) {
        Ok(adapter) => adapter,
        Err(e) => {
            // Recorded as an agent failure; evaluators still get to
            // assess the untouched workspace.
            return AgentExecutionResult::failed(agent_type, Duration::ZERO, e.to_string());
        }
    };

    if !adapter.is_available().await {
        // Advisory probe; spawn errors are still the authoritative signal.
        warn!(
            "{}: agent '{}' did not answer the availability probe",
            run_id, agent_type
        );
    }

    let invocation = AgentInvocation {
        prompt: config.prompt.clone(),
        working_dir: view.modified_dir.clone(),
        timeout: config.timeouts.agent(),
        env_vars: Vec::new(),
    };

    match adapter.run(&invocation).await {
        Ok(output) => {
            let stdout_path = view.artifacts_dir.join("agent_stdout.log");
            let stderr_path = view.artifacts_dir.join("agent_stderr.log");
            if let Err(e) = std::fs::write(&stdout_path, &output.stdout) {
                warn!("{}: failed to write agent stdout: {}", run_id, e);
            }
            if let Err(e) = std::fs::write(&stderr_path, &output.stderr) {
                warn!("{}: failed to write agent stderr: {}", run_id, e);
            }

            let mut result =
                AgentExecutionResult::completed(agent_type, output.exit_code, output.duration)
                    .with_stdout(output.stdout)
                    .with_stderr(output.stderr)
                    .with_log(output.log);
            result.stdout_path = Some(stdout_path);
            result.stderr_path = Some(stderr_path);
            result
        }
        Err(AgentError::Timeout(timeout)) => {
            warn!("{}: agent timed out after {:?}", run_id, timeout);
            AgentExecutionResult::timed_out(agent_type, timeout)
        }
        Err(e) => {
            warn!("{}: agent failed: {}", run_id, e);
            AgentExecutionResult::failed(agent_type, Duration::ZERO, e.to_string())
        }
    }
}

/// Builds the bundle for a run that failed before any stage executed.
fn failed_bundle(
    run_id: String,
    config: RunConfig,
    started_at: chrono::DateTime<Utc>,
    error: String,
) -> ResultsBundle {
    let agent_type = config.agent.agent_type.clone();
    ResultsBundle {
        run_id,
        config,
        started_at,
        completed_at: Utc::now(),
        agent_result: AgentExecutionResult::failed(
            agent_type,
            Duration::ZERO,
            "run failed before agent execution",
        ),
        evaluations: Vec::new(),
        summary: Summary::derive(&[]),
        error: Some(error),
    }
}
