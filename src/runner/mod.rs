//! Run pipeline: orchestration, agent adapters, evaluators and results.
//!
//! The [`Orchestrator`] sequences one run through workspace preparation,
//! a single serial agent execution, concurrent evaluation and summary
//! assembly. The result schema in [`result`] is the contract everything
//! downstream (history, analytics, reporting) consumes.

pub mod agents;
pub mod evaluators;
pub mod orchestrator;
pub mod result;

pub use agents::{AgentAdapter, AgentInvocation, AgentOutput, AgentRegistry};
pub use evaluators::{Evaluator, EvaluatorRegistry, EvaluatorRunner, Precondition};
pub use orchestrator::{Orchestrator, RunState};
pub use result::{
    AgentExecutionResult, AgentStatus, EvaluationResult, EvaluationStatus,
    ExportedResultsBundle, NormalizedLog, OverallStatus, ResultsBundle, Summary,
};
