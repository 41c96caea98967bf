//! Evaluators and the evaluator runner.
//!
//! Evaluators are pluggable judges: given a read-only view of a run's
//! workspace they produce exactly one [`EvaluationResult`]. The runner
//! launches all configured evaluators concurrently and collects the
//! settled outcome of each one — a crash, timeout or error in one
//! evaluator never cancels or affects the others, and the output list
//! always matches the configured order and length.

pub mod files_changed;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::EvaluatorSpec;
use crate::error::{ConfigError, EvaluatorError};
use crate::runner::result::EvaluationResult;
use crate::workspace::WorkspaceView;

pub use files_changed::FilesChangedEvaluator;

/// Outcome of an evaluator's precondition check.
#[derive(Debug, Clone)]
pub enum Precondition {
    /// Preconditions met; evaluation may proceed.
    Ready,
    /// Preconditions not met; the evaluator is skipped with this reason.
    Skip(String),
}

/// Contract every evaluator implements.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Registered name tag of this evaluator.
    fn name(&self) -> &str;

    /// Checks whether this evaluator can judge the given workspace.
    async fn check_preconditions(&self, view: &WorkspaceView) -> Precondition;

    /// Produces the judgment. Only called when preconditions passed.
    async fn evaluate(&self, view: &WorkspaceView) -> Result<EvaluationResult, EvaluatorError>;
}

/// Factory producing an evaluator from its spec.
pub type EvaluatorFactory =
    Box<dyn Fn(&EvaluatorSpec) -> Result<Box<dyn Evaluator>, ConfigError> + Send + Sync>;

/// Name-keyed evaluator registry.
pub struct EvaluatorRegistry {
    factories: HashMap<String, EvaluatorFactory>,
}

impl EvaluatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the builtin evaluators registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("files_changed", |_| {
            Ok(Box::new(FilesChangedEvaluator::new()) as Box<dyn Evaluator>)
        });
        registry
    }

    /// Registers a factory under a name tag, replacing any existing one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&EvaluatorSpec) -> Result<Box<dyn Evaluator>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Builds an evaluator for the given spec.
    pub fn create(&self, spec: &EvaluatorSpec) -> Result<Box<dyn Evaluator>, ConfigError> {
        let factory = self
            .factories
            .get(&spec.name)
            .ok_or_else(|| ConfigError::UnknownEvaluator(spec.name.clone()))?;
        factory(spec)
    }

    /// Returns the registered name tags.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Runs a set of evaluators against an immutable workspace view.
pub struct EvaluatorRunner {
    registry: Arc<EvaluatorRegistry>,
    /// Per-evaluator time budget.
    timeout: Duration,
    /// Maximum evaluators in flight at once.
    concurrency: usize,
}

impl EvaluatorRunner {
    /// Creates a runner over the given registry.
    pub fn new(registry: Arc<EvaluatorRegistry>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            registry,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs all configured evaluators and returns exactly one result per
    /// spec, in the configured order.
    pub async fn run_all(
        &self,
        specs: &[EvaluatorSpec],
        view: &WorkspaceView,
    ) -> Vec<EvaluationResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(specs.len());

        for spec in specs {
            let name = spec.name.clone();
            match self.registry.create(spec) {
                Ok(evaluator) => {
                    let view = view.clone();
                    let timeout = self.timeout;
                    let semaphore = Arc::clone(&semaphore);
                    handles.push((
                        name,
                        Some(tokio::spawn(async move {
                            // Semaphore is never closed while handles live.
                            let _permit = semaphore
                                .acquire_owned()
                                .await
                                .expect("evaluator semaphore closed");
                            run_one(evaluator, &view, timeout).await
                        })),
                    ));
                }
                Err(e) => {
                    warn!("Cannot construct evaluator '{}': {}", name, e);
                    handles.push((name, None));
                }
            }
        }

        // join_all keeps the configured order regardless of completion
        // order.
        join_all(handles.into_iter().map(|(name, handle)| async move {
            match handle {
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    // Panic inside one evaluator settles into a failed
                    // result for that evaluator only.
                    Err(join_error) => EvaluationResult::failed(
                        name.clone(),
                        "evaluator crashed during execution",
                    )
                    .with_error(join_error.to_string()),
                },
                None => EvaluationResult::failed(name.clone(), "evaluator could not be constructed")
                    .with_error(format!("no evaluator registered under '{}'", name)),
            }
        }))
        .await
    }
}

/// Runs a single evaluator: precondition check plus evaluation, both
/// inside the same time budget. A precondition check that hangs must not
/// stall the run any more than a hanging evaluation would.
async fn run_one(
    evaluator: Box<dyn Evaluator>,
    view: &WorkspaceView,
    timeout: Duration,
) -> EvaluationResult {
    let name = evaluator.name().to_string();
    let start = Instant::now();

    let bounded = tokio::time::timeout(timeout, async {
        match evaluator.check_preconditions(view).await {
            Precondition::Skip(reason) => {
                debug!("Evaluator '{}' skipped: {}", name, reason);
                EvaluationResult::skipped(&name, reason)
            }
            Precondition::Ready => match evaluator.evaluate(view).await {
                Ok(mut result) => {
                    // The runner owns identity for determinism.
                    result.evaluator = name.clone();
                    result
                }
                Err(e) => EvaluationResult::failed(&name, "evaluator returned an error")
                    .with_error(e.to_string()),
            },
        }
    })
    .await;

    match bounded {
        Ok(mut result) => {
            result.duration_ms = start.elapsed().as_millis() as u64;
            result
        }
        Err(_) => EvaluationResult::failed(
            &name,
            format!("evaluator timed out after {:?}", timeout),
        )
        .with_error("timeout".to_string())
        .with_duration(start.elapsed()),
    }
}
