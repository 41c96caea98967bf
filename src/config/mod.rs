//! Run configuration for evaluation runs.
//!
//! A [`RunConfig`] describes everything one run needs: where the source
//! repository comes from, which agent to execute, which evaluators to
//! score the result with, and the timeouts/limits that bound each stage.
//! Configs are loaded from YAML files and are immutable once a run starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default timeout for agent execution (30 minutes).
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 1800;

/// Default timeout for a single evaluator (5 minutes).
const DEFAULT_EVALUATOR_TIMEOUT_SECS: u64 = 300;

/// Default timeout for cloning/copying sources into the workspace.
const DEFAULT_PREPARE_TIMEOUT_SECS: u64 = 300;

/// Default number of evaluators allowed to run concurrently.
const DEFAULT_EVALUATOR_CONCURRENCY: usize = 4;

/// Where the source repository for a run comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Git URL or local filesystem path.
    pub repository: String,
    /// Branch to check out (git sources only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Commit to pin to after clone (git sources only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl SourceRef {
    /// Creates a source reference from a URL or local path.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: None,
            commit: None,
        }
    }

    /// Pins the source to a branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Pins the source to a commit.
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Returns true if the repository reference is an existing local path.
    pub fn is_local(&self) -> bool {
        Path::new(&self.repository).exists()
    }
}

/// Kind of "known-good" reference to materialize alongside the agent's
/// working copy, for diff-based evaluators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedSourceKind {
    /// A branch of the same repository.
    Branch,
    /// A named dataset directory.
    Dataset,
    /// An arbitrary filesystem path.
    Path,
}

/// Descriptor for the expected (reference) copy of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedRef {
    /// How to interpret the identifier.
    pub kind: ExpectedSourceKind,
    /// Branch name, dataset directory or path, depending on `kind`.
    pub identifier: String,
}

/// Configuration for the agent under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Registered agent type tag (e.g. "generic").
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Opaque adapter-specific settings (command, model, flags, ...).
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl AgentSpec {
    /// Creates an agent spec for the given registered type.
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            config: BTreeMap::new(),
        }
    }

    /// Adds an adapter-specific setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Looks up a string-valued setting.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Configuration for one evaluator in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorSpec {
    /// Registered evaluator name tag (e.g. "files_changed").
    pub name: String,
    /// Evaluator-specific settings.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl EvaluatorSpec {
    /// Creates an evaluator spec for the given registered name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BTreeMap::new(),
        }
    }
}

/// Timeouts bounding each pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Clone/copy budget for workspace preparation, in seconds.
    #[serde(default = "default_prepare_timeout")]
    pub prepare_secs: u64,
    /// Agent execution budget, in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_secs: u64,
    /// Per-evaluator budget, in seconds.
    #[serde(default = "default_evaluator_timeout")]
    pub evaluator_secs: u64,
}

fn default_prepare_timeout() -> u64 {
    DEFAULT_PREPARE_TIMEOUT_SECS
}

fn default_agent_timeout() -> u64 {
    DEFAULT_AGENT_TIMEOUT_SECS
}

fn default_evaluator_timeout() -> u64 {
    DEFAULT_EVALUATOR_TIMEOUT_SECS
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            prepare_secs: DEFAULT_PREPARE_TIMEOUT_SECS,
            agent_secs: DEFAULT_AGENT_TIMEOUT_SECS,
            evaluator_secs: DEFAULT_EVALUATOR_TIMEOUT_SECS,
        }
    }
}

impl Timeouts {
    /// Workspace preparation timeout as a `Duration`.
    pub fn prepare(&self) -> Duration {
        Duration::from_secs(self.prepare_secs)
    }

    /// Agent execution timeout as a `Duration`.
    pub fn agent(&self) -> Duration {
        Duration::from_secs(self.agent_secs)
    }

    /// Per-evaluator timeout as a `Duration`.
    pub fn evaluator(&self) -> Duration {
        Duration::from_secs(self.evaluator_secs)
    }
}

/// Full configuration for a single evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Identifier of the test case this run exercises. Used as the
    /// grouping key in longitudinal analysis.
    pub test_case: String,
    /// Source repository for the agent's working copy.
    pub source: SourceRef,
    /// Optional known-good reference for diff-based evaluators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedRef>,
    /// Agent to execute.
    pub agent: AgentSpec,
    /// Evaluators to score the run, in reporting order.
    pub evaluators: Vec<EvaluatorSpec>,
    /// Prompt/instruction handed to the agent.
    #[serde(default)]
    pub prompt: String,
    /// Stage timeouts.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Maximum evaluators running concurrently.
    #[serde(default = "default_evaluator_concurrency")]
    pub evaluator_concurrency: usize,
    /// Base directory for run workspaces. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
    /// Keep the workspace on disk after the run for post-mortem inspection.
    #[serde(default)]
    pub keep_workspace: bool,
    /// Directory where datasets referenced by `expected.kind = dataset` live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_root: Option<PathBuf>,
}

fn default_evaluator_concurrency() -> usize {
    DEFAULT_EVALUATOR_CONCURRENCY
}

impl RunConfig {
    /// Creates a run configuration with defaults for everything beyond
    /// the test case and source.
    pub fn new(test_case: impl Into<String>, source: SourceRef) -> Self {
        Self {
            test_case: test_case.into(),
            source,
            expected: None,
            agent: AgentSpec::new("generic"),
            evaluators: Vec::new(),
            prompt: String::new(),
            timeouts: Timeouts::default(),
            evaluator_concurrency: DEFAULT_EVALUATOR_CONCURRENCY,
            workspace_root: None,
            keep_workspace: false,
            dataset_root: None,
        }
    }

    /// Sets the agent spec.
    pub fn with_agent(mut self, agent: AgentSpec) -> Self {
        self.agent = agent;
        self
    }

    /// Adds an evaluator.
    pub fn with_evaluator(mut self, evaluator: EvaluatorSpec) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Sets the expected reference.
    pub fn with_expected(mut self, expected: ExpectedRef) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Sets the prompt handed to the agent.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Overrides the workspace base directory.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Retains the workspace after the run.
    pub fn with_keep_workspace(mut self, keep: bool) -> Self {
        self.keep_workspace = keep;
        self
    }

    /// Sets the stage timeouts.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Loads a run configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the structural contract of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test_case.trim().is_empty() {
            return Err(ConfigError::MissingField("test_case".into()));
        }
        if self.source.repository.trim().is_empty() {
            return Err(ConfigError::MissingField("source.repository".into()));
        }
        if self.agent.agent_type.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.type".into()));
        }
        if self.evaluator_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "evaluator_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for evaluator in &self.evaluators {
            if evaluator.name.trim().is_empty() {
                return Err(ConfigError::MissingField("evaluators[].name".into()));
            }
            if !seen.insert(evaluator.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "evaluators".into(),
                    reason: format!("duplicate evaluator '{}'", evaluator.name),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> RunConfig {
        RunConfig::new("fix-parser", SourceRef::new("https://example.com/repo.git"))
            .with_evaluator(EvaluatorSpec::new("files_changed"))
    }

    #[test]
    fn test_defaults() {
        let config = sample_config();
        assert_eq!(config.timeouts.agent(), Duration::from_secs(1800));
        assert_eq!(config.timeouts.prepare(), Duration::from_secs(300));
        assert_eq!(config.evaluator_concurrency, 4);
        assert!(!config.keep_workspace);
    }

    #[test]
    fn test_validate_rejects_empty_test_case() {
        let mut config = sample_config();
        config.test_case = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_evaluators() {
        let config = sample_config().with_evaluator(EvaluatorSpec::new("files_changed"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = sample_config()
            .with_expected(ExpectedRef {
                kind: ExpectedSourceKind::Branch,
                identifier: "golden".into(),
            })
            .with_prompt("Fix the parser bug");

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: RunConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.test_case, "fix-parser");
        assert_eq!(
            parsed.expected.as_ref().unwrap().kind,
            ExpectedSourceKind::Branch
        );
        assert_eq!(parsed.evaluators.len(), 1);
    }

    #[test]
    fn test_yaml_minimal_fields() {
        let yaml = r#"
test_case: demo
source:
  repository: ./repo
agent:
  type: generic
evaluators:
  - name: files_changed
"#;
        let parsed: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.agent.agent_type, "generic");
        assert_eq!(parsed.timeouts.evaluator_secs, 300);
        assert!(parsed.validate().is_ok());
    }
}
