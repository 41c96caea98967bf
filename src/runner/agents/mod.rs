//! Agent adapters.
//!
//! An adapter knows how to launch one kind of coding agent against a
//! workspace, capture its output and translate it into the normalized
//! execution contract. Adapters register into an [`AgentRegistry`] under
//! a type tag; the orchestrator resolves the tag through the registry and
//! never branches on agent types itself.

pub mod generic;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AgentSpec;
use crate::error::{AgentError, ConfigError};
use crate::runner::result::NormalizedLog;

pub use generic::GenericAdapter;

/// Everything an adapter needs for one execution.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// The prompt/instruction for the agent.
    pub prompt: String,
    /// The workspace directory the agent mutates.
    pub working_dir: PathBuf,
    /// Execution time budget.
    pub timeout: Duration,
    /// Environment variables to pass through.
    pub env_vars: Vec<(String, String)>,
}

/// Raw outcome of one agent execution.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// Exit code from the agent process.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Normalized execution log.
    pub log: NormalizedLog,
}

impl AgentOutput {
    /// Creates an output record.
    pub fn new(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
            log: NormalizedLog::new(),
        }
    }

    /// Attaches a normalized log.
    pub fn with_log(mut self, log: NormalizedLog) -> Self {
        self.log = log;
        self
    }

    /// Returns true if the agent exited cleanly.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Contract every agent adapter implements.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Registered type tag of this adapter.
    fn agent_type(&self) -> &str;

    /// Checks whether the agent can run on this system.
    async fn is_available(&self) -> bool;

    /// Executes the agent. Timeouts surface as [`AgentError::Timeout`];
    /// the adapter is responsible for not letting the process outlive
    /// the budget.
    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentError>;
}

/// Factory producing an adapter from its spec.
pub type AdapterFactory =
    Box<dyn Fn(&AgentSpec) -> Result<Box<dyn AgentAdapter>, ConfigError> + Send + Sync>;

/// Name-keyed adapter registry.
///
/// New agent integrations register a factory at startup; lookup happens
/// once per run when the orchestrator resolves the configured type.
pub struct AgentRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with the builtin adapters registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("generic", |spec| {
            Ok(Box::new(GenericAdapter::from_spec(spec)?) as Box<dyn AgentAdapter>)
        });
        registry
    }

    /// Registers a factory under a type tag, replacing any existing one.
    pub fn register<F>(&mut self, agent_type: impl Into<String>, factory: F)
    where
        F: Fn(&AgentSpec) -> Result<Box<dyn AgentAdapter>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(agent_type.into(), Box::new(factory));
    }

    /// Builds an adapter for the given spec.
    pub fn create(&self, spec: &AgentSpec) -> Result<Box<dyn AgentAdapter>, ConfigError> {
        let factory = self
            .factories
            .get(&spec.agent_type)
            .ok_or_else(|| ConfigError::UnknownAgent(spec.agent_type.clone()))?;
        factory(spec)
    }

    /// Returns the registered type tags.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_defaults() {
        let registry = AgentRegistry::with_defaults();
        assert_eq!(registry.registered_types(), vec!["generic"]);
    }

    #[test]
    fn test_registry_unknown_type() {
        let registry = AgentRegistry::with_defaults();
        let spec = AgentSpec::new("no-such-agent");
        assert!(matches!(
            registry.create(&spec),
            Err(ConfigError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_registry_create_generic() {
        let registry = AgentRegistry::with_defaults();
        let spec = AgentSpec::new("generic").with_setting("command", json!("echo"));
        let adapter = registry.create(&spec).unwrap();
        assert_eq!(adapter.agent_type(), "generic");
    }

    #[test]
    fn test_registry_custom_registration() {
        struct Noop;

        #[async_trait]
        impl AgentAdapter for Noop {
            fn agent_type(&self) -> &str {
                "noop"
            }
            async fn is_available(&self) -> bool {
                true
            }
            async fn run(&self, _: &AgentInvocation) -> Result<AgentOutput, AgentError> {
                Ok(AgentOutput::new(0, String::new(), String::new(), Duration::ZERO))
            }
        }

        let mut registry = AgentRegistry::new();
        registry.register("noop", |_| Ok(Box::new(Noop) as Box<dyn AgentAdapter>));
        let adapter = registry.create(&AgentSpec::new("noop")).unwrap();
        assert_eq!(adapter.agent_type(), "noop");
    }
}
