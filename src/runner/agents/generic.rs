//! Generic agent adapter.
//!
//! Runs any command-line agent that accepts its prompt on stdin. The
//! command and arguments come from the agent spec's config map, so a new
//! CLI agent usually needs no code at all.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AgentSpec;
use crate::error::{AgentError, ConfigError};
use crate::runner::result::NormalizedLog;

use super::{AgentAdapter, AgentInvocation, AgentOutput};

/// Adapter that works with any CLI-based agent.
pub struct GenericAdapter {
    /// Base command to run.
    command: String,
    /// Arguments passed before the prompt.
    args: Vec<String>,
    /// Model hint recorded in the normalized log.
    model: Option<String>,
}

impl GenericAdapter {
    /// Creates a new adapter for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            model: None,
        }
    }

    /// Adds fixed arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Builds an adapter from an agent spec. Requires a `command` key;
    /// honors optional `args` (list of strings) and `model`.
    pub fn from_spec(spec: &AgentSpec) -> Result<Self, ConfigError> {
        let command = spec
            .get_str("command")
            .ok_or_else(|| ConfigError::MissingField("agent.config.command".into()))?;

        let args = spec
            .config
            .get("args")
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            command: command.to_string(),
            args,
            model: spec.get_str("model").map(String::from),
        })
    }
}

#[async_trait]
impl AgentAdapter for GenericAdapter {
    fn agent_type(&self) -> &str {
        "generic"
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &invocation.env_vars {
            cmd.env(key, value);
        }

        info!(
            "Starting agent '{}' in {}",
            self.command,
            invocation.working_dir.display()
        );

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AgentError::NotAvailable(self.command.clone()),
            _ => AgentError::ExecutionFailed(format!("failed to spawn {}: {}", self.command, e)),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(invocation.prompt.as_bytes())
                .await
                .map_err(|e| {
                    AgentError::ExecutionFailed(format!("failed to write prompt: {}", e))
                })?;
            stdin.shutdown().await.ok();
        }

        let waited = tokio::time::timeout(invocation.timeout, child.wait_with_output()).await;
        let duration = start.elapsed();

        match waited {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                debug!("Agent exited with code {}", exit_code);

                let mut log = NormalizedLog::new();
                if let Some(model) = &self.model {
                    log.model = Some(model.clone());
                }
                log.push_entry("process", format!("{} exited with code {}", self.command, exit_code));

                Ok(AgentOutput::new(exit_code, stdout, stderr, duration).with_log(log))
            }
            Ok(Err(e)) => Err(AgentError::ExecutionFailed(format!("process error: {}", e))),
            // kill_on_drop reaps the child once the future is dropped.
            Err(_) => Err(AgentError::Timeout(invocation.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn invocation(dir: &std::path::Path) -> AgentInvocation {
        AgentInvocation {
            prompt: "hello".into(),
            working_dir: dir.to_path_buf(),
            timeout: Duration::from_secs(10),
            env_vars: Vec::new(),
        }
    }

    #[test]
    fn test_from_spec_requires_command() {
        let spec = AgentSpec::new("generic");
        assert!(matches!(
            GenericAdapter::from_spec(&spec),
            Err(ConfigError::MissingField(_))
        ));
    }

    #[test]
    fn test_from_spec_parses_args() {
        let spec = AgentSpec::new("generic")
            .with_setting("command", json!("cat"))
            .with_setting("args", json!(["-n"]))
            .with_setting("model", json!("gpt-5"));
        let adapter = GenericAdapter::from_spec(&spec).unwrap();
        assert_eq!(adapter.command, "cat");
        assert_eq!(adapter.args, vec!["-n"]);
        assert_eq!(adapter.model.as_deref(), Some("gpt-5"));
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let dir = TempDir::new().unwrap();
        let adapter = GenericAdapter::new("cat");
        let output = adapter.run(&invocation(dir.path())).await.unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let adapter = GenericAdapter::new("false");
        let output = adapter.run(&invocation(dir.path())).await.unwrap();
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let dir = TempDir::new().unwrap();
        let adapter = GenericAdapter::new("sleep").with_args(vec!["30".into()]);
        let mut inv = invocation(dir.path());
        inv.timeout = Duration::from_millis(100);
        let result = adapter.run(&inv).await;
        assert!(matches!(result, Err(AgentError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let dir = TempDir::new().unwrap();
        let adapter = GenericAdapter::new("definitely-not-a-real-binary-xyz");
        let result = adapter.run(&invocation(dir.path())).await;
        assert!(matches!(result, Err(AgentError::NotAvailable(_))));
    }
}
