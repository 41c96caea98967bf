//! Error types for evalforge operations.
//!
//! Defines error types for all major subsystems:
//! - Run configuration loading and validation
//! - Workspace creation, locking and teardown
//! - Agent adapter execution
//! - Evaluator execution
//! - History persistence and parsing

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file '{0}' not found")]
    NotFound(String),

    #[error("Failed to parse config '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown agent type: {0}")]
    UnknownAgent(String),

    #[error("Unknown evaluator: {0}")]
    UnknownEvaluator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur during workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Another run holds the lock for the same run root. Retriable by the
    /// caller once the owning run finishes.
    #[error("Workspace '{0}' is locked by another run")]
    Busy(String),

    #[error("Failed to clone '{reference}': {message}")]
    CloneFailed { reference: String, message: String },

    #[error("Failed to copy '{path}' into workspace: {message}")]
    CopyFailed { path: String, message: String },

    #[error("Source path '{0}' does not exist")]
    SourceNotFound(String),

    #[error("Workspace preparation timed out after {0:?}")]
    Timeout(Duration),

    #[error("git executable not available: {0}")]
    GitUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running an agent adapter.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent not available: {0}")]
    NotAvailable(String),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by an evaluator. The runner converts these into
/// `failed` evaluation results; they never propagate past it.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while persisting or reading run history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History file '{0}' not found")]
    NotFound(String),

    #[error("Failed to append to history: {0}")]
    AppendFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
