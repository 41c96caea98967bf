//! evalforge: Evaluation harness for AI coding agents.
//!
//! This library provides tools for running coding agents against test
//! cases in isolated workspaces, evaluating what they produce, and
//! analyzing results across runs.

// Core modules
pub mod analytics;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod report;
pub mod runner;
pub mod workspace;

// Re-export commonly used error types
pub use error::{
    AgentError, ConfigError, EvaluatorError, HistoryError, WorkspaceError,
};
