//! Command-line interface for evalforge.
//!
//! Provides commands for executing runs, re-rendering saved bundles,
//! and analyzing run history.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
