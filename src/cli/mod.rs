//! Command-line interface for tagmend.
//!
//! This module provides the process, inspect, and parse-name commands
//! over the metadata pipeline.

mod commands;

pub use commands::{Cli, Commands, run_command};
