//! Drover - a YAML-based task orchestrator
//!
//! Drover reads a tree of tasks from `.drover.yml` (with file includes),
//! expands `${vars.*}` and `${args.*}` placeholders, and runs the selected
//! task's commands on the local machine or on remote hosts over SSH, with
//! context checks, rescue and ensure handling.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod test_support;
pub mod ui;

// Re-export commonly used types
pub use error::{DroverError, Result};

/// Current version of Drover
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
