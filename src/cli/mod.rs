//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, configuration discovery,
//! shell completion and the process exit code.

pub mod app;

// Re-export main types
pub use app::*;
