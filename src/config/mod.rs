//! Configuration loading
//!
//! This module handles discovery of the configuration file, resolution of
//! include directives, and typed views over task definitions.

pub mod parse;
pub mod types;

// Re-export main types
pub use parse::*;
pub use types::*;
