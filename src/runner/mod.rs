//! Task execution engine
//!
//! This module handles the execution of tasks: scoping and argument
//! resolution, placeholder expansion, job dispatch, and running commands
//! on local or remote shells.

pub mod args;
pub mod command;
pub mod context;
pub mod interpolate;
pub mod jobs;
pub mod shell;
pub mod task;

// Re-export main types
pub use command::LocalShell;
pub use context::ExecutionState;
pub use interpolate::{display_value, ExpansionHook, Expression, Scope};
pub use jobs::{Job, Jobs};
pub use shell::{OutputHandler, OutputKind, Shell, ShellFactory, SshShellFactory};
pub use task::{create_task, expand_task};
