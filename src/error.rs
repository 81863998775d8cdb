//! Error types for Drover

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Drover operations
pub type Result<T> = std::result::Result<T, DroverError>;

/// Main error type for Drover
#[derive(Error, Debug)]
pub enum DroverError {
    /// Configuration loading errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Placeholder expansion errors
    #[error(transparent)]
    Expansion(#[from] ExpansionError),

    /// Task execution errors
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error that was already written to the task log by the scope
    /// where it happened
    #[error(transparent)]
    Reported(Box<DroverError>),
}

impl DroverError {
    /// Whether this error has already been logged
    pub fn is_reported(&self) -> bool {
        matches!(self, DroverError::Reported(_))
    }

    /// Mark the error as logged, so enclosing scopes do not log it again
    pub fn into_reported(self) -> DroverError {
        if self.is_reported() {
            self
        } else {
            DroverError::Reported(Box::new(self))
        }
    }

    /// The underlying error, with any reported marker removed
    pub fn inner(&self) -> &DroverError {
        match self {
            DroverError::Reported(inner) => inner.inner(),
            other => other,
        }
    }
}

/// Configuration loading and include resolution errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("failed to read {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("recursive include detected: {0}")]
    RecursiveInclude(String),

    #[error("failed to expand glob {pattern}: {error}")]
    Glob { pattern: String, error: String },

    #[error("config in {0} should be map")]
    MergeNotMapping(PathBuf),

    #[error("value is already present in {key} (loading {path})")]
    MergeCollision { key: String, path: PathBuf },

    #[error("config value should be map in {0}")]
    NotMapping(PathBuf),

    #[error("tasks section must be set in config")]
    MissingTasks,

    #[error("tasks section must be map")]
    TasksNotMapping,
}

/// Placeholder expansion errors
#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("wrong expression: {0}")]
    Malformed(String),

    #[error("unknown expression: {0}")]
    UnknownNamespace(String),

    #[error("undefined variable {0}")]
    UndefinedVariable(String),

    #[error("{0} should be map")]
    NotMapping(String),

    #[error("recursive expression detected: {0}")]
    Recursive(String),

    #[error("{0}")]
    Custom(String),

    #[error("{}", join_messages(.0))]
    Multiple(Vec<ExpansionError>),
}

fn join_messages(errors: &[ExpansionError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("{0}")]
    TaskShape(String),

    #[error("context should be string")]
    ContextType,

    #[error(
        "context must not print to stdout or stderr; any output counted as error; received output: {0}"
    )]
    ContextOutput(String),

    #[error("failed to connect to {host}: {error}")]
    RemoteConnect { host: String, error: String },

    #[error("all shells closed")]
    NoShell,

    #[error("command execution failed: non-zero exit status {0} received")]
    CommandFailed(i32),

    #[error("unknown job {0}")]
    UnknownJob(String),

    #[error("call is system name and can not be used")]
    ReservedJob,

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("{0}")]
    Arguments(String),

    #[error("failed to run {command}: {error}")]
    Spawn { command: String, error: String },
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for expansion operations
pub type ExpansionResult<T> = std::result::Result<T, ExpansionError>;

/// Helper to build a task shape error
pub fn shape_error(message: impl Into<String>) -> DroverError {
    ExecutionError::TaskShape(message.into()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_is_transparent() {
        let err: DroverError = ExecutionError::CommandFailed(2).into();
        let reported = err.into_reported();
        assert!(reported.is_reported());
        assert_eq!(
            reported.to_string(),
            "command execution failed: non-zero exit status 2 received"
        );
    }

    #[test]
    fn test_into_reported_does_not_nest() {
        let err: DroverError = ExecutionError::NoShell.into();
        let twice = err.into_reported().into_reported();
        match twice {
            DroverError::Reported(inner) => assert!(!inner.is_reported()),
            _ => panic!("expected reported error"),
        }
    }

    #[test]
    fn test_inner_unwraps_reported() {
        let err: DroverError = ExecutionError::UnknownJob("deploy".to_string()).into();
        let reported = err.into_reported();
        assert!(matches!(
            reported.inner(),
            DroverError::Execution(ExecutionError::UnknownJob(name)) if name == "deploy"
        ));
    }

    #[test]
    fn test_multiple_joins_messages() {
        let err = ExpansionError::Multiple(vec![
            ExpansionError::UndefinedVariable("vars.a".to_string()),
            ExpansionError::UndefinedVariable("vars.b".to_string()),
        ]);
        assert_eq!(err.to_string(), "undefined variable vars.a\nundefined variable vars.b");
    }
}
