//! Core configuration types
//!
//! The configuration tree itself stays untyped (`serde_yaml::Value`) because
//! tasks are expanded and rewritten at run time. This module holds the names
//! of the recognized task keys and typed views over the few sub-structures
//! that are read as a whole: argument specifications and host targets.

use crate::error::{ExecutionError, ExecutionResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use serde_yaml::{Mapping, Value};

/// Keys recognized in a task mapping
pub mod keys {
    pub const NAME: &str = "name";
    pub const HOST: &str = "host";
    pub const CONTEXT: &str = "context";
    pub const JOB: &str = "job";
    pub const COMMAND: &str = "command";
    pub const ARGS: &str = "args";
    pub const PARAMS: &str = "params";
    pub const VARS: &str = "vars";
    pub const RESCUE: &str = "rescue";
    pub const ENSURE: &str = "ensure";
    pub const TASK: &str = "task";
    pub const TASK_NAME: &str = "task-name";

    /// Top-level section holding the user tasks
    pub const TASKS: &str = "tasks";
}

/// An argument specification from a task's `args` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArgSpec {
    /// Value type
    #[serde(rename = "type", default)]
    pub arg_type: ArgType,

    /// Single-character short flag
    #[serde(default, alias = "short", skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,

    /// Whether the argument must be present on the command line
    #[serde(default)]
    pub required: bool,

    /// Value used when the argument is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Help text
    #[serde(default, alias = "usage", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ArgSpec {
    /// Read a spec from its configuration value; an empty entry means a
    /// plain optional string argument
    pub fn from_value(name: &str, value: &Value) -> ExecutionResult<Self> {
        if value.is_null() {
            return Ok(ArgSpec::default());
        }

        serde_yaml::from_value(value.clone()).map_err(|e| {
            ExecutionError::Arguments(format!("invalid specification for argument {}: {}", name, e))
        })
    }

    /// The short flag character, if one is configured
    pub fn short(&self) -> Option<char> {
        self.shortcut.as_deref().and_then(|s| s.chars().next())
    }
}

/// Argument value types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    #[default]
    String,
    #[serde(alias = "bool", alias = "boolean")]
    Flag,
    #[serde(alias = "integer")]
    Int,
    Float,
}

/// Where a task's commands run when it names a `host`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    /// `[user@]host[:port]`
    pub host: String,

    /// Private key file; `None` means the default key
    pub key: Option<PathBuf>,
}

impl HostTarget {
    /// Read a host target from the expanded `host` value, which is either a
    /// plain string or a `{host, key}` mapping
    pub fn from_value(value: &Value) -> ExecutionResult<Self> {
        let shape = |message: &str| ExecutionError::TaskShape(message.to_string());

        match value {
            Value::String(host) => Ok(HostTarget {
                host: host.clone(),
                key: None,
            }),
            Value::Mapping(mapping) => {
                let host = mapping
                    .get(keys::HOST)
                    .ok_or_else(|| shape("host must be set in host section"))?
                    .as_str()
                    .ok_or_else(|| shape("host must be string"))?
                    .to_string();

                let key = match mapping.get("key") {
                    Some(Value::String(key)) => Some(PathBuf::from(key)),
                    Some(_) => return Err(shape("keyfile should be string")),
                    None => None,
                };

                Ok(HostTarget { host, key })
            }
            _ => Err(shape("host should be string or map")),
        }
    }
}
