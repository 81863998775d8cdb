//! Task definitions
//!
//! Tasks stay untyped mappings so that any key can hold a placeholder until
//! the scope running the task expands it.

use crate::config::types::{keys, Mapping, Value};
use crate::error::ExpansionResult;
use crate::runner::interpolate::{Expression, Scope};

/// Keys expanded through nested mappings and sequences when a task is spawned
const DEEP_KEYS: [&str; 2] = [keys::NAME, keys::HOST];

/// Keys expanded only at their top level when a task is spawned
const SHALLOW_KEYS: [&str; 5] = [
    keys::CONTEXT,
    keys::JOB,
    keys::COMMAND,
    keys::RESCUE,
    keys::ENSURE,
];

/// Turn a value into a task: mappings are used as they are, anything else
/// becomes `{command: value}`
pub fn create_task(value: Value) -> Mapping {
    match value {
        Value::Mapping(mapping) => mapping,
        other => {
            let mut task = Mapping::new();
            task.insert(Value::String(keys::COMMAND.to_string()), other);
            task
        }
    }
}

/// Expand the task keys that are resolved at spawn time, as seen from
/// `scope`, and return the updated task
pub fn expand_task(scope: &dyn Scope, task: &Mapping) -> ExpansionResult<Mapping> {
    let mut result = task.clone();
    let mut expression = Expression::new(scope);

    let fields = DEEP_KEYS
        .iter()
        .map(|key| (*key, true))
        .chain(SHALLOW_KEYS.iter().map(|key| (*key, false)));

    for (key, recursive) in fields {
        if let Some(value) = task.get(key) {
            let expanded = expression.expand(value, recursive)?;
            result.insert(Value::String(key.to_string()), expanded);
        }
    }

    Ok(result)
}
