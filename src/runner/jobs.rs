//! Job handlers
//!
//! A task's `job` key names the handler that interprets it. `call` is the
//! entry point for every task: it spawns the task's scope, checks its
//! context, dispatches to the job and applies `rescue` and `ensure`.

use crate::config::types::{keys, Mapping, Value};
use crate::error::{shape_error, DroverError, ExecutionError, Result};
use crate::runner::context::ExecutionState;
use crate::runner::shell::OutputKind;
use crate::runner::task::create_task;
use crate::ui::LogLevel;
use std::collections::HashMap;

pub const CALL: &str = "call";
pub const EXECUTE: &str = "execute";
pub const RUN: &str = "run";
pub const RUN_USER_TASK: &str = "run-user-task";

/// A named task handler
pub trait Job {
    fn run(&self, state: &ExecutionState<'_>, task: &Mapping) -> Result<()>;
}

impl<F> Job for F
where
    F: Fn(&ExecutionState<'_>, &Mapping) -> Result<()>,
{
    fn run(&self, state: &ExecutionState<'_>, task: &Mapping) -> Result<()> {
        self(state, task)
    }
}

/// Registry of job handlers by name
#[derive(Default)]
pub struct Jobs {
    handlers: HashMap<String, Box<dyn Job>>,
}

impl Jobs {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in jobs
    pub fn standard() -> Self {
        Jobs::new()
            .with_job(CALL, call)
            .with_job(EXECUTE, execute)
            .with_job(RUN, run)
            .with_job(RUN_USER_TASK, run_user_task)
    }

    /// Register `job` under `name`, replacing any previous handler
    pub fn with_job(mut self, name: &str, job: impl Job + 'static) -> Self {
        self.handlers.insert(name.to_string(), Box::new(job));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Job> {
        self.handlers.get(name).map(|job| job.as_ref())
    }

    /// Registered job names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Log `err` as a failed command unless an inner scope already did
fn report(state: &ExecutionState<'_>, err: DroverError) -> DroverError {
    if !err.is_reported() {
        state.log(LogLevel::CommandFail, &err.to_string());
    }
    err.into_reported()
}

/// Run a task in its own scope
///
/// Errors returned from here have always been logged.
pub fn call(state: &ExecutionState<'_>, task: &Mapping) -> Result<()> {
    let child = state.spawn(task).map_err(|e| report(state, e))?;
    let task = child.task();

    let outcome = match check_context(&child, task) {
        Ok(true) => dispatch(&child, task).map_err(|e| report(&child, e)),
        Ok(false) => return Ok(()),
        Err(e) => Err(e),
    };

    finish(&child, task, outcome)
}

/// Whether the task should run; context output or a failure to run the
/// context command is an error
fn check_context(state: &ExecutionState<'_>, task: &Mapping) -> Result<bool> {
    let Some(context) = task.get(keys::CONTEXT) else {
        return Ok(true);
    };

    let context = context
        .as_str()
        .ok_or_else(|| report(state, ExecutionError::ContextType.into()))?;

    state.log(LogLevel::Context, context);
    let status = state
        .execute(context, &mut |_, line| {
            Err(ExecutionError::ContextOutput(line.to_string()).into())
        })
        .map_err(|e| report(state, e))?;

    if status != 0 {
        log::debug!("context exited with {}, skipping task", status);
    }

    Ok(status == 0)
}

fn dispatch(state: &ExecutionState<'_>, task: &Mapping) -> Result<()> {
    let Some(job) = task.get(keys::JOB) else {
        if !task.contains_key(keys::COMMAND) {
            return Err(shape_error("\"job\" or \"command\" should be defined in task"));
        }
        return state.call(EXECUTE, task);
    };

    let job = job
        .as_str()
        .filter(|job| !job.is_empty())
        .ok_or_else(|| shape_error("job should be non-empty string"))?;

    if job == CALL {
        return Err(ExecutionError::ReservedJob.into());
    }

    state.call(job, task)
}

fn finish(state: &ExecutionState<'_>, task: &Mapping, mut outcome: Result<()>) -> Result<()> {
    if outcome.is_err() {
        if let Some(rescue) = task.get(keys::RESCUE) {
            state.log(LogLevel::Rescue, "[rescue]");
            outcome = state.call(CALL, &create_task(rescue.clone()));
        }
    }

    if let Some(ensure) = task.get(keys::ENSURE) {
        state.log(LogLevel::Ensure, "[ensure]");
        if let Err(e) = state.call(CALL, &create_task(ensure.clone())) {
            outcome = Err(e);
        }
    }

    outcome
}

/// Run the task's `command`: a shell command string, a nested task, or a
/// sequence of either
pub fn execute(state: &ExecutionState<'_>, task: &Mapping) -> Result<()> {
    let command = task
        .get(keys::COMMAND)
        .ok_or_else(|| shape_error("command should be defined in task"))?;

    match state.expand(command, false)? {
        Value::Sequence(items) => {
            for item in &items {
                let item = state.expand(item, false)?;
                state.call(CALL, &create_task(item))?;
            }
            Ok(())
        }
        Value::Mapping(nested) => state.call(CALL, &nested),
        Value::String(line) => run_command(state, &line),
        _ => Err(shape_error("command should be string, array or map")),
    }
}

fn run_command(state: &ExecutionState<'_>, line: &str) -> Result<()> {
    state.log(LogLevel::Command, line);

    let status = state.execute(line, &mut |kind, text| {
        match kind {
            OutputKind::StdOut => state.log(LogLevel::StdOut, text),
            OutputKind::StdErr => state.log(LogLevel::StdErr, text),
        }
        Ok(())
    })?;

    if status != 0 {
        return Err(ExecutionError::CommandFailed(status).into());
    }

    Ok(())
}

/// Call the top-level task named by the `task` key
pub fn run(state: &ExecutionState<'_>, task: &Mapping) -> Result<()> {
    run_named(state, task, keys::TASK)
}

/// Deprecated spelling of [`run`] reading the `task-name` key
pub fn run_user_task(state: &ExecutionState<'_>, task: &Mapping) -> Result<()> {
    state.log(LogLevel::System, "\"run-user-task\" is deprecated");
    run_named(state, task, keys::TASK_NAME)
}

fn run_named(state: &ExecutionState<'_>, task: &Mapping, key: &str) -> Result<()> {
    let name = task
        .get(key)
        .ok_or_else(|| shape_error(format!("\"{}\" should be defined in task", key)))?;

    let name = state.expand(name, false)?;
    let name = name
        .as_str()
        .ok_or_else(|| shape_error("task name should be string"))?;

    let user_task = state
        .tasks()
        .and_then(|tasks| tasks.get(name))
        .ok_or_else(|| ExecutionError::TaskNotFound(name.to_string()))?;

    state.call(CALL, &create_task(user_task.clone()))
}
