//! Execution state for task running
//!
//! Every task invocation runs in its own [`ExecutionState`], nested under
//! the state that invoked it. A state owns a private copy of its task and of
//! the resolved arguments, and optionally a shell; commands run on the
//! nearest shell up the parent chain.

use crate::config::types::{keys, HostTarget, Mapping, Value};
use crate::error::{shape_error, ExecutionError, ExpansionError, ExpansionResult, Result};
use crate::runner::args::parse_arguments;
use crate::runner::command::LocalShell;
use crate::runner::interpolate::{self, ExpansionHook, Scope};
use crate::runner::jobs::Jobs;
use crate::runner::shell::{OutputHandler, Shell, ShellFactory, SshShellFactory};
use crate::runner::task::expand_task;
use crate::ui::{LogLevel, Logger};
use std::rc::Rc;

/// One task invocation's scope
pub struct ExecutionState<'p> {
    parent: Option<&'p ExecutionState<'p>>,

    /// Root configuration, shared by every state
    config: Rc<Mapping>,

    /// Job handlers available to `job` and nested calls
    jobs: Rc<Jobs>,

    logger: Rc<dyn Logger>,
    shells: Rc<dyn ShellFactory>,
    hook: Option<Rc<ExpansionHook>>,

    /// This scope's own copy of its task
    task: Mapping,

    /// Arguments resolved so far, inherited from the parent
    args: Mapping,

    /// Command line tail that task argument specs are parsed from
    argv: Rc<[String]>,

    /// Ignore `host` and run everything on the root shell
    run_locally: bool,

    /// Nesting depth used to indent log lines
    level: usize,

    shell: Option<Box<dyn Shell>>,
}

impl ExecutionState<'static> {
    /// Create the root state for a loaded configuration
    ///
    /// The root state runs commands on the local machine and knows the
    /// standard jobs.
    pub fn new(config: Mapping, logger: Rc<dyn Logger>) -> Self {
        ExecutionState {
            parent: None,
            config: Rc::new(config),
            jobs: Rc::new(Jobs::standard()),
            logger,
            shells: Rc::new(SshShellFactory::new()),
            hook: None,
            task: Mapping::new(),
            args: Mapping::new(),
            argv: Rc::from(Vec::new()),
            run_locally: false,
            level: 0,
            shell: Some(Box::new(LocalShell::new())),
        }
    }
}

impl<'p> ExecutionState<'p> {
    /// Replace the root shell
    pub fn with_shell(mut self, shell: Box<dyn Shell>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Set the factory used to open remote shells
    pub fn with_shell_factory(mut self, shells: Rc<dyn ShellFactory>) -> Self {
        self.shells = shells;
        self
    }

    /// Set the job handlers
    pub fn with_jobs(mut self, jobs: Jobs) -> Self {
        self.jobs = Rc::new(jobs);
        self
    }

    /// Set the command line tail
    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = Rc::from(argv);
        self
    }

    /// Force every task to run on the local shell
    pub fn with_run_locally(mut self, run_locally: bool) -> Self {
        self.run_locally = run_locally;
        self
    }

    /// Resolve placeholders outside the `vars` and `args` namespaces
    pub fn with_expansion_hook(mut self, hook: Rc<ExpansionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Set the initial arguments
    pub fn with_args(mut self, args: Mapping) -> Self {
        self.args = args;
        self
    }

    pub fn task(&self) -> &Mapping {
        &self.task
    }

    pub fn args(&self) -> &Mapping {
        &self.args
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn run_locally(&self) -> bool {
        self.run_locally
    }

    pub fn config(&self) -> &Mapping {
        &self.config
    }

    /// The raw `tasks` section of the configuration
    pub fn tasks(&self) -> Option<&Mapping> {
        self.config.get(keys::TASKS).and_then(Value::as_mapping)
    }

    /// Whether this state owns a shell
    pub fn has_shell(&self) -> bool {
        self.shell.is_some()
    }

    /// Write a task log line at this state's nesting level
    pub fn log(&self, level: LogLevel, message: &str) {
        self.logger.log(level, self.level, message);
    }

    /// Expand placeholders in `value` as seen from this state
    pub fn expand(&self, value: &Value, recursive: bool) -> ExpansionResult<Value> {
        interpolate::expand(self, value, recursive)
    }

    /// Run the job registered as `job` with this state
    pub fn call(&self, job: &str, task: &Mapping) -> Result<()> {
        let handler = self
            .jobs
            .get(job)
            .ok_or_else(|| ExecutionError::UnknownJob(job.to_string()))?;
        handler.run(self, task)
    }

    /// Run `command` on the nearest shell up the parent chain
    pub fn execute(&self, command: &str, handler: &mut OutputHandler<'_>) -> Result<i32> {
        let mut current = Some(self);
        while let Some(state) = current {
            if let Some(shell) = &state.shell {
                return shell.run(command, handler);
            }
            current = state.parent;
        }

        Err(ExecutionError::NoShell.into())
    }

    /// Create the scope for a nested task
    ///
    /// The child works on its own copy of `task`. Arguments are resolved
    /// first so the task's own fields can refer to them; then the task is
    /// expanded, its name is logged and its remote shell is opened.
    pub fn spawn(&self, task: &Mapping) -> Result<ExecutionState<'_>> {
        let mut child = ExecutionState {
            parent: Some(self),
            config: Rc::clone(&self.config),
            jobs: Rc::clone(&self.jobs),
            logger: Rc::clone(&self.logger),
            shells: Rc::clone(&self.shells),
            hook: self.hook.clone(),
            task: task.clone(),
            args: self.args.clone(),
            argv: Rc::clone(&self.argv),
            run_locally: self.run_locally,
            level: self.level,
            shell: None,
        };

        log::trace!("spawning scope at level {}", child.level);

        child.resolve_params()?;
        child.resolve_args()?;

        let expanded = expand_task(&child, &child.task)?;
        child.task = expanded;

        child.report_name()?;
        child.open_shell()?;

        Ok(child)
    }

    fn resolve_params(&mut self) -> Result<()> {
        let Some(params) = self.task.get(keys::PARAMS) else {
            return Ok(());
        };

        let Value::Mapping(params) = self.expand(params, true)? else {
            return Err(shape_error("params should be map"));
        };

        self.args.extend(params);
        Ok(())
    }

    fn resolve_args(&mut self) -> Result<()> {
        let Some(specs) = self.task.get(keys::ARGS) else {
            return Ok(());
        };

        let Value::Mapping(specs) = self.expand(specs, true)? else {
            return Err(shape_error("args must be map"));
        };

        let pending: Mapping = specs
            .into_iter()
            .filter(|(name, _)| !self.args.contains_key(name))
            .collect();

        let parsed = parse_arguments(&pending, &self.argv)?;
        self.args.extend(parsed);
        Ok(())
    }

    fn report_name(&mut self) -> Result<()> {
        let Some(name) = self.task.get(keys::NAME) else {
            return Ok(());
        };

        let name = name
            .as_str()
            .ok_or_else(|| shape_error("task name should be string"))?
            .to_string();

        self.log(LogLevel::Name, &name);
        self.level += 1;
        Ok(())
    }

    fn open_shell(&mut self) -> Result<()> {
        if self.run_locally {
            return Ok(());
        }

        let Some(host) = self.task.get(keys::HOST) else {
            return Ok(());
        };

        let target = HostTarget::from_value(host)?;

        self.log(LogLevel::System, &format!("connecting to {}...", target.host));
        let shell = self.shells.connect(&target)?;
        self.log(LogLevel::System, "connection established");

        self.shell = Some(shell);
        Ok(())
    }

    /// Close the shell this state owns, if any
    pub fn close(&mut self) -> Result<()> {
        match self.shell.take() {
            Some(mut shell) => shell.close(),
            None => Ok(()),
        }
    }
}

impl Scope for ExecutionState<'_> {
    fn config(&self) -> &Mapping {
        &self.config
    }

    fn task(&self) -> Option<&Mapping> {
        Some(&self.task)
    }

    fn args(&self) -> &Mapping {
        &self.args
    }

    fn parent(&self) -> Option<&dyn Scope> {
        self.parent.map(|parent| parent as &dyn Scope)
    }

    fn expand_custom(&self, namespace: &str, rest: &str) -> ExpansionResult<Value> {
        match &self.hook {
            Some(hook) => hook(namespace, rest),
            None => Err(ExpansionError::UnknownNamespace(namespace.to_string())),
        }
    }
}

impl Drop for ExecutionState<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("failed to close shell: {}", e);
        }
    }
}
