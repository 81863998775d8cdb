//! Test helpers: shells that replay scripted output instead of running
//! processes.

use crate::config::HostTarget;
use crate::error::{ExecutionError, Result};
use crate::runner::shell::{OutputHandler, OutputKind, Shell, ShellFactory};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// What scripted shells saw, shared between the shells and the test.
#[derive(Debug, Clone, Default)]
pub struct ShellRecord {
    commands: Rc<RefCell<Vec<String>>>,
    closes: Rc<Cell<usize>>,
}

impl ShellRecord {
    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// How many times a shell sharing this record was closed.
    pub fn close_count(&self) -> usize {
        self.closes.get()
    }
}

#[derive(Debug, Clone, Default)]
struct Response {
    status: i32,
    lines: Vec<(OutputKind, String)>,
}

/// Shell answering each command from a script; unscripted commands succeed
/// silently.
#[derive(Debug, Clone)]
pub struct ScriptedShell {
    record: ShellRecord,
    responses: HashMap<String, Response>,
}

impl ScriptedShell {
    pub fn new(record: ShellRecord) -> Self {
        ScriptedShell {
            record,
            responses: HashMap::new(),
        }
    }

    /// Make `command` exit with `status` and print nothing.
    pub fn with_status(self, command: &str, status: i32) -> Self {
        self.with_lines(command, status, OutputKind::StdOut, &[])
    }

    /// Make `command` print `lines` to stdout and exit with `status`.
    pub fn with_output(self, command: &str, status: i32, lines: &[&str]) -> Self {
        self.with_lines(command, status, OutputKind::StdOut, lines)
    }

    /// Make `command` print `lines` to stderr and exit with `status`.
    pub fn with_stderr(self, command: &str, status: i32, lines: &[&str]) -> Self {
        self.with_lines(command, status, OutputKind::StdErr, lines)
    }

    fn with_lines(mut self, command: &str, status: i32, kind: OutputKind, lines: &[&str]) -> Self {
        let response = Response {
            status,
            lines: lines.iter().map(|line| (kind, line.to_string())).collect(),
        };
        self.responses.insert(command.to_string(), response);
        self
    }
}

impl Shell for ScriptedShell {
    fn run(&self, command: &str, handler: &mut OutputHandler<'_>) -> Result<i32> {
        self.record.commands.borrow_mut().push(command.to_string());

        let Some(response) = self.responses.get(command) else {
            return Ok(0);
        };

        for (kind, line) in &response.lines {
            handler(*kind, line.as_str())?;
        }

        Ok(response.status)
    }

    fn close(&mut self) -> Result<()> {
        self.record.closes.set(self.record.closes.get() + 1);
        Ok(())
    }
}

/// Factory handing out copies of a scripted shell, or failing every
/// connection.
#[derive(Debug)]
pub struct ScriptedShellFactory {
    shell: ScriptedShell,
    error: Option<String>,
    targets: RefCell<Vec<HostTarget>>,
}

impl ScriptedShellFactory {
    /// Factory whose shells are silent and share `record`.
    pub fn new(record: ShellRecord) -> Self {
        Self::from_shell(ScriptedShell::new(record))
    }

    /// Factory whose shells are copies of `shell`.
    pub fn from_shell(shell: ScriptedShell) -> Self {
        ScriptedShellFactory {
            shell,
            error: None,
            targets: RefCell::new(Vec::new()),
        }
    }

    /// Factory refusing every connection with `error`.
    pub fn failing(error: &str) -> Self {
        ScriptedShellFactory {
            error: Some(error.to_string()),
            ..Self::new(ShellRecord::default())
        }
    }

    /// Hosts connected to so far.
    pub fn targets(&self) -> Vec<HostTarget> {
        self.targets.borrow().clone()
    }
}

impl ShellFactory for ScriptedShellFactory {
    fn connect(&self, target: &HostTarget) -> Result<Box<dyn Shell>> {
        self.targets.borrow_mut().push(target.clone());

        if let Some(error) = &self.error {
            return Err(ExecutionError::RemoteConnect {
                host: target.host.clone(),
                error: error.clone(),
            }
            .into());
        }

        Ok(Box::new(self.shell.clone()))
    }
}
