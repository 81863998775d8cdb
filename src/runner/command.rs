//! Command execution
//!
//! This module spawns processes and streams their output line by line.

use crate::error::{ExecutionError, Result};
use crate::runner::shell::{OutputHandler, OutputKind, Shell};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command as StdCommand, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

/// Longest chunk the local shell reports as one line
pub const LOCAL_LINE_LIMIT: usize = 1024;

/// Runs commands on this machine through an interpreter such as `sh -c`
#[derive(Debug, Clone)]
pub struct LocalShell {
    interpreter: Vec<String>,
    line_limit: usize,
}

impl LocalShell {
    pub fn new() -> Self {
        LocalShell {
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            line_limit: LOCAL_LINE_LIMIT,
        }
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Set the maximum line length reported in one piece
    pub fn with_line_limit(mut self, line_limit: usize) -> Self {
        self.line_limit = line_limit.max(1);
        self
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell for LocalShell {
    fn run(&self, command: &str, handler: &mut OutputHandler<'_>) -> Result<i32> {
        let (program, args) = self.interpreter.split_first().ok_or_else(|| {
            ExecutionError::Spawn {
                command: command.to_string(),
                error: "interpreter is empty".to_string(),
            }
        })?;

        let mut process = StdCommand::new(program);
        process.args(args).arg(command);
        run_streaming(process, command, self.line_limit, handler)
    }
}

/// Spawn `process`, report its output to `handler` line by line, and
/// return its exit status
///
/// Both pipes are drained on reader threads; the handler itself always runs
/// on the calling thread. If the handler fails, the process is killed and
/// the handler's error is returned.
pub fn run_streaming(
    mut process: StdCommand,
    display: &str,
    line_limit: usize,
    handler: &mut OutputHandler<'_>,
) -> Result<i32> {
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = process.spawn().map_err(|e| ExecutionError::Spawn {
        command: display.to_string(),
        error: e.to_string(),
    })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        readers.push(thread::spawn(move || pump(stdout, OutputKind::StdOut, line_limit, tx)));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        readers.push(thread::spawn(move || pump(stderr, OutputKind::StdErr, line_limit, tx)));
    }
    drop(tx);

    for (kind, line) in rx {
        if let Err(e) = handler(kind, line.as_str()) {
            log::debug!("output handler failed, killing {}", display);
            if let Err(kill_error) = child.kill() {
                log::warn!("failed to kill child process {}: {}", child.id(), kill_error);
            }
            child.wait().ok();
            return Err(e);
        }
    }

    for reader in readers {
        match reader.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("failed to read output of {}: {}", display, e),
            Err(_) => log::warn!("output reader for {} panicked", display),
        }
    }

    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

fn pump<R: Read>(
    pipe: R,
    kind: OutputKind,
    line_limit: usize,
    tx: Sender<(OutputKind, String)>,
) -> io::Result<()> {
    let mut reader = BufReader::new(pipe);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(());
        }

        let text = String::from_utf8_lossy(&buffer);
        let line = text.trim_end_matches(&['\n', '\r'][..]);
        for chunk in split_line(line, line_limit) {
            if tx.send((kind, chunk)).is_err() {
                // receiver gone: the run was aborted
                return Ok(());
            }
        }
    }
}

/// Break a line into pieces of at most `limit` characters
pub fn split_line(line: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }

    chars
        .chunks(limit.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DroverError;

    fn collect(shell: &LocalShell, command: &str) -> (i32, Vec<(OutputKind, String)>) {
        let mut lines = Vec::new();
        let status = shell
            .run(command, &mut |kind, line| {
                lines.push((kind, line.to_string()));
                Ok(())
            })
            .unwrap();
        (status, lines)
    }

    #[test]
    fn test_execute_simple_command() {
        let (status, lines) = collect(&LocalShell::new(), "echo test");
        assert_eq!(status, 0);
        assert_eq!(lines, vec![(OutputKind::StdOut, "test".to_string())]);
    }

    #[test]
    fn test_execute_stderr_command() {
        let (status, lines) = collect(&LocalShell::new(), "echo test 1>&2");
        assert_eq!(status, 0);
        assert_eq!(lines, vec![(OutputKind::StdErr, "test".to_string())]);
    }

    #[test]
    fn test_execute_failing_command() {
        let (status, lines) = collect(&LocalShell::new(), "exit 3");
        assert_eq!(status, 3);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_lines_arrive_in_order() {
        let (_, lines) = collect(&LocalShell::new(), "echo 1; echo 2; echo 3");
        let text: Vec<_> = lines.into_iter().map(|(_, l)| l).collect();
        assert_eq!(text, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_long_lines_are_chunked() {
        let shell = LocalShell::new().with_line_limit(4);
        let (_, lines) = collect(&shell, "echo abcdefghij");
        let text: Vec<_> = lines.into_iter().map(|(_, l)| l).collect();
        assert_eq!(text, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_handler_error_aborts_run() {
        let shell = LocalShell::new();
        let result = shell.run("echo out; sleep 5", &mut |_, line| {
            Err(ExecutionError::ContextOutput(line.to_string()).into())
        });

        match result {
            Err(DroverError::Execution(ExecutionError::ContextOutput(line))) => {
                assert_eq!(line, "out")
            }
            _ => panic!("expected handler error"),
        }
    }

    #[test]
    fn test_empty_interpreter() {
        let shell = LocalShell::new().with_interpreter(Vec::new());
        let result = shell.run("true", &mut |_, _| Ok(()));
        assert!(matches!(
            result,
            Err(DroverError::Execution(ExecutionError::Spawn { .. }))
        ));
    }

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("", 3), vec![""]);
        assert_eq!(split_line("abcd", 3), vec!["abc", "d"]);
    }
}
