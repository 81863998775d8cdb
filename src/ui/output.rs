//! Task log output
//!
//! Every event produced while running tasks goes through a [`Logger`]. The
//! terminal implementation decides how each level looks; the runner only
//! says what happened and at which nesting depth.

use colored::{ColoredString, Colorize};
use std::cell::RefCell;
use std::env;
use std::io::{self, Write};

/// Wrap width used when `COLUMNS` is not set
pub const DEFAULT_WIDTH: usize = 80;

/// Kind of a task log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Name,
    System,
    StdOut,
    StdErr,
    Command,
    CommandFail,
    Context,
    Rescue,
    Ensure,
    TaskFail,
    TaskSuccess,
}

/// Sink for task log events
pub trait Logger {
    /// Record `message` at nesting depth `indent`
    fn log(&self, level: LogLevel, indent: usize, message: &str);
}

/// Colored logger writing to a terminal-like stream
pub struct TerminalLogger {
    out: RefCell<Box<dyn Write>>,
    width: usize,
}

impl TerminalLogger {
    /// Logger writing to standard output
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Logger writing to an arbitrary stream
    pub fn new(out: Box<dyn Write>) -> Self {
        TerminalLogger {
            out: RefCell::new(out),
            width: terminal_width(),
        }
    }

    /// Set the wrap width
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }
}

impl Logger for TerminalLogger {
    fn log(&self, level: LogLevel, indent: usize, message: &str) {
        let (prefix, marker) = decoration(level);
        let text = format(indent, prefix, marker, message, self.width, |s| {
            paint(level, s).to_string()
        });

        let mut out = self.out.borrow_mut();
        if let Err(e) = writeln!(out, "{}", text) {
            log::warn!("failed to write task log: {}", e);
        }
    }
}

fn terminal_width() -> usize {
    env::var("COLUMNS")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|w| *w > 0)
        .unwrap_or(DEFAULT_WIDTH)
}

/// Uncolored prefix and colored marker for each level
fn decoration(level: LogLevel) -> (&'static str, &'static str) {
    match level {
        LogLevel::Name => ("", "# "),
        LogLevel::System => ("", "% "),
        LogLevel::Command => ("", "$ "),
        LogLevel::StdOut => ("  ", "> "),
        LogLevel::StdErr => ("  ", "! "),
        LogLevel::CommandFail => ("", " ** "),
        LogLevel::Context => ("", "? "),
        LogLevel::Rescue | LogLevel::Ensure | LogLevel::TaskFail | LogLevel::TaskSuccess => {
            ("", "")
        }
    }
}

fn paint(level: LogLevel, text: &str) -> ColoredString {
    match level {
        LogLevel::Name => text.bold().yellow(),
        LogLevel::System => text.magenta(),
        LogLevel::StdOut => text.normal(),
        LogLevel::StdErr => text.red(),
        LogLevel::Command => text.bold().green(),
        LogLevel::CommandFail | LogLevel::TaskFail => text.bold().white().on_red(),
        LogLevel::Context => text.cyan(),
        LogLevel::Rescue | LogLevel::Ensure => text.bold().yellow(),
        LogLevel::TaskSuccess => text.bold().white().on_green(),
    }
}

/// Lay out a log message: indent two spaces per level, put `prefix` before
/// the colored part, and align continuation lines under the first line's text
pub fn format(
    indent: usize,
    prefix: &str,
    marker: &str,
    message: &str,
    width: usize,
    colorize: impl Fn(&str) -> String,
) -> String {
    let lead = format!("{}{}", "  ".repeat(indent), prefix);
    let continuation = " ".repeat(marker.chars().count());

    wrap(message, width)
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let marker = if index == 0 { marker } else { &continuation };
            format!("{}{}", lead, colorize(&format!("{}{}", marker, line)))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a message into lines no longer than `width` characters
pub fn wrap(message: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut result = Vec::new();

    for line in message.split('\n') {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            result.push(String::new());
            continue;
        }

        for chunk in chars.chunks(width) {
            result.push(chunk.iter().collect());
        }
    }

    result
}

/// One captured log event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub indent: usize,
    pub message: String,
}

/// Logger that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: RefCell<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events logged so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }

    /// `(level, message)` pairs, for assertions that ignore nesting
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.records
            .borrow()
            .iter()
            .map(|r| (r.level, r.message.clone()))
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, indent: usize, message: &str) {
        self.records.borrow_mut().push(LogRecord {
            level,
            indent,
            message: message.to_string(),
        });
    }
}
