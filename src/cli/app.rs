//! Main CLI application

use crate::config::{find_config_file, keys, load_config_file, Value, CONFIG_ENV_VAR};
use crate::error::{ConfigError, DroverError, ExecutionError, Result};
use crate::runner::jobs::CALL;
use crate::runner::{create_task, ExecutionState, LocalShell, Shell, ShellFactory, SshShellFactory};
use crate::ui::{LogLevel, Logger, TerminalLogger};
use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell as CompletionShell;
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

/// Printed when no task is named on the command line
pub const NO_TASK_MESSAGE: &str =
    "task must be set in command line options; use --help to receive help";

const TASK_COMPLETED: &str = "task completed";
const TASK_FAILED: &str = " ** task execution failed (check logs for details) ** ";

/// Options read from the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Explicit configuration file
    pub config: Option<PathBuf>,

    /// Run every task on the local machine
    pub run_locally: bool,

    /// Print diagnostic messages
    pub verbose: bool,

    /// Print a completion script for this shell instead of running a task
    pub completions: Option<CompletionShell>,

    /// Task name followed by the task's own arguments
    pub tail: Vec<String>,
}

impl Options {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Options {
            config: matches.get_one::<PathBuf>("config").cloned(),
            run_locally: matches.get_flag("local"),
            verbose: matches.get_flag("verbose"),
            completions: matches.get_one::<CompletionShell>("completions").copied(),
            tail: matches
                .get_many::<String>("command")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Parse options from an argument list that starts with the binary name
    pub fn try_parse_from<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        build_command()
            .try_get_matches_from(args)
            .map(|matches| Self::from_matches(&matches))
    }
}

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("drover")
        .version(crate::VERSION)
        .about("Run YAML-defined tasks locally or over SSH")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help(format!(
                    "Configuration file [default: {} in this or a parent directory, or ${}]",
                    crate::config::CONFIG_FILE_NAME,
                    CONFIG_ENV_VAR
                )),
        )
        .arg(
            Arg::new("local")
                .short('l')
                .long("local")
                .help("Call all tasks locally")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print diagnostic messages")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .value_parser(value_parser!(CompletionShell))
                .help("Print a shell completion script and exit"),
        )
        .arg(
            Arg::new("command")
                .value_name("TASK")
                .help("Task to run, followed by its arguments")
                .num_args(1..)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        )
}

/// CLI application
pub struct App {
    options: Options,
    logger: Rc<dyn Logger>,
    shells: Rc<dyn ShellFactory>,
    shell: Box<dyn Shell>,
}

impl App {
    /// Create an app logging to the terminal and running commands locally
    /// or over SSH
    pub fn new(options: Options) -> Self {
        App {
            options,
            logger: Rc::new(TerminalLogger::stdout()),
            shells: Rc::new(SshShellFactory::new()),
            shell: Box::new(LocalShell::new()),
        }
    }

    /// Set the task log
    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the factory used for tasks with a `host`
    pub fn with_shell_factory(mut self, shells: Rc<dyn ShellFactory>) -> Self {
        self.shells = shells;
        self
    }

    /// Set the shell used for tasks without a `host`
    pub fn with_shell(mut self, shell: Box<dyn Shell>) -> Self {
        self.shell = shell;
        self
    }

    /// Run the selected task and log the final line
    ///
    /// Returns whether the task succeeded.
    pub fn run(self) -> bool {
        let logger = Rc::clone(&self.logger);

        match self.run_task() {
            Ok(()) => {
                logger.log(LogLevel::TaskSuccess, 0, TASK_COMPLETED);
                true
            }
            Err(e) => {
                log::debug!("task failed: {:?}", e.inner());
                if !e.is_reported() {
                    logger.log(LogLevel::CommandFail, 0, &e.to_string());
                }
                logger.log(LogLevel::TaskFail, 0, TASK_FAILED);
                false
            }
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.options.config {
            return Ok(path.clone());
        }

        if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }

        Ok(find_config_file()?)
    }

    fn run_task(self) -> Result<()> {
        if let Some(first) = self.options.tail.first() {
            if first.starts_with('-') {
                return Err(ExecutionError::Arguments(format!("unknown option {}", first)).into());
            }
        }

        let path = self.config_path()?;
        log::debug!("loading configuration from {}", path.display());
        let config = load_config_file(&path)?;

        let argv = self.options.tail.iter().skip(1).cloned().collect();
        let state = ExecutionState::new(config, self.logger)
            .with_shell(self.shell)
            .with_shell_factory(self.shells)
            .with_argv(argv)
            .with_run_locally(self.options.run_locally);

        let raw = state
            .config()
            .get(keys::TASKS)
            .ok_or(ConfigError::MissingTasks)?;

        let Value::Mapping(tasks) = state.expand(raw, false)? else {
            return Err(ConfigError::TasksNotMapping.into());
        };

        let Some(name) = self.options.tail.first() else {
            eprintln!("{}", NO_TASK_MESSAGE);
            let err: DroverError = ExecutionError::Arguments("no task provided".to_string()).into();
            return Err(err.into_reported());
        };

        let task = tasks
            .get(name.as_str())
            .ok_or_else(|| ExecutionError::TaskNotFound(name.clone()))?;

        log::debug!("running task {}", name);
        state.call(CALL, &create_task(task.clone()))
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default_filter = if verbose { "debug" } else { "warn" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init()
        .context("failed to initialize diagnostics")
}

/// Run the CLI application and return the process exit code
pub fn run() -> anyhow::Result<i32> {
    let matches = build_command().get_matches();
    let options = Options::from_matches(&matches);

    init_logging(options.verbose)?;

    if let Some(shell) = options.completions {
        let mut cmd = build_command();
        let mut stdout = io::stdout();
        clap_complete::generate(shell, &mut cmd, "drover", &mut stdout);
        stdout.flush().context("failed to write completions")?;
        return Ok(0);
    }

    let success = App::new(options).run();
    Ok(if success { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedShell, ShellRecord};
    use crate::ui::RecordingLogger;
    use std::fs;
    use tempfile::TempDir;

    fn entry(level: LogLevel, message: &str) -> (LogLevel, String) {
        (level, message.to_string())
    }

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".drover.yml");
        fs::write(&path, contents).unwrap();
        (temp_dir, path)
    }

    fn run_app(
        path: &PathBuf,
        tail: &[&str],
        shell: ScriptedShell,
    ) -> (bool, Vec<(LogLevel, String)>) {
        let logger = Rc::new(RecordingLogger::new());
        let options = Options {
            config: Some(path.clone()),
            tail: tail.iter().map(|s| s.to_string()).collect(),
            ..Options::default()
        };

        let success = App::new(options)
            .with_logger(logger.clone())
            .with_shell(Box::new(shell))
            .run();
        (success, logger.entries())
    }

    #[test]
    fn test_parse_options() {
        let options = Options::try_parse_from([
            "drover", "-c", "ops.yml", "-l", "deploy", "--env", "prod",
        ])
        .unwrap();

        assert_eq!(options.config, Some(PathBuf::from("ops.yml")));
        assert!(options.run_locally);
        assert!(!options.verbose);
        assert_eq!(options.tail, vec!["deploy", "--env", "prod"]);
    }

    #[test]
    fn test_flags_after_task_belong_to_task() {
        let options = Options::try_parse_from(["drover", "build", "-l"]).unwrap();
        assert!(!options.run_locally);
        assert_eq!(options.tail, vec!["build", "-l"]);
    }

    #[test]
    fn test_parse_completions() {
        let options = Options::try_parse_from(["drover", "--completions", "bash"]).unwrap();
        assert_eq!(options.completions, Some(CompletionShell::Bash));
        assert!(options.tail.is_empty());
    }

    #[test]
    fn test_run_task_success() {
        let (_dir, path) = write_config("tasks:\n  t: echo hi\n");
        let record = ShellRecord::default();
        let shell = ScriptedShell::new(record.clone()).with_output("echo hi", 0, &["hi"]);

        let (success, entries) = run_app(&path, &["t"], shell);

        assert!(success);
        assert_eq!(record.commands(), vec!["echo hi"]);
        assert_eq!(
            entries,
            vec![
                entry(LogLevel::Command, "echo hi"),
                entry(LogLevel::StdOut, "hi"),
                entry(LogLevel::TaskSuccess, "task completed"),
            ]
        );
    }

    #[test]
    fn test_task_arguments_come_from_tail() {
        let (_dir, path) = write_config(
            "tasks:\n  greet:\n    args: {who: {short: w}}\n    command: \"echo ${args.who}\"\n",
        );
        let record = ShellRecord::default();

        let (success, _) = run_app(&path, &["greet", "-w", "world"], ScriptedShell::new(record.clone()));

        assert!(success);
        assert_eq!(record.commands(), vec!["echo world"]);
    }

    #[test]
    fn test_failure_logs_final_line_once() {
        let (_dir, path) = write_config("tasks:\n  t: \"false\"\n");
        let shell = ScriptedShell::new(ShellRecord::default()).with_status("false", 1);

        let (success, entries) = run_app(&path, &["t"], shell);

        assert!(!success);
        assert_eq!(
            entries.last(),
            Some(&entry(LogLevel::TaskFail, TASK_FAILED))
        );
        let failures = entries
            .iter()
            .filter(|(level, _)| *level == LogLevel::CommandFail)
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn test_missing_tasks_section() {
        let (_dir, path) = write_config("vars: {a: 1}\n");
        let (success, entries) = run_app(&path, &["t"], ScriptedShell::new(ShellRecord::default()));

        assert!(!success);
        assert_eq!(
            entries,
            vec![
                entry(LogLevel::CommandFail, "tasks section must be set in config"),
                entry(LogLevel::TaskFail, TASK_FAILED),
            ]
        );
    }

    #[test]
    fn test_tasks_section_must_be_mapping() {
        let (_dir, path) = write_config("tasks: [a, b]\n");
        let (success, entries) = run_app(&path, &["t"], ScriptedShell::new(ShellRecord::default()));

        assert!(!success);
        assert_eq!(entries[0], entry(LogLevel::CommandFail, "tasks section must be map"));
    }

    #[test]
    fn test_unknown_task() {
        let (_dir, path) = write_config("tasks: {t: echo}\n");
        let (success, entries) = run_app(&path, &["other"], ScriptedShell::new(ShellRecord::default()));

        assert!(!success);
        assert_eq!(entries[0], entry(LogLevel::CommandFail, "task other not found"));
    }

    #[test]
    fn test_no_task_given() {
        let (_dir, path) = write_config("tasks: {t: echo}\n");
        let (success, entries) = run_app(&path, &[], ScriptedShell::new(ShellRecord::default()));

        assert!(!success);
        assert_eq!(entries, vec![entry(LogLevel::TaskFail, TASK_FAILED)]);
    }

    #[test]
    fn test_option_before_task_is_rejected() {
        let (_dir, path) = write_config("tasks: {t: echo}\n");
        let (success, entries) =
            run_app(&path, &["--bogus", "t"], ScriptedShell::new(ShellRecord::default()));

        assert!(!success);
        assert_eq!(entries[0], entry(LogLevel::CommandFail, "unknown option --bogus"));
    }

    #[test]
    fn test_missing_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.yml");
        let (success, entries) = run_app(&path, &["t"], ScriptedShell::new(ShellRecord::default()));

        assert!(!success);
        assert_eq!(entries[0].0, LogLevel::CommandFail);
        assert!(entries[0].1.contains("missing.yml"));
    }
}
