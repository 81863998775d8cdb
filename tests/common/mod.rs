//! Common test utilities

#![allow(dead_code)]

use drover::config::Mapping;
use drover::runner::{create_task, jobs::CALL, ExecutionState};
use drover::ui::{LogLevel, RecordingLogger};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Create a temporary directory with a .drover.yml file
pub fn create_test_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join(".drover.yml");
    fs::write(&config_path, content).unwrap();
    (temp_dir, config_path)
}

/// Write `content` to `name` inside `dir`, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Parse a YAML mapping
pub fn yaml(text: &str) -> Mapping {
    serde_yaml::from_str(text).unwrap()
}

/// Run the top-level task `name` from `config` on the local shell
pub fn run_task(
    config: &str,
    name: &str,
    argv: &[&str],
) -> (drover::Result<()>, Vec<(LogLevel, String)>) {
    let logger = Rc::new(RecordingLogger::new());
    let config = yaml(config);
    let task = config
        .get("tasks")
        .and_then(|tasks| tasks.get(name))
        .cloned()
        .unwrap();

    let state = ExecutionState::new(config, logger.clone())
        .with_argv(argv.iter().map(|s| s.to_string()).collect())
        .with_run_locally(true);
    let result = state.call(CALL, &create_task(task));

    (result, logger.entries())
}

pub fn entry(level: LogLevel, message: &str) -> (LogLevel, String) {
    (level, message.to_string())
}
