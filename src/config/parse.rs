//! Configuration file discovery and include resolution

use crate::config::types::{Mapping, Value};
use crate::error::{ConfigError, ConfigResult};
use regex::Regex;
use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// Default configuration file name to search for
pub const CONFIG_FILE_NAME: &str = ".drover.yml";

/// Environment variable naming the configuration file explicitly
pub const CONFIG_ENV_VAR: &str = "DROVER_CONFIG";

/// Reads a file's contents
pub type ReadFn<'a> = Box<dyn Fn(&Path) -> io::Result<String> + 'a>;

/// Expands a glob pattern into the matching paths
pub type GlobFn<'a> = Box<dyn Fn(&str) -> Result<Vec<PathBuf>, String> + 'a>;

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\$\{include (.*?)\}$").expect("include pattern is valid"))
}

fn legacy_include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\$include (.*?)$").expect("include pattern is valid"))
}

/// Find the configuration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    let current_dir = env::current_dir().map_err(|e| ConfigError::Read {
        path: PathBuf::from("."),
        error: e.to_string(),
    })?;

    find_config_file_from(current_dir)
}

/// Find the configuration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        let config_path = current_dir.join(CONFIG_FILE_NAME);
        searched_paths.push(config_path.display().to_string());

        if config_path.is_file() {
            return Ok(config_path);
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// The path an include directive refers to, if `value` is one
pub fn include_target(value: &str) -> Option<&str> {
    include_regex()
        .captures(value)
        .or_else(|| legacy_include_regex().captures(value))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Loads a root configuration file and every file it includes into one tree
///
/// Include directives are string values of the form `${include <path>}`
/// (or the older `$include <path>`). Relative paths are resolved against the
/// directory of the file containing the directive. A path with a `*`
/// wildcard merges the top-level mappings of all matching files.
pub struct Loader<'a> {
    read_file: ReadFn<'a>,
    glob: GlobFn<'a>,
    include_stack: Vec<PathBuf>,
}

impl<'a> Loader<'a> {
    /// Create a loader that reads from the file system
    pub fn new() -> Self {
        Loader {
            read_file: Box::new(|path: &Path| fs::read_to_string(path)),
            glob: Box::new(glob_paths),
            include_stack: Vec::new(),
        }
    }

    /// Replace the function used to read files
    pub fn with_read_file(mut self, read_file: impl Fn(&Path) -> io::Result<String> + 'a) -> Self {
        self.read_file = Box::new(read_file);
        self
    }

    /// Replace the function used to expand glob patterns
    pub fn with_glob(
        mut self,
        glob: impl Fn(&str) -> Result<Vec<PathBuf>, String> + 'a,
    ) -> Self {
        self.glob = Box::new(glob);
        self
    }

    /// Load `path` and resolve all of its includes; the result must be a mapping
    pub fn load(&mut self, path: impl AsRef<Path>) -> ConfigResult<Mapping> {
        let path = normalize_path(path.as_ref());
        let path = path.as_path();
        match self.load_value(path)? {
            Value::Mapping(mapping) => Ok(mapping),
            _ => Err(ConfigError::NotMapping(path.to_path_buf())),
        }
    }

    fn load_value(&mut self, path: &Path) -> ConfigResult<Value> {
        if self.include_stack.iter().any(|p| p == path) {
            let chain = self
                .include_stack
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" <- ");
            return Err(ConfigError::RecursiveInclude(chain));
        }

        self.include_stack.push(path.to_path_buf());
        let result = self.read_and_resolve(path);
        self.include_stack.pop();
        result
    }

    fn read_and_resolve(&mut self, path: &Path) -> ConfigResult<Value> {
        log::debug!("loading config file {}", path.display());

        let contents = (self.read_file)(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        // Any document is accepted here, so included files may hold a bare
        // list or scalar; only the root and glob members must be mappings.
        let parsed: Value = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        // An empty document is an empty mapping
        if parsed.is_null() {
            return Ok(Value::Mapping(Mapping::new()));
        }

        self.resolve(parsed)
    }

    fn resolve(&mut self, value: Value) -> ConfigResult<Value> {
        match value {
            Value::String(text) => match include_target(&text) {
                Some(target) => self.include(target),
                None => Ok(Value::String(text)),
            },
            Value::Mapping(mapping) => {
                let mut result = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    result.insert(key, self.resolve(value)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(sequence) => sequence
                .into_iter()
                .map(|value| self.resolve(value))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn include(&mut self, target: &str) -> ConfigResult<Value> {
        let path = self.resolve_path(target);

        let pattern = path.to_string_lossy().into_owned();
        if !pattern.contains('*') {
            return self.load_value(&path);
        }

        let files = (self.glob)(&pattern).map_err(|error| ConfigError::Glob {
            pattern: pattern.clone(),
            error,
        })?;

        log::debug!("merging {} files matching {}", files.len(), pattern);
        self.merge_files(&files)
    }

    fn resolve_path(&self, target: &str) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            return normalize_path(target);
        }

        let current = self
            .include_stack
            .last()
            .and_then(|file| file.parent())
            .unwrap_or_else(|| Path::new(""));

        normalize_path(&current.join(target))
    }

    fn merge_files(&mut self, files: &[PathBuf]) -> ConfigResult<Value> {
        let mut result = Mapping::new();

        for file in files {
            let mapping = match self.load_value(file)? {
                Value::Mapping(mapping) => mapping,
                _ => return Err(ConfigError::MergeNotMapping(file.clone())),
            };

            for (key, value) in mapping {
                if result.contains_key(&key) {
                    return Err(ConfigError::MergeCollision {
                        key: key_to_string(&key),
                        path: file.clone(),
                    });
                }

                result.insert(key, value);
            }
        }

        Ok(Value::Mapping(result))
    }
}

impl Default for Loader<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically remove `.` and `..` components so the same file always has
/// the same path
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other),
        }
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }

    result
}

fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Default glob implementation backed by the file system
pub fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>, String> {
    let paths = glob::glob(pattern).map_err(|e| e.to_string())?;
    paths
        .map(|entry| entry.map_err(|e| e.to_string()))
        .collect()
}

/// Load a configuration file from disk
pub fn load_config_file(path: &Path) -> ConfigResult<Mapping> {
    Loader::new().load(path)
}
