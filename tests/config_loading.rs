//! Integration tests for configuration loading with includes on disk

mod common;

use common::{create_test_config, write_file, yaml};
use drover::config::{find_config_file_from, load_config_file, Value};
use drover::error::ConfigError;
use tempfile::TempDir;

#[test]
fn test_load_plain_config() {
    let (_dir, path) = create_test_config(
        r#"
vars:
  user: deploy
tasks:
  build: make
  test:
    command: [make check, make lint]
"#,
    );

    let config = load_config_file(&path).unwrap();
    assert_eq!(
        config,
        yaml("{vars: {user: deploy}, tasks: {build: make, test: {command: [make check, make lint]}}}")
    );
}

#[test]
fn test_include_relative_to_including_file() {
    let (dir, path) = create_test_config("tasks: ${include tasks/main.yml}\n");
    write_file(dir.path(), "tasks/main.yml", "build: ${include build.yml}\n");
    write_file(dir.path(), "tasks/build.yml", "command: make\n");

    let config = load_config_file(&path).unwrap();
    assert_eq!(config, yaml("tasks: {build: {command: make}}"));
}

#[test]
fn test_legacy_include() {
    let (dir, path) = create_test_config("vars: $include vars.yml\n");
    write_file(dir.path(), "vars.yml", "a: 1\n");

    let config = load_config_file(&path).unwrap();
    assert_eq!(config, yaml("vars: {a: 1}"));
}

#[test]
fn test_include_bare_list_inside_sequence() {
    let (dir, path) = create_test_config("tasks:\n  all:\n    - ${include steps.yml}\n    - echo done\n");
    write_file(dir.path(), "steps.yml", "- echo one\n- echo two\n");

    let config = load_config_file(&path).unwrap();
    assert_eq!(
        config,
        yaml("tasks: {all: [[echo one, echo two], echo done]}")
    );
}

#[test]
fn test_absolute_include() {
    let other = TempDir::new().unwrap();
    let vars = write_file(other.path(), "shared.yml", "region: eu\n");
    let (_dir, path) = create_test_config(&format!("vars: ${{include {}}}\n", vars.display()));

    let config = load_config_file(&path).unwrap();
    assert_eq!(config, yaml("vars: {region: eu}"));
}

#[test]
fn test_glob_merge() {
    let (dir, path) = create_test_config("tasks: ${include tasks/*.yml}\n");
    write_file(dir.path(), "tasks/build.yml", "build: make\n");
    write_file(dir.path(), "tasks/deploy.yml", "deploy: {command: ./deploy.sh}\n");

    let config = load_config_file(&path).unwrap();
    let tasks = config.get("tasks").and_then(Value::as_mapping).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks.get("build"), Some(&Value::from("make")));
    assert!(tasks.contains_key("deploy"));
}

#[test]
fn test_glob_merge_collision() {
    let (dir, path) = create_test_config("tasks: ${include tasks/*.yml}\n");
    write_file(dir.path(), "tasks/a.yml", "build: make\n");
    write_file(dir.path(), "tasks/b.yml", "build: cargo build\n");

    let err = load_config_file(&path).unwrap_err();
    match err {
        ConfigError::MergeCollision { key, path } => {
            assert_eq!(key, "build");
            assert!(path.ends_with("tasks/b.yml"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_glob_member_must_be_mapping() {
    let (dir, path) = create_test_config("tasks: ${include tasks/*.yml}\n");
    write_file(dir.path(), "tasks/a.yml", "- not a map\n");

    let err = load_config_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::MergeNotMapping(_)));
}

#[test]
fn test_recursive_include() {
    let (dir, path) = create_test_config("tasks: ${include b.yml}\n");
    write_file(dir.path(), "b.yml", "x: ${include c.yml}\n");
    write_file(dir.path(), "c.yml", "y: ${include .drover.yml}\n");

    let err = load_config_file(&path).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("recursive include detected: "));
    assert_eq!(message.matches(" <- ").count(), 2);
    assert!(message.contains("b.yml <- "));
}

#[test]
fn test_recursive_include_through_parent_directory() {
    let (dir, path) = create_test_config("tasks: ${include sub/b.yml}\n");
    write_file(dir.path(), "sub/b.yml", "x: ${include ../.drover.yml}\n");

    let err = load_config_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::RecursiveInclude(_)));
    assert!(err.to_string().ends_with("sub/b.yml"));
}

#[test]
fn test_include_sibling_directory() {
    let (dir, path) = create_test_config("tasks: ${include sub/main.yml}\n");
    write_file(dir.path(), "sub/main.yml", "build: ${include ../shared/build.yml}\n");
    write_file(dir.path(), "shared/build.yml", "command: make\n");

    let config = load_config_file(&path).unwrap();
    assert_eq!(config, yaml("tasks: {build: {command: make}}"));
}

#[test]
fn test_empty_files_are_empty_mappings() {
    let (dir, path) = create_test_config("tasks: ${include conf.d/*.yml}\n");
    write_file(dir.path(), "conf.d/a.yml", "build: make\n");
    write_file(dir.path(), "conf.d/b.yml", "");

    let config = load_config_file(&path).unwrap();
    assert_eq!(config, yaml("tasks: {build: make}"));

    let (_dir, empty) = create_test_config("");
    assert!(load_config_file(&empty).unwrap().is_empty());
}

#[test]
fn test_missing_include() {
    let (_dir, path) = create_test_config("tasks: ${include nowhere.yml}\n");
    let err = load_config_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_root_must_be_mapping() {
    let (_dir, path) = create_test_config("- a\n- b\n");
    let err = load_config_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::NotMapping(_)));
}

#[test]
fn test_invalid_yaml() {
    let (_dir, path) = create_test_config("tasks: [unclosed\n");
    let err = load_config_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_discover_config_from_subdirectory() {
    let (dir, path) = create_test_config("tasks: {}\n");
    let nested = dir.path().join("a/b");
    std::fs::create_dir_all(&nested).unwrap();

    let found = find_config_file_from(nested).unwrap();
    assert_eq!(found, path);
}

#[test]
fn test_placeholders_survive_loading() {
    let (_dir, path) = create_test_config("tasks: {t: \"echo ${vars.a} $${literal}\"}\n");
    let config = load_config_file(&path).unwrap();
    assert_eq!(config, yaml("tasks: {t: \"echo ${vars.a} $${literal}\"}"));
}
