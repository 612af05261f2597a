//! Tests for configuration and graceful degradation
//!
//! - Missing TOML files never cause errors
//! - Priority order for root folder resolution
//! - Automatic directory creation
//!
//! Tests that manipulate ROWKEEP_ROOT_FOLDER or ROWKEEP_ROOT are marked with
//! #[serial] so they run sequentially.

use rowkeep_common::config::{
    load_toml_config, CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());
    assert!(defaults.root_folder.to_string_lossy().contains("rowkeep"));
}

#[test]
#[serial]
fn test_cli_override_beats_environment() {
    env::set_var("ROWKEEP_ROOT_FOLDER", "/tmp/rowkeep-env");

    let resolver = RootFolderResolver::new("test-module")
        .with_cli_override(Some(PathBuf::from("/tmp/rowkeep-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/rowkeep-cli"));

    env::remove_var("ROWKEEP_ROOT_FOLDER");
}

#[test]
#[serial]
fn test_resolver_env_var_root_folder() {
    env::remove_var("ROWKEEP_ROOT");
    env::set_var("ROWKEEP_ROOT_FOLDER", "/tmp/rowkeep-test-env-folder");

    let resolver = RootFolderResolver::new("test-module");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/rowkeep-test-env-folder"));

    env::remove_var("ROWKEEP_ROOT_FOLDER");
}

#[test]
#[serial]
fn test_root_folder_takes_precedence_over_root() {
    env::set_var("ROWKEEP_ROOT_FOLDER", "/tmp/rowkeep-priority-1");
    env::set_var("ROWKEEP_ROOT", "/tmp/rowkeep-priority-2");

    let resolver = RootFolderResolver::new("test-module");
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/rowkeep-priority-1"));

    env::remove_var("ROWKEEP_ROOT_FOLDER");
    env::remove_var("ROWKEEP_ROOT");
}

#[test]
#[serial]
fn test_resolver_missing_config_file_does_not_error() {
    env::remove_var("ROWKEEP_ROOT_FOLDER");
    env::remove_var("ROWKEEP_ROOT");

    let resolver = RootFolderResolver::new("nonexistent-module-xyz-987");
    let root_folder = resolver.resolve();

    assert!(!root_folder.as_os_str().is_empty());
    let config = resolver.load_toml();
    assert!(config.root_folder.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_initializer_paths() {
    let root = PathBuf::from("/tmp/rowkeep-test-root");
    let initializer = RootFolderInitializer::new(root.clone());

    assert_eq!(initializer.database_path(), root.join("rowkeep.db"));
    assert_eq!(initializer.media_path(), root.join("media"));
    assert!(!initializer.database_exists());
}

#[test]
fn test_initializer_creates_directories_idempotently() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    let initializer = RootFolderInitializer::new(root.clone());

    initializer.ensure_directory_exists().unwrap();
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(root.join("media").is_dir());
}

#[test]
fn test_toml_config_parses_partial_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rowkeep.toml");
    std::fs::write(
        &path,
        r#"
        media_bucket = "field-photos"

        [logging]
        level = "debug"
        "#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.media_bucket.as_deref(), Some("field-photos"));
    assert_eq!(config.logging.level, "debug");
    assert!(config.root_folder.is_none());
}

#[test]
fn test_toml_config_invalid_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "media_bucket = [unterminated").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, rowkeep_common::Error::Config(_)));
}

#[test]
fn test_toml_config_default_is_empty() {
    let config = TomlConfig::default();
    assert!(config.media_root.is_none());
    assert_eq!(config.logging.level, "info");
}
