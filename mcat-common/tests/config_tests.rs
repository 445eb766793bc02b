//! Tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing TOML files do not cause failures
//! - Priority order for root folder resolution
//! - Automatic directory creation
//! - Loading a TOML file written from a `TomlConfig`
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate MCAT_* variables are marked with #[serial].

use mcat_common::config::{
    load_toml_config, CompiledDefaults, LoggingConfig, QuotaConfig,
    RootFolderInitializer, RootFolderResolver, TomlConfig, ANALYSIS_ENDPOINT_ENV,
    CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
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

    #[cfg(target_os = "linux")]
    {
        let path_str = defaults.root_folder.to_string_lossy();
        assert!(path_str.ends_with("mcat"), "Linux default should end in mcat");
    }
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root_folder = RootFolderResolver::new().resolve();

    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(root_folder, defaults.root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/mcat-test-env-folder");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/mcat-from-toml")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new().with_toml(&config).resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/mcat-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_cli_beats_env() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/mcat-test-env-folder");

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(Some(PathBuf::from("/tmp/mcat-cli")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/mcat-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_used_without_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/mcat-from-toml")),
        ..Default::default()
    };
    let root_folder = RootFolderResolver::new().with_toml(&config).resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/mcat-from-toml"));
}

#[test]
#[serial]
fn test_missing_config_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    env::set_var(CONFIG_PATH_ENV, temp_dir.path().join("missing.toml"));
    env::remove_var(ANALYSIS_ENDPOINT_ENV);

    let config = TomlConfig::load_or_default();

    assert_eq!(config, TomlConfig::default());

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
#[serial]
fn test_env_overrides_analysis_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [analysis]
        endpoint = "http://toml-host:8000/analyse"
        "#,
    )
    .unwrap();

    env::set_var(CONFIG_PATH_ENV, &path);
    env::set_var(ANALYSIS_ENDPOINT_ENV, "http://env-host:9000/analyse");

    let config = TomlConfig::load_or_default();
    assert_eq!(
        config.analysis.endpoint.as_deref(),
        Some("http://env-host:9000/analyse")
    );

    env::remove_var(CONFIG_PATH_ENV);
    env::remove_var(ANALYSIS_ENDPOINT_ENV);
}

#[test]
fn test_initializer_creates_nested_directory_idempotently() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("level1").join("level2");

    let initializer = RootFolderInitializer::new(root.clone());
    assert!(initializer.ensure_directory_exists().is_ok());
    assert!(initializer.ensure_directory_exists().is_ok());

    assert!(root.is_dir());
    assert!(!initializer.database_path().exists());
    assert_eq!(initializer.database_path(), root.join("mcat.db"));
}

#[test]
fn test_toml_written_by_hand_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/media")),
        quota: QuotaConfig {
            tier: "pro".to_string(),
            monthly_cap: Some(1500),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
        ..Default::default()
    };

    std::fs::write(&target, toml::to_string_pretty(&config).unwrap()).unwrap();

    assert_eq!(load_toml_config(&target).unwrap(), config);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("broken.toml");
    std::fs::write(&target, "root_folder = [not toml").unwrap();

    let err = load_toml_config(&target).unwrap_err();
    assert!(matches!(err, mcat_common::Error::Config(_)));
}
