//! Configuration loading and vardata resolution tests
//!
//! Uses serial_test: tests that set ICS_CONFIG or ICS_VARDATA are marked
//! #[serial] so they never race on the process environment.

use ics_common::config::{
    resolve_config_path, resolve_vardata_directory, TomlConfig, CONFIG_ENV_VAR, VARDATA_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TomlConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.port, 8083);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        vardata_directory = "/srv/ics"

        [supervision]
        interval_secs = 10

        [callbacks]
        retry_base_delay_ms = 5
        "#,
    )
    .unwrap();

    let config = TomlConfig::load(Some(&path)).unwrap();
    assert_eq!(config.vardata_directory, Some(PathBuf::from("/srv/ics")));
    assert_eq!(config.supervision.interval_secs, 10);
    assert_eq!(config.supervision.dead_threshold, 3);
    assert_eq!(config.callbacks.retry_base_delay_ms, 5);
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(VARDATA_ENV_VAR, "/from/env");
    let config = TomlConfig {
        vardata_directory: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_vardata_directory(Some(Path::new("/from/cli")), &config);
    env::remove_var(VARDATA_ENV_VAR);

    assert_eq!(resolved, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(VARDATA_ENV_VAR, "/from/env");
    let config = TomlConfig {
        vardata_directory: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_vardata_directory(None, &config);
    env::remove_var(VARDATA_ENV_VAR);

    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_toml_beats_default() {
    env::remove_var(VARDATA_ENV_VAR);
    let config = TomlConfig {
        vardata_directory: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    assert_eq!(resolve_vardata_directory(None, &config), PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_config_path_from_env() {
    env::set_var(CONFIG_ENV_VAR, "/etc/custom/ics.toml");
    let resolved = resolve_config_path(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(PathBuf::from("/etc/custom/ics.toml")));
}
