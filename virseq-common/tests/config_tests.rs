//! Integration tests for config file resolution and round-tripping

use serial_test::serial;
use std::path::Path;
use tempfile::TempDir;
use virseq_common::config::{
    load_config, load_toml_config, resolve_config_path, write_toml_config, PatternStyle,
    SearchMode, TomlConfig, CONFIG_ENV_VAR,
};

#[test]
fn test_write_then_load_preserves_settings() {
    let temp_dir = TempDir::new().unwrap();
    let toml_path = temp_dir.path().join("nested").join("virseq.toml");

    let mut config = TomlConfig::default();
    config.assembly.virus_type = "Hanta".to_string();
    config.assembly.trimming.custom_start = Some("TGGTCACC".to_string());
    config.naming.style = PatternStyle::VirusEmbedded;
    config.search.mode = SearchMode::All;
    config.search.max_concurrent = 1;

    write_toml_config(&config, &toml_path).unwrap();
    let loaded = load_toml_config(&toml_path).unwrap();

    assert_eq!(loaded, config);
    // No temp file left behind
    assert!(!toml_path.with_extension("toml.tmp").exists());
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    let temp_dir = TempDir::new().unwrap();
    let toml_path = temp_dir.path().join("env.toml");
    std::fs::write(&toml_path, "[assembly]\nquality_threshold = 30\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &toml_path);
    let resolved = resolve_config_path(None);
    let loaded = load_config(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some((toml_path.clone(), true)));
    assert_eq!(loaded.unwrap().assembly.quality_threshold, 30);
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let cli_path = temp_dir.path().join("cli.toml");
    let env_path = temp_dir.path().join("env.toml");
    std::fs::write(&cli_path, "[search]\nbatch_size = 3\n").unwrap();
    std::fs::write(&env_path, "[search]\nbatch_size = 9\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &env_path);
    let loaded = load_config(Some(cli_path.as_path()));
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(loaded.unwrap().search.batch_size, 3);
}

#[test]
fn test_malformed_toml_reports_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let toml_path = temp_dir.path().join("bad.toml");
    std::fs::write(&toml_path, "[search\nbatch_size = ").unwrap();

    let err = load_toml_config(Path::new(&toml_path)).unwrap_err();
    assert!(err.to_string().contains("Parse TOML failed"));
}
