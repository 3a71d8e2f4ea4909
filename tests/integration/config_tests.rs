use crate::{clear_env, ENV_MUTEX};
use chunkdupe::cli::{Cli, Commands};
use chunkdupe::config::{Config, ConfigError};
use chunkdupe::scanner::MediaType;
use clap::Parser;
use figment::providers::Serialized;
use std::fs;
use tempfile::tempdir;

const GIB: u64 = 1024 * 1024 * 1024;

#[test]
fn test_config_load_defaults() {
    // Figment without Env, so other tests' variables cannot interfere
    let figment = figment::Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.memory_budget, 32 * GIB);
    assert_eq!(config.parallelism_ceiling, 16);
}

#[test]
fn test_config_load_from_toml() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
memory_budget = "8GiB"
parallelism_ceiling = 4
min_chunk_floor = 67108864
skip_hidden = true
media_types = ["video", "photo"]
size_limited_merge = false
"#;
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.memory_budget, 8 * GIB);
    assert_eq!(config.parallelism_ceiling, 4);
    assert_eq!(config.min_chunk_floor, 64 * 1024 * 1024);
    assert!(config.skip_hidden);
    assert!(!config.strict);
    assert_eq!(config.media_types, vec![MediaType::Video, MediaType::Photo]);
    assert!(!config.size_limited_merge);
}

#[test]
fn test_config_load_from_env() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("CHUNKDUPE_MEMORY_BUDGET", "2GiB");
    std::env::set_var("CHUNKDUPE_PARALLELISM_CEILING", "6");
    std::env::set_var("CHUNKDUPE_STRICT", "true");

    let config = Config::from_env();
    assert_eq!(config.memory_budget, 2 * GIB);
    assert_eq!(config.parallelism_ceiling, 6);
    assert!(config.strict);

    clear_env();
}

#[test]
fn test_config_hierarchy_defaults_file_env_cli() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    // 1. Config file overrides defaults
    fs::write(
        &config_path,
        "memory_budget = \"8GiB\"\nparallelism_ceiling = 8\nmin_chunk_floor = \"1MiB\"\n",
    )
    .unwrap();

    // 2. Environment overrides the config file
    std::env::set_var("CHUNKDUPE_PARALLELISM_CEILING", "12");

    let mut config = Config::load_from_path(&config_path);
    assert_eq!(config.memory_budget, 8 * GIB);
    assert_eq!(config.parallelism_ceiling, 12);
    assert_eq!(config.min_chunk_floor, 1024 * 1024);

    // 3. CLI flags override the environment
    let cli = Cli::try_parse_from([
        "chunkdupe",
        "scan",
        ".",
        "--parallelism",
        "2",
        "--memory-budget",
        "1GiB",
    ])
    .unwrap();
    let Commands::Scan(args) = &cli.command;
    config.merge_scan_args(args);
    assert_eq!(config.parallelism_ceiling, 2);
    assert_eq!(config.memory_budget, GIB);
    // Untouched by the CLI
    assert_eq!(config.min_chunk_floor, 1024 * 1024);

    clear_env();
}

#[test]
fn test_cli_flags_only_override_when_given() {
    let mut config = Config {
        strict: true,
        media_types: vec![MediaType::Audio],
        ..Config::default()
    };
    let cli = Cli::try_parse_from(["chunkdupe", "scan", "."]).unwrap();
    let Commands::Scan(args) = &cli.command;
    config.merge_scan_args(args);

    assert!(config.strict);
    assert_eq!(config.media_types, vec![MediaType::Audio]);
    assert!(config.size_limited_merge);

    let cli = Cli::try_parse_from([
        "chunkdupe",
        "scan",
        ".",
        "--target",
        "/archive",
        "--no-size-limit",
        "--media",
        "photo",
    ])
    .unwrap();
    let Commands::Scan(args) = &cli.command;
    config.merge_scan_args(args);
    assert!(!config.size_limited_merge);
    assert_eq!(config.media_types, vec![MediaType::Photo]);
}

#[test]
fn test_config_unknown_field_is_ignored() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    // 'paralelism_ceiling' is a typo for 'parallelism_ceiling'
    fs::write(&config_path, "paralelism_ceiling = 2\nstrict = true\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.parallelism_ceiling, 16);
    assert!(config.strict);
}

#[test]
fn test_config_invalid_type_falls_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "parallelism_ceiling = \"eight\"\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_invalid_size_falls_back_to_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "memory_budget = \"lots\"\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.memory_budget, Config::default().memory_budget);
}

#[test]
fn test_explicit_missing_config_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let result = Config::load(Some(missing.as_path()));
    assert!(matches!(result, Err(ConfigError::NotFound(path)) if path == missing));
}

#[test]
fn test_zero_values_fail_validation() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "memory_budget = 0\n").unwrap();

    let config = Config::load_from_path(&config_path);
    assert_eq!(config.memory_budget, 0);
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}
