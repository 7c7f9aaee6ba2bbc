use std::path::Path;

use lambdabox::config::Config;

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.default_timeout, 2.5);
    assert_eq!(config.max_timeout, 60.0);
    assert_eq!(config.max_concurrency, 4);
    assert_eq!(config.server.port, 9000);
    assert_eq!(
        config.interpreter.env.get("PYTHONHASHSEED").map(String::as_str),
        Some("0")
    );
}

#[test]
fn test_load_minimal_config_layers_over_defaults() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::load_with_env(Some(Path::new(&path)), Some(Default::default()))
        .expect("Failed to load config");

    assert_eq!(config.default_timeout, 1.0);
    assert_eq!(config.max_timeout, 900.0);
    assert_eq!(config.server.port, 8080);
}

#[test]
fn test_load_invalid_timeouts() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_timeouts.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_command() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_no_result_placeholder.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_concurrency() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_zero_concurrency.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_nonexistent_file() {
    assert!(Config::from_file("/nonexistent/path/config.toml").is_err());
}
