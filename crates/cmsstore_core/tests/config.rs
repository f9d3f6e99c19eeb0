use cmsstore_core::config::{ConfigError, StoreConfig};
use std::io::Write;

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");
    let path = dir.path().join("cmsstore.json");
    let mut file = std::fs::File::create(&path).unwrap();
    let body = serde_json::json!({
        "logging": { "level": "warn", "log_dir": log_dir },
        "cache": { "capacity": 64 },
        "rebuild": { "batch_size": 25 }
    });
    file.write_all(body.to_string().as_bytes()).unwrap();

    let config = StoreConfig::load(&path).unwrap();

    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.log_dir, Some(log_dir));
    assert_eq!(config.cache.capacity, 64);
    assert_eq!(config.cache.permission_ttl_secs, 1200);
    assert_eq!(config.rebuild.batch_size, 25);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();

    let err = StoreConfig::load(dir.path().join("absent.json")).unwrap_err();

    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn relative_log_dir_is_rejected() {
    let err = StoreConfig::from_json_str(r#"{"logging": {"log_dir": "logs"}}"#).unwrap_err();

    assert!(matches!(err, ConfigError::Invalid(_)));
}
