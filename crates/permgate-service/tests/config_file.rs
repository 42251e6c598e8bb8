//! Loading configuration files from disk

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use permgate_service::{AuthorizationConfig, Config, ConfigError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_full_file() {
    let file = write(
        r#"
        bind_address = "127.0.0.1:8081"
        log_level = "permgate=debug"

        [log]
        cluster = "kafka-0:9092,kafka-1:9092"
        topic = "rights"
        publish_attempts = 4

        [authorization]
        mode = "remote"
        check_url = "http://permsearch:8080/v3/resources"
        timeout_ms = 1500
        "#,
    );

    let config = Config::load_from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.socket_addr().unwrap().port(), 8081);
    assert_eq!(config.log.cluster, "kafka-0:9092,kafka-1:9092");
    assert_eq!(config.log.topic, "rights");
    assert_eq!(config.log.publish_attempts, 4);
    assert_eq!(
        config.authorization,
        AuthorizationConfig::Remote {
            check_url: "http://permsearch:8080/v3/resources".into(),
            timeout_ms: 1500,
        }
    );
}

#[test]
fn file_without_authorization_mode_fails() {
    let file = write(
        r#"
        [log]
        topic = "permissions"
        "#,
    );

    assert_matches!(
        Config::load_from_file(file.path()),
        Err(ConfigError::Parse(_))
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let file = write(
        r#"
        listen = "0.0.0.0:80"

        [authorization]
        mode = "allow-all"
        "#,
    );

    assert_matches!(
        Config::load_from_file(file.path()),
        Err(ConfigError::Parse(_))
    );
}

#[test]
fn misspelled_remote_setting_is_rejected() {
    let file = write(
        r#"
        [authorization]
        mode = "remote"
        check_url = "http://permsearch:8080/v3/resources"
        timeout = 1
        "#,
    );

    assert_matches!(
        Config::load_from_file(file.path()),
        Err(ConfigError::Parse(_))
    );
}

#[test]
fn allow_all_with_remote_settings_is_rejected() {
    let file = write(
        r#"
        [authorization]
        mode = "allow-all"
        check_url = "http://permsearch:8080/v3/resources"
        "#,
    );

    assert_matches!(
        Config::load_from_file(file.path()),
        Err(ConfigError::Parse(_))
    );
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    assert_matches!(Config::load_from_file(&path), Err(ConfigError::Read { .. }));
}
