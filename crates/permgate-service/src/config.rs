//! Service configuration
//!
//! Loaded from TOML, then overridden from `PERMGATE_*` environment
//! variables, then validated. The authorization mode has no default: a
//! deployment that wants to skip the remote check must say
//! `mode = "allow-all"`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "PERMGATE_";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// File is not valid configuration
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An override variable held an unusable value
    #[error("invalid value for {variable}: {message}")]
    Environment {
        /// Variable name
        variable: String,
        /// What was wrong
        message: String,
    },

    /// Values parse but cannot work together
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listen address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Broker and topic settings
    #[serde(default)]
    pub log: LogConfig,

    /// How admin rights are checked
    pub authorization: AuthorizationConfig,
}

/// Broker and topic settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Bootstrap address of the cluster
    #[serde(default = "default_cluster")]
    pub cluster: String,

    /// Rights topic name
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Total attempts per published event
    #[serde(default = "default_publish_attempts")]
    pub publish_attempts: u32,

    /// Bound on one broker request or delivery, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            cluster: default_cluster(),
            topic: default_topic(),
            publish_attempts: default_publish_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl LogConfig {
    /// Broker request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Admin-right check mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "mode",
    rename_all = "kebab-case",
    try_from = "AuthorizationSection"
)]
pub enum AuthorizationConfig {
    /// Ask the permission-search service
    Remote {
        /// Base URL; `/{kind}/{id}?rights=a` is appended
        check_url: String,
        /// Per-request timeout in milliseconds
        timeout_ms: u64,
    },
    /// Grant every admin check. Self-protection rules still apply.
    AllowAll,
}

/// `[authorization]` as written. Keys that do not belong to the selected
/// mode are errors rather than ignored.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthorizationSection {
    mode: AuthorizationMode,
    check_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
enum AuthorizationMode {
    Remote,
    AllowAll,
}

impl TryFrom<AuthorizationSection> for AuthorizationConfig {
    type Error = String;

    fn try_from(section: AuthorizationSection) -> Result<Self, Self::Error> {
        match section.mode {
            AuthorizationMode::Remote => Ok(Self::Remote {
                check_url: section
                    .check_url
                    .ok_or("mode \"remote\" requires check_url")?,
                timeout_ms: section.timeout_ms.unwrap_or_else(default_check_timeout_ms),
            }),
            AuthorizationMode::AllowAll => {
                if section.check_url.is_some() || section.timeout_ms.is_some() {
                    return Err(
                        "mode \"allow-all\" takes no check_url or timeout_ms".to_string(),
                    );
                }
                Ok(Self::AllowAll)
            }
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cluster() -> String {
    "kafka:9092".to_string()
}

fn default_topic() -> String {
    "permissions".to_string()
}

fn default_publish_attempts() -> u32 {
    permgate_log::DEFAULT_PUBLISH_ATTEMPTS
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_check_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load `path`, apply the process environment, and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PERMGATE_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `PERMGATE_*` overrides from `vars`. Unknown names are ignored.
    ///
    /// `PERMGATE_CHECK_URL` selects remote mode even when the file says
    /// `allow-all`.
    pub fn merge_with_vars(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (variable, value) in vars {
            let Some(key) = variable.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "BIND_ADDRESS" => self.bind_address = value,
                "LOG_LEVEL" => self.log_level = value,
                "CLUSTER" => self.log.cluster = value,
                "TOPIC" => self.log.topic = value,
                "PUBLISH_ATTEMPTS" => {
                    self.log.publish_attempts =
                        value.parse().map_err(|e| ConfigError::Environment {
                            variable: variable.clone(),
                            message: format!("{e}"),
                        })?;
                }
                "CHECK_URL" => {
                    let timeout_ms = match &self.authorization {
                        AuthorizationConfig::Remote { timeout_ms, .. } => *timeout_ms,
                        AuthorizationConfig::AllowAll => default_check_timeout_ms(),
                    };
                    self.authorization = AuthorizationConfig::Remote {
                        check_url: value,
                        timeout_ms,
                    };
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check that values are usable together
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.log.cluster.trim().is_empty() {
            return Err(ConfigError::invalid("log.cluster must not be empty"));
        }
        if self.log.topic.trim().is_empty() {
            return Err(ConfigError::invalid("log.topic must not be empty"));
        }
        if self.log.publish_attempts == 0 {
            return Err(ConfigError::invalid("log.publish_attempts must be at least 1"));
        }
        if let AuthorizationConfig::Remote { check_url, .. } = &self.authorization {
            if !(check_url.starts_with("http://") || check_url.starts_with("https://")) {
                return Err(ConfigError::invalid(format!(
                    "authorization.check_url must be an http(s) URL, got {check_url:?}"
                )));
            }
        }
        Ok(())
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address.parse().map_err(|e| {
            ConfigError::invalid(format!("bind_address {:?}: {e}", self.bind_address))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const REMOTE: &str = r#"
        [authorization]
        mode = "remote"
        check_url = "http://permsearch:8080/v3/resources"
    "#;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_fill_in() {
        let config = Config::from_toml(REMOTE).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.log, LogConfig::default());
        assert_eq!(config.log.publish_attempts, 10);
        assert_eq!(
            config.authorization,
            AuthorizationConfig::Remote {
                check_url: "http://permsearch:8080/v3/resources".into(),
                timeout_ms: 5000,
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_allow_all_is_explicit() {
        let config = Config::from_toml("[authorization]\nmode = \"allow-all\"\n").unwrap();
        assert_eq!(config.authorization, AuthorizationConfig::AllowAll);

        assert_matches!(Config::from_toml(""), Err(ConfigError::Parse(_)));
        assert_matches!(
            Config::from_toml("[authorization]\ncheck_url = \"http://x\"\n"),
            Err(ConfigError::Parse(_))
        );
        assert_matches!(
            Config::from_toml("[authorization]\nmode = \"open\"\n"),
            Err(ConfigError::Parse(_))
        );
    }

    #[test]
    fn test_authorization_keys_are_checked_per_mode() {
        let misspelled = r#"
            [authorization]
            mode = "remote"
            check_url = "http://x/v3"
            timeout = 1
        "#;
        assert_matches!(Config::from_toml(misspelled), Err(ConfigError::Parse(_)));

        let allow_all_with_url = r#"
            [authorization]
            mode = "allow-all"
            check_url = "http://x/v3"
        "#;
        assert_matches!(
            Config::from_toml(allow_all_with_url),
            Err(ConfigError::Parse(_))
        );

        assert_matches!(
            Config::from_toml("[authorization]\nmode = \"remote\"\n"),
            Err(ConfigError::Parse(_))
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_toml(REMOTE).unwrap();
        config
            .merge_with_vars(vars(&[
                ("PERMGATE_BIND_ADDRESS", "127.0.0.1:9000"),
                ("PERMGATE_CLUSTER", "broker-0:9092"),
                ("PERMGATE_TOPIC", "rights"),
                ("PERMGATE_LOG_LEVEL", "debug"),
                ("PERMGATE_PUBLISH_ATTEMPTS", "3"),
                ("PERMGATE_UNKNOWN", "ignored"),
                ("HOME", "/root"),
            ]))
            .unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.log.cluster, "broker-0:9092");
        assert_eq!(config.log.topic, "rights");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log.publish_attempts, 3);
    }

    #[test]
    fn test_check_url_override_selects_remote() {
        let mut config = Config::from_toml("[authorization]\nmode = \"allow-all\"\n").unwrap();
        config
            .merge_with_vars(vars(&[("PERMGATE_CHECK_URL", "https://search/v3/resources")]))
            .unwrap();
        assert_eq!(
            config.authorization,
            AuthorizationConfig::Remote {
                check_url: "https://search/v3/resources".into(),
                timeout_ms: 5000,
            }
        );
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = Config::from_toml(REMOTE).unwrap();
        assert_matches!(
            config.merge_with_vars(vars(&[("PERMGATE_PUBLISH_ATTEMPTS", "many")])),
            Err(ConfigError::Environment { .. })
        );
    }

    #[test]
    fn test_validation() {
        let base = Config::from_toml(REMOTE).unwrap();

        let mut bad = base.clone();
        bad.bind_address = "nowhere".into();
        assert_matches!(bad.validate(), Err(ConfigError::Invalid(_)));

        let mut bad = base.clone();
        bad.log.topic = " ".into();
        assert_matches!(bad.validate(), Err(ConfigError::Invalid(_)));

        let mut bad = base.clone();
        bad.log.cluster = String::new();
        assert_matches!(bad.validate(), Err(ConfigError::Invalid(_)));

        let mut bad = base.clone();
        bad.log.publish_attempts = 0;
        assert_matches!(bad.validate(), Err(ConfigError::Invalid(_)));

        let mut bad = base;
        bad.authorization = AuthorizationConfig::Remote {
            check_url: "permsearch:8080".into(),
            timeout_ms: 5000,
        };
        assert_matches!(bad.validate(), Err(ConfigError::Invalid(_)));
    }
}
