#![deny(unsafe_code)]

//! Configuration loading and validation for the locint integration client.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure shared by the client core and the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Client identity and socket locations.
    #[serde(default)]
    pub client: ClientConfig,

    /// Registration retry policy.
    #[serde(default)]
    pub registration: RegistrationConfig,

    /// Daemon service watcher.
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Data-source (XTRA) parameter handling.
    #[serde(default)]
    pub xtra: XtraConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client identity and socket locations.
///
/// ## TOML Example
///
/// ```toml
/// [client]
/// name = "locint"
/// socket_dir = "/dev/socket/location/clients"
/// daemon_socket = "/dev/socket/location/hal_daemon"
/// daemon_identity = "location-hal-daemon"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identity stamped on every outbound message. The receive socket is
    /// named `<name>.<pid>` inside `socket_dir`.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Directory that holds the client's receive socket.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,

    /// Socket the daemon listens on.
    #[serde(default = "default_daemon_socket")]
    pub daemon_socket: PathBuf,

    /// Sender identity every inbound message must carry.
    #[serde(default = "default_daemon_identity")]
    pub daemon_identity: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            socket_dir: default_socket_dir(),
            daemon_socket: default_daemon_socket(),
            daemon_identity: default_daemon_identity(),
        }
    }
}

impl ClientConfig {
    /// Path of the receive socket for the process with the given pid.
    pub fn socket_path(&self, pid: u32) -> PathBuf {
        self.socket_dir.join(format!("{}.{pid}", self.name))
    }
}

fn default_client_name() -> String {
    "locint".to_string()
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/dev/socket/location/clients")
}

fn default_daemon_socket() -> PathBuf {
    PathBuf::from("/dev/socket/location/hal_daemon")
}

fn default_daemon_identity() -> String {
    "location-hal-daemon".to_string()
}

/// Retry policy for the registration (hello) message.
///
/// Attempt `n` (starting at 0) waits `initial_backoff_ms * 2^n`, capped at
/// `max_backoff_ms`. After `max_retries` failed retries the client waits for
/// the next daemon-up notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RegistrationConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

/// Daemon service watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// How often the daemon socket path is checked.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Settle time between seeing the daemon appear and reporting it up.
    #[serde(default = "default_up_delay_ms")]
    pub up_delay_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            up_delay_ms: default_up_delay_ms(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn up_delay(&self) -> Duration {
        Duration::from_millis(self.up_delay_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_up_delay_ms() -> u64 {
    800
}

/// Data-source (XTRA) parameter handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XtraConfig {
    /// Pass data-source parameters through unclamped. Test setups only.
    #[serde(default)]
    pub test_enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.name.is_empty() {
            return Err(ConfigError::Validation(
                "client.name must not be empty".to_string(),
            ));
        }
        if self.client.name.contains('/') {
            return Err(ConfigError::Validation(format!(
                "client.name must not contain '/', got {:?}",
                self.client.name
            )));
        }
        if self.client.daemon_identity.is_empty() {
            return Err(ConfigError::Validation(
                "client.daemon_identity must not be empty".to_string(),
            ));
        }
        if self.client.daemon_socket.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "client.daemon_socket must not be empty".to_string(),
            ));
        }
        if self.client.socket_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "client.socket_dir must not be empty".to_string(),
            ));
        }

        if self.registration.initial_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "registration.initial_backoff_ms must be non-zero".to_string(),
            ));
        }
        if self.registration.initial_backoff_ms > self.registration.max_backoff_ms {
            return Err(ConfigError::Validation(format!(
                "registration.initial_backoff_ms ({}) exceeds registration.max_backoff_ms ({})",
                self.registration.initial_backoff_ms, self.registration.max_backoff_ms
            )));
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "watcher.poll_interval_ms must be non-zero".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.client.name, "locint");
        assert_eq!(config.client.daemon_identity, "location-hal-daemon");
        assert_eq!(config.registration.max_retries, 5);
        assert_eq!(config.watcher.up_delay_ms, 800);
        assert!(!config.xtra.test_enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.watcher.poll_interval_ms, 1_000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [client]
            name = "nav-app"
            socket_dir = "/tmp/locint"
            daemon_socket = "/tmp/locint/daemon"
            daemon_identity = "test-daemon"

            [registration]
            max_retries = 2
            initial_backoff_ms = 10
            max_backoff_ms = 40

            [watcher]
            poll_interval_ms = 50
            up_delay_ms = 0

            [xtra]
            test_enabled = true

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.client.name, "nav-app");
        assert_eq!(config.client.socket_dir, PathBuf::from("/tmp/locint"));
        assert_eq!(config.client.daemon_identity, "test-daemon");
        assert_eq!(config.registration.max_retries, 2);
        assert_eq!(config.watcher.poll_interval(), Duration::from_millis(50));
        assert!(config.xtra.test_enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_socket_path_includes_pid() {
        let config = ClientConfig {
            name: "nav".to_string(),
            socket_dir: PathBuf::from("/tmp/sockets"),
            ..ClientConfig::default()
        };
        assert_eq!(config.socket_path(42), PathBuf::from("/tmp/sockets/nav.42"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let reg = RegistrationConfig {
            max_retries: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(reg.backoff(0), Duration::from_millis(100));
        assert_eq!(reg.backoff(1), Duration::from_millis(200));
        assert_eq!(reg.backoff(3), Duration::from_millis(800));
        assert_eq!(reg.backoff(4), Duration::from_millis(1_000));
        assert_eq!(reg.backoff(63), Duration::from_millis(1_000));
    }

    #[test]
    fn test_validation_rejects_empty_name() {
        let toml = r#"
            [client]
            name = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_slash_in_name() {
        let toml = r#"
            [client]
            name = "../escape"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_daemon_identity() {
        let toml = r#"
            [client]
            daemon_identity = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let toml = r#"
            [registration]
            initial_backoff_ms = 500
            max_backoff_ms = 100
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_poll_interval() {
        let toml = r#"
            [watcher]
            poll_interval_ms = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("locint.toml");
        tokio::fs::write(&path, b"[client]\nname = \"fleet\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.client.name, "fleet");
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = AppConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&rendered).unwrap();
        assert_eq!(parsed.client.daemon_socket, config.client.daemon_socket);
    }
}
