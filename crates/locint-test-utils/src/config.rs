//! Configuration builders for tests.

use std::path::Path;

use locint_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// Defaults to fast registration retries so retry paths finish quickly.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .max_retries(2)
///     .xtra_test_enabled(true)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.registration.initial_backoff_ms = 10;
        config.registration.max_backoff_ms = 40;
        config.watcher.poll_interval_ms = 10;
        config.watcher.up_delay_ms = 0;
        Self { config }
    }

    pub fn client_name(mut self, name: &str) -> Self {
        self.config.client.name = name.to_string();
        self
    }

    pub fn daemon_identity(mut self, identity: &str) -> Self {
        self.config.client.daemon_identity = identity.to_string();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.registration.max_retries = n;
        self
    }

    pub fn backoff_ms(mut self, initial: u64, max: u64) -> Self {
        self.config.registration.initial_backoff_ms = initial;
        self.config.registration.max_backoff_ms = max;
        self
    }

    pub fn xtra_test_enabled(mut self, enabled: bool) -> Self {
        self.config.xtra.test_enabled = enabled;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Place the client socket directory and the daemon socket under `dir`.
    pub fn sockets_in(mut self, dir: &Path) -> Self {
        self.config.client.socket_dir = dir.join("clients");
        self.config.client.daemon_socket = dir.join("daemon.sock");
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
