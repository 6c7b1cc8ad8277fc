//! Daemon liveness watcher.
//!
//! Polls for the daemon's socket path and reports each up/down transition
//! once. The state seen on the first poll is taken as the baseline and not
//! reported; registration at startup is driven by the receive channel.

use std::path::PathBuf;
use std::time::Duration;

use locint_config::WatcherConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::ServiceStatus;
use crate::client::IntegrationClient;

/// Shortest poll period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Turns presence samples into transitions.
#[derive(Debug, Default)]
struct Transitions {
    known: Option<ServiceStatus>,
}

impl Transitions {
    fn observe(&mut self, present: bool) -> Option<ServiceStatus> {
        let status = if present {
            ServiceStatus::Up
        } else {
            ServiceStatus::Down
        };
        match self.known.replace(status) {
            Some(previous) if previous != status => Some(status),
            _ => None,
        }
    }
}

/// Watches the daemon socket path.
#[derive(Debug, Clone)]
pub struct SocketPathWatcher {
    path: PathBuf,
    poll_interval: Duration,
    up_delay: Duration,
}

impl SocketPathWatcher {
    /// A poll interval below one millisecond is raised to one millisecond.
    pub fn new(path: impl Into<PathBuf>, config: &WatcherConfig) -> Self {
        Self {
            path: path.into(),
            poll_interval: config.poll_interval().max(MIN_POLL_INTERVAL),
            up_delay: config.up_delay(),
        }
    }

    /// Report transitions to `client` until it shuts down.
    pub fn spawn(self, client: IntegrationClient) -> JoinHandle<()> {
        tokio::spawn(self.run(move |status| client.service_status(status).is_ok()))
    }

    async fn run<F>(self, mut report: F)
    where
        F: FnMut(ServiceStatus) -> bool + Send,
    {
        info!(path = %self.path.display(), "Watching daemon socket");
        let mut transitions = Transitions::default();
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;
            let present = tokio::fs::try_exists(&self.path).await.unwrap_or(false);
            let Some(status) = transitions.observe(present) else {
                continue;
            };

            if status == ServiceStatus::Up && !self.up_delay.is_zero() {
                // give the daemon time to start reading its socket
                tokio::time::sleep(self.up_delay).await;
            }
            info!(?status, "Daemon status changed");
            if !report(status) {
                debug!("Client closed, stopping watcher");
                break;
            }
        }
    }
}
