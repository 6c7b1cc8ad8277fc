//! A running client wired to a [`RecordingSender`] and a [`MockDaemon`].

use std::sync::Arc;

use locint_config::AppConfig;
use locint_core::types::XtraStatusEvent;
use locint_core::{ClientFactory, ClientSnapshot, IntegrationClient};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;
use crate::daemon::{MockDaemon, RecordingSender};

/// A client worker running on the test runtime.
///
/// Each harness has its own [`ClientFactory`], so tests can run in parallel.
/// Use [`TestClient::settle`] before asserting on what was sent.
pub struct TestClient {
    pub client: IntegrationClient,
    pub wire: Arc<RecordingSender>,
    pub daemon: MockDaemon,
    pub events: mpsc::UnboundedReceiver<XtraStatusEvent>,
    pub factory: ClientFactory,
    worker: JoinHandle<()>,
}

impl TestClient {
    /// Start an unregistered client with test defaults.
    pub fn start() -> Self {
        Self::with_config(TestConfigBuilder::new().build())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let wire = Arc::new(RecordingSender::new());
        let (events_tx, events) = mpsc::unbounded_channel();
        let factory = ClientFactory::new();
        let (service, client) = factory
            .builder(&config, wire.clone())
            .status_listener(events_tx)
            .build()
            .expect("fresh factory has no live client");
        let worker = tokio::spawn(service.run());
        let daemon = wire.daemon(&config.client.daemon_identity);

        Self {
            client,
            wire,
            daemon,
            events,
            factory,
            worker,
        }
    }

    /// Start a client, register it, and discard the hello.
    pub async fn registered() -> Self {
        let harness = Self::start();
        harness.client.channel_ready().expect("client running");
        harness.settle().await;
        harness.wire.take();
        harness
    }

    /// Wait until every task queued so far has been processed.
    pub async fn settle(&self) {
        self.client.barrier().await.expect("client running");
    }

    /// Deliver a daemon frame and wait for it to be processed.
    pub async fn reply(&self, frame: Vec<u8>) {
        self.client.deliver(frame).expect("client running");
        self.settle().await;
    }

    pub async fn snapshot(&self) -> ClientSnapshot {
        self.client.snapshot().await.expect("client running")
    }

    /// Shut the worker down and wait for it to exit.
    pub async fn stop(self) {
        self.client.shutdown().expect("client running");
        self.worker.await.expect("worker panicked");
    }
}
