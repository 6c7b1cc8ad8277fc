//! The integration client facade.
//!
//! [`ClientFactory::builder`] produces a [`ClientService`] (the worker, to be
//! spawned) and a cloneable [`IntegrationClient`] handle. Every handle method
//! only enqueues a task; replies come back through tickets.
//!
//! ```no_run
//! # async fn demo(sender: std::sync::Arc<dyn locint_core::transport::TransportSender>) -> Result<(), locint_core::ClientError> {
//! use locint_core::{ClientFactory, types::Response};
//!
//! let config = locint_config::AppConfig::default();
//! let (service, client) = ClientFactory::process().builder(&config, sender).build()?;
//! tokio::spawn(service.run());
//!
//! client.channel_ready()?;
//! let status = client.config_min_sv_elevation(15)?.wait().await?;
//! assert_eq!(status, Response::Success);
//! # Ok(())
//! # }
//! ```

mod backlog;
mod cache;
mod correlator;
mod registration;
mod service;
mod subscription;
mod ticket;

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};

use locint_config::{AppConfig, RegistrationConfig};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub use registration::RegistrationState;
pub use service::{ClientService, ClientSnapshot};
pub use ticket::{ConfigTicket, QueryReply, QueryTicket};

use service::{InstanceGuard, ServiceParts, Task};

use crate::build_info;
use crate::codec::{CodecError, JsonCodec, WireCodec};
use crate::message::{ClientHello, ConfigCategory, ConfigRequest};
use crate::transport::{ServiceStatus, TransportError, TransportSender};
use crate::types::{
    AidingData, ConstellationConfig, ConstellationSet, DeadReckoningConfig, EngineRunState,
    EngineType, GeodeticDatum, LeverArmConfig, Location, NmeaTypes, Response,
    RobustLocationConfig, XtraParams, XtraStatus, XtraStatusEvent,
};

/// Errors returned by the client facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("an integration client is already running in this process")]
    AlreadyRunning,

    #[error("integration client has shut down")]
    Closed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no status listener was configured for this client")]
    NoStatusListener,

    #[error("daemon answered {category} with {response}")]
    Rejected {
        category: ConfigCategory,
        response: Response,
    },

    #[error("unexpected reply for {0}")]
    UnexpectedReply(ConfigCategory),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Enforces a single live client per slot.
///
/// Applications build through [`ClientFactory::process`], the one slot shared
/// by the whole process. The slot is released when the worker is dropped,
/// after `run` returns or if it is never spawned.
#[derive(Debug, Clone, Default)]
pub struct ClientFactory {
    active: Arc<AtomicBool>,
}

impl ClientFactory {
    /// A factory with its own slot, independent of [`ClientFactory::process`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide factory.
    pub fn process() -> &'static ClientFactory {
        static PROCESS: OnceLock<ClientFactory> = OnceLock::new();
        PROCESS.get_or_init(ClientFactory::new)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn builder(&self, config: &AppConfig, sender: Arc<dyn TransportSender>) -> ClientBuilder {
        ClientBuilder {
            active: Arc::clone(&self.active),
            identity: config.client.name.clone(),
            daemon_identity: config.client.daemon_identity.clone(),
            retry: config.registration.clone(),
            clamp_xtra: !config.xtra.test_enabled,
            sender,
            codec: None,
            status_listener: None,
        }
    }
}

/// Configures a client before it is started.
pub struct ClientBuilder {
    active: Arc<AtomicBool>,
    identity: String,
    daemon_identity: String,
    retry: RegistrationConfig,
    clamp_xtra: bool,
    sender: Arc<dyn TransportSender>,
    codec: Option<Arc<dyn WireCodec>>,
    status_listener: Option<mpsc::UnboundedSender<XtraStatusEvent>>,
}

impl ClientBuilder {
    /// Identity carried in every outbound frame. Defaults to the configured
    /// client name.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Replace the JSON envelope codec.
    pub fn codec(mut self, codec: Arc<dyn WireCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Receive data-source status pushes. Required for
    /// [`IntegrationClient::subscribe_xtra_status`].
    pub fn status_listener(mut self, listener: mpsc::UnboundedSender<XtraStatusEvent>) -> Self {
        self.status_listener = Some(listener);
        self
    }

    pub fn build(self) -> Result<(ClientService, IntegrationClient), ClientError> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ClientError::AlreadyRunning)?;
        let instance = InstanceGuard(self.active);

        let codec = self.codec.unwrap_or_else(|| {
            Arc::new(JsonCodec::new(self.identity.clone(), self.daemon_identity))
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let has_status_listener = self.status_listener.is_some();

        let service = ClientService::new(ServiceParts {
            tasks: rx,
            scheduler: tx.downgrade(),
            sender: self.sender,
            codec,
            hello: ClientHello {
                client: self.identity,
                version: build_info::VERSION.to_string(),
                git_hash: build_info::GIT_HASH.to_string(),
            },
            retry: self.retry,
            clamp_xtra: self.clamp_xtra,
            status_listener: self.status_listener,
            instance,
        });

        let client = IntegrationClient {
            tasks: tx,
            has_status_listener,
        };
        Ok((service, client))
    }
}

/// Handle to a running client. Cheap to clone; all clones feed one worker.
#[derive(Debug, Clone)]
pub struct IntegrationClient {
    tasks: mpsc::UnboundedSender<Task>,
    has_status_listener: bool,
}

impl IntegrationClient {
    fn schedule(&self, task: Task) -> Result<(), ClientError> {
        self.tasks.send(task).map_err(|_| ClientError::Closed)
    }

    fn submit(&self, request: ConfigRequest) -> Result<ConfigTicket, ClientError> {
        let category = request.category();
        let (tx, rx) = oneshot::channel();
        self.schedule(Task::Submit {
            request,
            reply: Some(tx),
        })?;
        debug!(%category, "Request queued");
        Ok(ConfigTicket::new(category, rx))
    }

    fn query<T: QueryReply>(&self, request: ConfigRequest) -> Result<QueryTicket<T>, ClientError> {
        let category = request.category();
        let (tx, rx) = oneshot::channel();
        self.schedule(Task::Submit {
            request,
            reply: Some(tx),
        })?;
        debug!(%category, "Query queued");
        Ok(QueryTicket::new(category, rx))
    }

    // ── Configuration ───────────────────────────────────────────────

    pub fn config_constellations(
        &self,
        config: ConstellationConfig,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::Constellations(config))
    }

    /// Disable the secondary band on `disabled`; an empty set enables it
    /// everywhere.
    pub fn config_constellation_secondary_band(
        &self,
        disabled: ConstellationSet,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::ConstellationSecondaryBand { disabled })
    }

    pub fn config_constrained_time_uncertainty(
        &self,
        enable: bool,
        threshold_ms: f32,
        energy_budget: u32,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::ConstrainedTimeUncertainty {
            enable,
            threshold_ms,
            energy_budget,
        })
    }

    pub fn config_position_assisted_clock_estimator(
        &self,
        enable: bool,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::PositionAssistedClockEstimator { enable })
    }

    pub fn delete_aiding_data(&self, data: AidingData) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::DeleteAidingData(data))
    }

    pub fn config_lever_arm(&self, config: LeverArmConfig) -> Result<ConfigTicket, ClientError> {
        if config.is_empty() {
            return Err(ClientError::InvalidArgument(
                "lever arm configuration is empty".to_string(),
            ));
        }
        self.submit(ConfigRequest::LeverArm(config))
    }

    pub fn config_robust_location(
        &self,
        enable: bool,
        enable_for_e911: bool,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::RobustLocation {
            enable,
            enable_for_e911,
        })
    }

    pub fn config_min_gps_week(&self, week: u16) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::MinGpsWeek(week))
    }

    pub fn config_dead_reckoning_engine(
        &self,
        config: DeadReckoningConfig,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::DeadReckoningEngine(config))
    }

    pub fn config_min_sv_elevation(&self, degrees: u8) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::MinSvElevation(degrees))
    }

    pub fn config_engine_run_state(
        &self,
        engine: EngineType,
        state: EngineRunState,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::EngineRunState { engine, state })
    }

    pub fn set_user_consent_terrestrial_positioning(
        &self,
        consent: bool,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::UserConsentTerrestrialPositioning { consent })
    }

    pub fn config_output_nmea_types(
        &self,
        types: NmeaTypes,
        datum: GeodeticDatum,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::OutputNmeaTypes { types, datum })
    }

    pub fn config_engine_integrity_risk(
        &self,
        engine: EngineType,
        risk: u32,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::EngineIntegrityRisk { engine, risk })
    }

    /// Configure the data-source download. Intervals are clamped to the
    /// supported ranges unless test mode is enabled.
    pub fn config_xtra_params(
        &self,
        enable: bool,
        params: XtraParams,
    ) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::XtraParams { enable, params })
    }

    pub fn inject_location(&self, location: Location) -> Result<(), ClientError> {
        self.schedule(Task::InjectLocation(location))
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get_robust_location_config(
        &self,
    ) -> Result<QueryTicket<RobustLocationConfig>, ClientError> {
        self.query(ConfigRequest::GetRobustLocationConfig)
    }

    pub fn get_min_gps_week(&self) -> Result<QueryTicket<u16>, ClientError> {
        self.query(ConfigRequest::GetMinGpsWeek)
    }

    pub fn get_min_sv_elevation(&self) -> Result<QueryTicket<u8>, ClientError> {
        self.query(ConfigRequest::GetMinSvElevation)
    }

    pub fn get_constellation_secondary_band_config(
        &self,
    ) -> Result<QueryTicket<ConstellationSet>, ClientError> {
        self.query(ConfigRequest::GetConstellationSecondaryBandConfig)
    }

    pub fn get_xtra_status(&self) -> Result<QueryTicket<XtraStatus>, ClientError> {
        self.query(ConfigRequest::GetXtraStatus)
    }

    // ── Status subscription ─────────────────────────────────────────

    /// Ask the daemon to push data-source status to the status listener.
    /// The subscription is restored whenever the daemon restarts.
    pub fn subscribe_xtra_status(&self) -> Result<ConfigTicket, ClientError> {
        if !self.has_status_listener {
            return Err(ClientError::NoStatusListener);
        }
        self.submit(ConfigRequest::XtraStatusUpdate { subscribe: true })
    }

    pub fn unsubscribe_xtra_status(&self) -> Result<ConfigTicket, ClientError> {
        self.submit(ConfigRequest::XtraStatusUpdate { subscribe: false })
    }

    // ── Transport events ────────────────────────────────────────────

    /// The receive channel is bound; register with the daemon.
    pub fn channel_ready(&self) -> Result<(), ClientError> {
        self.schedule(Task::ChannelReady)
    }

    /// Hand an inbound datagram to the worker.
    pub fn deliver(&self, frame: Vec<u8>) -> Result<(), ClientError> {
        self.schedule(Task::Inbound(frame))
    }

    pub fn service_status(&self, status: ServiceStatus) -> Result<(), ClientError> {
        self.schedule(Task::ServiceStatus(status))
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.schedule(Task::Snapshot(tx))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Resolves once every task queued before it has been processed.
    pub async fn barrier(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.schedule(Task::Barrier(tx))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Deregister and stop the worker. Deferred requests are discarded and
    /// their tickets resolve with [`ClientError::Closed`].
    pub fn shutdown(&self) -> Result<(), ClientError> {
        self.schedule(Task::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    struct NullSender;

    impl TransportSender for NullSender {
        fn send(&self, _frame: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn sender() -> Arc<dyn TransportSender> {
        Arc::new(NullSender)
    }

    #[tokio::test]
    async fn test_second_client_rejected_while_first_alive() {
        let factory = ClientFactory::new();
        let config = AppConfig::default();

        let (service, _client) = factory.builder(&config, sender()).build().unwrap();
        assert!(factory.is_active());
        assert!(matches!(
            factory.builder(&config, sender()).build(),
            Err(ClientError::AlreadyRunning)
        ));

        drop(service);
        assert!(!factory.is_active());
        assert!(factory.builder(&config, sender()).build().is_ok());
    }

    #[tokio::test]
    async fn test_process_factory_shared_across_callers() {
        let config = AppConfig::default();
        let (service, _client) = ClientFactory::process()
            .builder(&config, sender())
            .build()
            .unwrap();
        assert!(matches!(
            ClientFactory::process().builder(&config, sender()).build(),
            Err(ClientError::AlreadyRunning)
        ));
        assert!(std::ptr::eq(
            ClientFactory::process(),
            ClientFactory::process()
        ));

        drop(service);
        assert!(!ClientFactory::process().is_active());
    }

    #[tokio::test]
    async fn test_slot_released_after_shutdown() {
        let factory = ClientFactory::new();
        let config = AppConfig::default();
        let (service, client) = factory.builder(&config, sender()).build().unwrap();
        let worker = tokio::spawn(service.run());

        client.shutdown().unwrap();
        worker.await.unwrap();
        assert!(!factory.is_active());
        assert!(matches!(client.barrier().await, Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn test_subscribe_requires_listener() {
        let factory = ClientFactory::new();
        let (_service, client) = factory
            .builder(&AppConfig::default(), sender())
            .build()
            .unwrap();
        assert!(matches!(
            client.subscribe_xtra_status(),
            Err(ClientError::NoStatusListener)
        ));
    }

    #[tokio::test]
    async fn test_empty_lever_arm_rejected() {
        let factory = ClientFactory::new();
        let (_service, client) = factory
            .builder(&AppConfig::default(), sender())
            .build()
            .unwrap();
        assert!(matches!(
            client.config_lever_arm(LeverArmConfig::default()),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_deferred_ticket_closed_on_shutdown() {
        let factory = ClientFactory::new();
        let (service, client) = factory
            .builder(&AppConfig::default(), sender())
            .build()
            .unwrap();
        let worker = tokio::spawn(service.run());

        let ticket = client.config_min_gps_week(2200).unwrap();
        client.shutdown().unwrap();
        assert!(matches!(ticket.wait().await, Err(ClientError::Closed)));
        worker.await.unwrap();
    }
}
