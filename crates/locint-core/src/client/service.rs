//! The client worker: one tokio task that owns all client state.
//!
//! Every public operation, inbound frame and liveness event becomes a
//! [`Task`] on one unbounded queue, so state is only touched by the worker
//! and tasks run in submission order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use locint_config::RegistrationConfig;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::ClientError;
use super::backlog::{Backlog, Deferred};
use super::cache::ConfigCache;
use super::correlator::{Correlator, Resolution};
use super::registration::{Registration, RegistrationState};
use super::subscription::XtraSubscription;
use super::ticket::{Reply, ReplySender};
use crate::codec::{Framed, WireCodec};
use crate::message::{
    CacheKey, ClientHello, ConfigCategory, ConfigRequest, InboundMessage, OutboundMessage,
};
use crate::transport::{ServiceStatus, TransportSender};
use crate::types::{Location, Response, XtraStatusEvent, XtraStatusTrigger};

/// Work items processed by the worker.
#[derive(Debug)]
pub(crate) enum Task {
    Submit {
        request: ConfigRequest,
        reply: Option<ReplySender>,
    },
    InjectLocation(Location),
    Inbound(Vec<u8>),
    ChannelReady,
    ServiceStatus(ServiceStatus),
    RetryRegistration {
        generation: u64,
    },
    Snapshot(oneshot::Sender<ClientSnapshot>),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Point-in-time view of the worker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSnapshot {
    pub state: RegistrationState,
    pub epoch: u64,
    pub backlog_len: usize,
    pub cached: Vec<CacheKey>,
    pub pending: BTreeMap<ConfigCategory, usize>,
    pub xtra_subscribed: bool,
    pub xtra_resync_pending: bool,
}

/// Clears the process-wide instance flag when the worker goes away.
#[derive(Debug)]
pub(crate) struct InstanceGuard(pub(crate) Arc<AtomicBool>);

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The client worker. Run it with `tokio::spawn(service.run())`.
pub struct ClientService {
    tasks: mpsc::UnboundedReceiver<Task>,
    /// Used to schedule retries onto our own queue without keeping it open.
    scheduler: mpsc::WeakUnboundedSender<Task>,
    sender: Arc<dyn TransportSender>,
    codec: Arc<dyn WireCodec>,
    hello: ClientHello,
    retry: RegistrationConfig,
    clamp_xtra: bool,
    status_listener: Option<mpsc::UnboundedSender<XtraStatusEvent>>,

    registration: Registration,
    backlog: Backlog,
    cache: ConfigCache,
    correlator: Correlator,
    subscription: XtraSubscription,

    _instance: InstanceGuard,
}

pub(crate) struct ServiceParts {
    pub(crate) tasks: mpsc::UnboundedReceiver<Task>,
    pub(crate) scheduler: mpsc::WeakUnboundedSender<Task>,
    pub(crate) sender: Arc<dyn TransportSender>,
    pub(crate) codec: Arc<dyn WireCodec>,
    pub(crate) hello: ClientHello,
    pub(crate) retry: RegistrationConfig,
    pub(crate) clamp_xtra: bool,
    pub(crate) status_listener: Option<mpsc::UnboundedSender<XtraStatusEvent>>,
    pub(crate) instance: InstanceGuard,
}

impl ClientService {
    pub(crate) fn new(parts: ServiceParts) -> Self {
        Self {
            tasks: parts.tasks,
            scheduler: parts.scheduler,
            sender: parts.sender,
            codec: parts.codec,
            hello: parts.hello,
            retry: parts.retry,
            clamp_xtra: parts.clamp_xtra,
            status_listener: parts.status_listener,
            registration: Registration::new(),
            backlog: Backlog::default(),
            cache: ConfigCache::default(),
            correlator: Correlator::default(),
            subscription: XtraSubscription::default(),
            _instance: parts.instance,
        }
    }

    /// Process tasks until shutdown or until every client handle is dropped.
    pub async fn run(mut self) {
        info!(client = %self.hello.client, "Integration client started");

        while let Some(task) = self.tasks.recv().await {
            if !self.handle(task) {
                break;
            }
        }

        self.teardown();
        info!("Integration client stopped");
    }

    /// Handle one task. Returns `false` when the worker should stop.
    pub(crate) fn handle(&mut self, task: Task) -> bool {
        match task {
            Task::Submit { request, reply } => self.submit(request, reply),
            Task::InjectLocation(location) => self.inject_location(location),
            Task::Inbound(frame) => self.on_inbound(&frame),
            Task::ChannelReady => self.on_channel_ready(),
            Task::ServiceStatus(ServiceStatus::Up) => self.on_daemon_up(),
            Task::ServiceStatus(ServiceStatus::Down) => self.on_daemon_down(),
            Task::RetryRegistration { generation } => self.on_retry(generation),
            Task::Snapshot(tx) => {
                let _ = tx.send(self.snapshot());
            }
            Task::Barrier(tx) => {
                let _ = tx.send(());
            }
            Task::Shutdown => {
                info!("Integration client shutting down");
                return false;
            }
        }
        true
    }

    pub(crate) fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            state: self.registration.state(),
            epoch: self.registration.epoch(),
            backlog_len: self.backlog.len(),
            cached: self.cache.keys(),
            pending: self.correlator.counts(),
            xtra_subscribed: self.subscription.is_subscribed(),
            xtra_resync_pending: self.subscription.resync_pending(),
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    fn submit(&mut self, request: ConfigRequest, reply: Option<ReplySender>) {
        let request = match request {
            ConfigRequest::XtraParams { enable, params } if self.clamp_xtra => {
                ConfigRequest::XtraParams {
                    enable,
                    params: params.clamped(),
                }
            }
            other => other,
        };

        if !self.registration.is_registered() {
            debug!(category = %request.category(), "Not registered, deferring request");
            self.backlog.push(Deferred::Config { request, reply });
            return;
        }

        self.send_config(request, reply);
    }

    /// Encode `message` in the current session and hand it to the transport.
    fn send(&self, message: &OutboundMessage) -> Result<(), ClientError> {
        let frame = self.codec.encode(message, self.registration.epoch())?;
        self.sender.send(&frame)?;
        Ok(())
    }

    /// Send a caller's request. On success the cache and subscription state
    /// are updated and the waiter is queued for the reply; on failure the
    /// waiter is failed at once.
    fn send_config(&mut self, request: ConfigRequest, reply: Option<ReplySender>) {
        let category = request.category();
        if let Err(e) = self.send(&OutboundMessage::Config(request.clone())) {
            warn!(%category, error = %e, "Failed to send request to daemon");
            fail(reply);
            return;
        }

        debug!(%category, "Request sent");
        self.cache.record(&request);
        if let ConfigRequest::XtraStatusUpdate { subscribe } = request {
            self.subscription.sent(subscribe);
        }
        if let Some(tx) = reply {
            self.correlator.add(category, Some(tx));
        }
    }

    /// Send a request on the client's own behalf. The reply is consumed
    /// without notifying anyone.
    fn send_silent(&mut self, request: &ConfigRequest) {
        let category = request.category();
        match self.send(&OutboundMessage::Config(request.clone())) {
            Ok(()) => self.correlator.add(category, None),
            Err(e) => warn!(%category, error = %e, "Failed to replay request"),
        }
    }

    fn inject_location(&mut self, location: Location) {
        if !self.registration.is_registered() {
            debug!("Not registered, deferring location injection");
            self.backlog.push(Deferred::Location(location));
            return;
        }
        if let Err(e) = self.send(&OutboundMessage::InjectLocation(location)) {
            warn!(error = %e, "Failed to inject location");
        }
    }

    fn drain_backlog(&mut self) {
        let entries = self.backlog.take();
        if !entries.is_empty() {
            info!(count = entries.len(), "Sending deferred requests");
        }
        for entry in entries {
            match entry {
                Deferred::Config { request, reply } => self.send_config(request, reply),
                Deferred::Location(location) => {
                    if let Err(e) = self.send(&OutboundMessage::InjectLocation(location)) {
                        warn!(error = %e, "Failed to inject deferred location");
                    }
                }
            }
        }
    }

    // ── Registration ────────────────────────────────────────────────

    fn on_channel_ready(&mut self) {
        info!("Receive channel ready, registering with daemon");
        self.registration.begin();
        self.establish();
    }

    fn on_daemon_up(&mut self) {
        info!("Daemon is up, registering");
        self.registration.begin();
        self.establish();
    }

    fn on_daemon_down(&mut self) {
        info!("Daemon is down");
        self.registration.down();
        let flushed = self.correlator.flush();
        if flushed > 0 {
            info!(flushed, "Resolved outstanding requests");
        }
    }

    fn on_retry(&mut self, generation: u64) {
        if !self.registration.retry_is_current(generation) {
            debug!(generation, "Ignoring stale registration retry");
            return;
        }
        self.establish();
    }

    /// Send the hello and, if it went out, bring the daemon up to date:
    /// flush waiters from before, replay cached settings and the
    /// subscription, then send everything deferred.
    ///
    /// Each call opens a new session, so replies still in flight for an
    /// earlier one are dropped on arrival instead of reaching a new waiter.
    fn establish(&mut self) {
        if let Err(e) = self.send_hello() {
            warn!(error = %e, "Registration failed");
            self.schedule_retry();
            return;
        }

        let epoch = self.registration.registered();
        info!(epoch, "Registered with daemon");

        let flushed = self.correlator.flush();
        if flushed > 0 {
            info!(flushed, "Resolved requests from the previous registration");
        }

        let replay = self.cache.replay();
        if !replay.is_empty() {
            info!(count = replay.len(), "Replaying cached configuration");
        }
        for request in &replay {
            self.send_silent(request);
        }
        if self.subscription.is_subscribed() {
            self.send_silent(&ConfigRequest::XtraStatusUpdate { subscribe: true });
        }

        self.drain_backlog();
    }

    fn send_hello(&self) -> Result<(), ClientError> {
        let hello = OutboundMessage::Register(self.hello.clone());
        let frame = self.codec.encode(&hello, self.registration.next_epoch())?;
        self.sender.send(&frame)?;
        Ok(())
    }

    fn schedule_retry(&mut self) {
        let Some((generation, attempt)) = self.registration.next_retry(self.retry.max_retries)
        else {
            error!(
                max_retries = self.retry.max_retries,
                "Registration retries exhausted, waiting for the daemon to come up"
            );
            return;
        };
        let Some(tx) = self.scheduler.upgrade() else {
            return;
        };
        let delay = self.retry.backoff(attempt);
        debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Scheduling registration retry");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Task::RetryRegistration { generation });
        });
    }

    // ── Inbound ─────────────────────────────────────────────────────

    fn on_inbound(&mut self, frame: &[u8]) {
        let Framed { session, message } = match self.codec.decode(frame) {
            Ok(framed) => framed,
            Err(e) => {
                warn!(len = frame.len(), error = %e, "Dropping undecodable frame");
                return;
            }
        };
        debug!(kind = %message.kind(), session, "Received message from daemon");

        if matches!(message, InboundMessage::DaemonReady) {
            self.on_daemon_up();
            return;
        }
        if !self.registration.is_registered() {
            debug!(kind = %message.kind(), "Dropping reply received while unregistered");
            return;
        }
        let epoch = self.registration.epoch();
        if session != epoch {
            debug!(kind = %message.kind(), session, epoch, "Dropping frame from another session");
            return;
        }

        match message {
            InboundMessage::DaemonReady => {}
            InboundMessage::Ack { category, status } => {
                if category.is_query() && status.is_success() {
                    debug!(%category, "Query accepted, waiting for report");
                    return;
                }
                self.resolve(category, Reply::Status(status));
            }
            InboundMessage::RobustLocationReport(config) => {
                self.resolve(
                    ConfigCategory::GetRobustLocationConfig,
                    Reply::RobustLocation(config),
                );
            }
            InboundMessage::MinGpsWeekReport(week) => {
                self.resolve(ConfigCategory::GetMinGpsWeek, Reply::MinGpsWeek(week));
            }
            InboundMessage::MinSvElevationReport(elevation) => {
                self.resolve(
                    ConfigCategory::GetMinSvElevation,
                    Reply::MinSvElevation(elevation),
                );
            }
            InboundMessage::SecondaryBandReport(set) => {
                self.resolve(
                    ConfigCategory::GetConstellationSecondaryBandConfig,
                    Reply::SecondaryBand(set),
                );
            }
            InboundMessage::XtraStatusReport(event) => self.on_xtra_status(event),
        }
    }

    fn resolve(&mut self, category: ConfigCategory, reply: Reply) -> Resolution {
        let resolution = self.correlator.resolve(category, reply);
        if resolution == Resolution::Unmatched {
            debug!(%category, "Discarding reply with no waiter");
        }
        resolution
    }

    fn on_xtra_status(&mut self, event: XtraStatusEvent) {
        if event.trigger == XtraStatusTrigger::UponQuery
            && self.resolve(ConfigCategory::GetXtraStatus, Reply::XtraStatus(event.status))
                == Resolution::Delivered
        {
            return;
        }
        if !self.subscription.admit(event.trigger) {
            debug!(trigger = ?event.trigger, "Dropping repeated registration status push");
            return;
        }
        match &self.status_listener {
            Some(listener) => {
                if listener.send(event).is_err() {
                    debug!("Status listener dropped");
                }
            }
            None => debug!("No status listener, dropping status push"),
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────

    fn teardown(&mut self) {
        if self.registration.is_registered() {
            if let Err(e) = self.send(&OutboundMessage::Deregister) {
                warn!(error = %e, "Failed to deregister");
            }
        }
        let dropped = self.backlog.len();
        if dropped > 0 {
            warn!(dropped, "Discarding deferred requests");
        }
        self.backlog.clear();
    }
}

fn fail(reply: Option<ReplySender>) {
    if let Some(tx) = reply {
        let _ = tx.send(Reply::Status(Response::Failure));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::codec::{AckBody, CodecError, Envelope, JsonCodec, decode_outbound};
    use crate::message::{InboundMessage, MessageKind};
    use crate::transport::TransportError;
    use crate::types::{XtraDataStatus, XtraStatus};
    use pretty_assertions::assert_eq;

    const DAEMON: &str = "location-hal-daemon";

    #[derive(Default)]
    struct Wire {
        frames: Mutex<Vec<Vec<u8>>>,
        failing: AtomicBool,
    }

    impl TransportSender for Wire {
        fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    impl Wire {
        fn take(&self) -> Vec<OutboundMessage> {
            self.frames
                .lock()
                .unwrap()
                .drain(..)
                .map(|f| decode_outbound(&f).unwrap().1.message)
                .collect()
        }
    }

    struct Fixture {
        service: ClientService,
        wire: Arc<Wire>,
        events: mpsc::UnboundedReceiver<XtraStatusEvent>,
        _tx: mpsc::UnboundedSender<Task>,
    }

    fn fixture() -> Fixture {
        let wire = Arc::new(Wire::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let service = ClientService::new(ServiceParts {
            tasks: rx,
            scheduler: tx.downgrade(),
            sender: wire.clone(),
            codec: Arc::new(JsonCodec::new("locint.1", DAEMON)),
            hello: ClientHello {
                client: "locint".to_string(),
                version: "test".to_string(),
                git_hash: "test".to_string(),
            },
            retry: RegistrationConfig::default(),
            clamp_xtra: true,
            status_listener: Some(events_tx),
            instance: InstanceGuard(Arc::new(AtomicBool::new(true))),
        });
        Fixture {
            service,
            wire,
            events,
            _tx: tx,
        }
    }

    impl Fixture {
        /// Deliver a daemon frame stamped with the current session.
        fn deliver<T: Serialize>(&mut self, kind: MessageKind, body: &T) {
            let session = self.service.registration.epoch();
            self.service.handle(daemon(kind, session, body));
        }

        fn ack(&mut self, category: ConfigCategory, status: Response) {
            self.deliver(MessageKind::Config(category), &AckBody { status });
        }
    }

    fn daemon<T: Serialize>(kind: MessageKind, session: u64, body: &T) -> Task {
        Task::Inbound(
            Envelope::seal(kind, DAEMON, body)
                .map(|e| e.in_session(session))
                .and_then(|e| e.to_bytes())
                .unwrap(),
        )
    }

    fn submit(f: &mut Fixture, request: ConfigRequest) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        f.service.handle(Task::Submit {
            request,
            reply: Some(tx),
        });
        rx
    }

    fn registered() -> Fixture {
        let mut f = fixture();
        f.service.handle(Task::ChannelReady);
        f.wire.take();
        f
    }

    #[tokio::test]
    async fn test_channel_ready_registers() {
        let mut f = fixture();
        f.service.handle(Task::ChannelReady);

        let snapshot = f.service.snapshot();
        assert_eq!(snapshot.state, RegistrationState::Registered);
        assert_eq!(snapshot.epoch, 1);
        assert!(matches!(f.wire.take()[..], [OutboundMessage::Register(_)]));
    }

    #[tokio::test]
    async fn test_requests_deferred_until_registered() {
        let mut f = fixture();
        let mut rx = submit(&mut f, ConfigRequest::MinSvElevation(10));
        f.service
            .handle(Task::InjectLocation(crate::types::Location {
                timestamp_ms: 1,
                latitude: 1.0,
                longitude: 2.0,
                altitude: None,
                horizontal_accuracy_meters: 5.0,
            }));
        assert!(f.wire.take().is_empty());
        assert_eq!(f.service.snapshot().backlog_len, 2);

        f.service.handle(Task::ChannelReady);
        let sent = f.wire.take();
        assert_eq!(sent.len(), 3);
        assert!(matches!(sent[0], OutboundMessage::Register(_)));
        assert_eq!(
            sent[1],
            OutboundMessage::Config(ConfigRequest::MinSvElevation(10))
        );
        assert!(matches!(sent[2], OutboundMessage::InjectLocation(_)));

        f.ack(ConfigCategory::MinSvElevation, Response::Success);
        assert_eq!(rx.try_recv().unwrap(), Reply::Status(Response::Success));
    }

    #[tokio::test]
    async fn test_send_failure_resolves_immediately_and_skips_cache() {
        let mut f = registered();
        f.wire.failing.store(true, Ordering::SeqCst);
        let mut rx = submit(&mut f, ConfigRequest::MinSvElevation(10));

        assert_eq!(rx.try_recv().unwrap(), Reply::Status(Response::Failure));
        let snapshot = f.service.snapshot();
        assert!(snapshot.cached.is_empty());
        assert!(snapshot.pending.is_empty());
    }

    #[tokio::test]
    async fn test_query_success_ack_ignored_until_report() {
        let mut f = registered();
        let mut rx = submit(&mut f, ConfigRequest::GetMinGpsWeek);

        f.ack(ConfigCategory::GetMinGpsWeek, Response::Success);
        assert!(rx.try_recv().is_err());

        f.deliver(MessageKind::MinGpsWeekReport, &2210u16);
        assert_eq!(rx.try_recv().unwrap(), Reply::MinGpsWeek(2210));
    }

    #[tokio::test]
    async fn test_query_failure_ack_resolves() {
        let mut f = registered();
        let mut rx = submit(&mut f, ConfigRequest::GetMinGpsWeek);
        f.ack(ConfigCategory::GetMinGpsWeek, Response::NotSupported);
        assert_eq!(rx.try_recv().unwrap(), Reply::Status(Response::NotSupported));
    }

    #[tokio::test]
    async fn test_daemon_down_flushes_and_unregisters() {
        let mut f = registered();
        let mut set_rx = submit(&mut f, ConfigRequest::MinSvElevation(10));
        let mut get_rx = submit(&mut f, ConfigRequest::GetMinSvElevation);

        f.service.handle(Task::ServiceStatus(ServiceStatus::Down));
        assert_eq!(f.service.snapshot().state, RegistrationState::Unregistered);
        assert_eq!(set_rx.try_recv().unwrap(), Reply::Status(Response::Success));
        assert_eq!(get_rx.try_recv().unwrap(), Reply::Status(Response::Failure));

        // a late reply is dropped while unregistered
        f.ack(ConfigCategory::MinSvElevation, Response::Failure);
        assert!(f.service.snapshot().pending.is_empty());
    }

    #[tokio::test]
    async fn test_daemon_up_replays_cache_in_key_order() {
        let mut f = registered();
        let _ = submit(&mut f, ConfigRequest::MinSvElevation(10));
        let _ = submit(&mut f, ConfigRequest::MinGpsWeek(2200));
        let _ = submit(
            &mut f,
            ConfigRequest::RobustLocation {
                enable: true,
                enable_for_e911: true,
            },
        );
        f.service.handle(Task::ServiceStatus(ServiceStatus::Down));
        f.wire.take();

        f.service.handle(Task::ServiceStatus(ServiceStatus::Up));
        let sent = f.wire.take();
        assert!(matches!(sent[0], OutboundMessage::Register(_)));
        assert_eq!(
            sent[1..].to_vec(),
            vec![
                OutboundMessage::Config(ConfigRequest::RobustLocation {
                    enable: true,
                    enable_for_e911: true,
                }),
                OutboundMessage::Config(ConfigRequest::MinSvElevation(10)),
            ]
        );
        assert_eq!(f.service.snapshot().epoch, 2);
    }

    #[tokio::test]
    async fn test_replay_replies_absorbed() {
        let mut f = registered();
        let _ = submit(&mut f, ConfigRequest::MinSvElevation(10));
        f.ack(ConfigCategory::MinSvElevation, Response::Success);
        f.service.handle(Task::ServiceStatus(ServiceStatus::Up));

        let mut rx = submit(&mut f, ConfigRequest::MinSvElevation(20));
        f.ack(ConfigCategory::MinSvElevation, Response::Success);
        assert!(rx.try_recv().is_err());
        f.ack(ConfigCategory::MinSvElevation, Response::ParamInvalid);
        assert_eq!(rx.try_recv().unwrap(), Reply::Status(Response::ParamInvalid));
    }

    struct Oversized;

    impl WireCodec for Oversized {
        fn encode(&self, _: &OutboundMessage, _: u64) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::TooLarge(usize::MAX))
        }

        fn decode(&self, frame: &[u8]) -> Result<Framed<InboundMessage>, CodecError> {
            Err(CodecError::TooLarge(frame.len()))
        }
    }

    #[tokio::test]
    async fn test_send_failures_keep_their_cause() {
        let mut f = fixture();
        f.wire.failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            f.service.send_hello(),
            Err(ClientError::Transport(TransportError::Closed))
        ));

        f.wire.failing.store(false, Ordering::SeqCst);
        f.service.codec = Arc::new(Oversized);
        assert!(matches!(
            f.service.send(&OutboundMessage::Deregister),
            Err(ClientError::Codec(CodecError::TooLarge(_)))
        ));
        assert!(f.wire.take().is_empty());
    }

    #[tokio::test]
    async fn test_frame_from_earlier_session_dropped() {
        let mut f = registered();
        let _ = submit(&mut f, ConfigRequest::MinSvElevation(10));
        f.ack(ConfigCategory::MinSvElevation, Response::Success);
        f.service.handle(Task::ServiceStatus(ServiceStatus::Up));
        let mut rx = submit(&mut f, ConfigRequest::MinSvElevation(20));

        f.service.handle(daemon(
            MessageKind::Config(ConfigCategory::MinSvElevation),
            1,
            &AckBody {
                status: Response::Failure,
            },
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            f.service
                .snapshot()
                .pending
                .get(&ConfigCategory::MinSvElevation),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn test_inbound_daemon_ready_reregisters() {
        let mut f = registered();
        f.deliver(MessageKind::DaemonReady, &());
        assert_eq!(f.service.snapshot().epoch, 2);
        assert!(matches!(f.wire.take()[..], [OutboundMessage::Register(_)]));
    }

    #[tokio::test]
    async fn test_foreign_frame_dropped() {
        let mut f = registered();
        let mut rx = submit(&mut f, ConfigRequest::MinSvElevation(10));
        f.service.handle(Task::Inbound(
            Envelope::seal(
                MessageKind::Config(ConfigCategory::MinSvElevation),
                "impostor",
                &AckBody {
                    status: Response::Success,
                },
            )
            .and_then(|e| e.to_bytes())
            .unwrap(),
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_registration_push_delivered_once() {
        let mut f = registered();
        let _ = submit(&mut f, ConfigRequest::XtraStatusUpdate { subscribe: true });
        let push = XtraStatusEvent {
            trigger: XtraStatusTrigger::UponRegistration,
            status: XtraStatus {
                feature_enabled: true,
                data_status: XtraDataStatus::Valid,
                valid_for_hours: 24,
            },
        };
        f.deliver(MessageKind::XtraStatusReport, &push);
        assert_eq!(f.events.try_recv().unwrap(), push);

        // restart: the subscription is replayed without re-arming
        f.service.handle(Task::ServiceStatus(ServiceStatus::Up));
        let sent = f.wire.take();
        assert!(sent.contains(&OutboundMessage::Config(ConfigRequest::XtraStatusUpdate {
            subscribe: true
        })));
        f.deliver(MessageKind::XtraStatusReport, &push);
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_query_status_report_goes_to_ticket() {
        let mut f = registered();
        let mut rx = submit(&mut f, ConfigRequest::GetXtraStatus);
        let report = XtraStatusEvent {
            trigger: XtraStatusTrigger::UponQuery,
            status: XtraStatus::default(),
        };
        f.deliver(MessageKind::XtraStatusReport, &report);
        assert_eq!(
            rx.try_recv().unwrap(),
            Reply::XtraStatus(XtraStatus::default())
        );
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_xtra_params_clamped_before_send() {
        let mut f = registered();
        let _ = submit(
            &mut f,
            ConfigRequest::XtraParams {
                enable: true,
                params: crate::types::XtraParams {
                    download_retry_attempts: 50,
                    ..Default::default()
                },
            },
        );
        let sent = f.wire.take();
        let OutboundMessage::Config(ConfigRequest::XtraParams { params, .. }) = &sent[0] else {
            panic!("expected xtra params");
        };
        assert_eq!(params.download_retry_attempts, 6);
    }

    #[tokio::test]
    async fn test_failed_hello_keeps_registering() {
        let mut f = fixture();
        f.wire.failing.store(true, Ordering::SeqCst);
        f.service.handle(Task::ChannelReady);
        assert_eq!(f.service.snapshot().state, RegistrationState::Registering);

        f.wire.failing.store(false, Ordering::SeqCst);
        // a retry armed before a newer attempt is ignored
        f.service.handle(Task::RetryRegistration { generation: 0 });
        assert_eq!(f.service.snapshot().state, RegistrationState::Registering);
    }

    #[tokio::test]
    async fn test_teardown_deregisters() {
        let mut f = registered();
        assert!(!f.service.handle(Task::Shutdown));
        f.service.teardown();
        assert_eq!(f.wire.take(), vec![OutboundMessage::Deregister]);
    }
}
