//! A recording transport and a scripted daemon.
//!
//! [`RecordingSender`] captures every frame the client sends and can be told
//! to fail. [`MockDaemon`] builds the frames a real daemon would send back.
//!
//! A daemon obtained from [`RecordingSender::daemon`] stamps its frames with
//! the session of the last hello that went out, the way the real daemon
//! answers within the registration it last accepted.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use locint_core::codec::{AckBody, Envelope, decode_outbound};
use locint_core::message::{ConfigCategory, ConfigRequest, MessageKind, OutboundMessage};
use locint_core::transport::{TransportError, TransportSender};
use locint_core::types::{
    ConstellationSet, Response, RobustLocationConfig, XtraStatus, XtraStatusEvent,
    XtraStatusTrigger,
};

/// Identity the default config expects from the daemon.
pub const DAEMON_IDENTITY: &str = "location-hal-daemon";

/// Transport double that records frames instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingSender {
    frames: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
    fail_next: AtomicUsize,
    session: Arc<AtomicU64>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Drain and decode every recorded frame.
    pub fn take(&self) -> Vec<OutboundMessage> {
        self.frames
            .lock()
            .expect("frames lock poisoned")
            .drain(..)
            .map(|frame| {
                decode_outbound(&frame)
                    .expect("client sent an undecodable frame")
                    .1
                    .message
            })
            .collect()
    }

    /// Drain recorded frames, keeping only configuration requests.
    pub fn take_requests(&self) -> Vec<ConfigRequest> {
        self.take()
            .into_iter()
            .filter_map(|message| match message {
                OutboundMessage::Config(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> usize {
        self.frames.lock().expect("frames lock poisoned").len()
    }

    /// Session of the last hello sent, zero before any.
    pub fn session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    /// A daemon that answers in whatever session the last hello opened.
    pub fn daemon(&self, identity: &str) -> MockDaemon {
        MockDaemon {
            identity: identity.to_string(),
            session: self.session.clone(),
        }
    }
}

impl TransportSender for RecordingSender {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(TransportError::Closed);
        }
        if let Ok((_, framed)) = decode_outbound(frame) {
            if matches!(framed.message, OutboundMessage::Register(_)) {
                self.session.store(framed.session, Ordering::SeqCst);
            }
        }
        self.frames
            .lock()
            .expect("frames lock poisoned")
            .push(frame.to_vec());
        Ok(())
    }
}

/// Builds daemon-to-client frames.
#[derive(Debug, Clone)]
pub struct MockDaemon {
    identity: String,
    session: Arc<AtomicU64>,
}

impl Default for MockDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDaemon {
    pub fn new() -> Self {
        Self::with_identity(DAEMON_IDENTITY)
    }

    /// A daemon claiming a different identity; its frames must be dropped.
    pub fn with_identity(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            session: Arc::default(),
        }
    }

    /// A copy pinned to `session`, for frames left over from another
    /// registration or for a daemon that is not watching the client's hellos.
    pub fn in_session(&self, session: u64) -> Self {
        Self {
            identity: self.identity.clone(),
            session: Arc::new(AtomicU64::new(session)),
        }
    }

    pub fn session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    fn frame<T: Serialize>(&self, kind: MessageKind, body: &T) -> Vec<u8> {
        Envelope::seal(kind, &self.identity, body)
            .map(|envelope| envelope.in_session(self.session()))
            .and_then(|envelope| envelope.to_bytes())
            .expect("failed to build daemon frame")
    }

    pub fn ready(&self) -> Vec<u8> {
        self.frame(MessageKind::DaemonReady, &())
    }

    pub fn ack(&self, category: ConfigCategory, status: Response) -> Vec<u8> {
        self.frame(MessageKind::Config(category), &AckBody { status })
    }

    pub fn robust_location(&self, config: RobustLocationConfig) -> Vec<u8> {
        self.frame(MessageKind::RobustLocationReport, &config)
    }

    pub fn min_gps_week(&self, week: u16) -> Vec<u8> {
        self.frame(MessageKind::MinGpsWeekReport, &week)
    }

    pub fn min_sv_elevation(&self, degrees: u8) -> Vec<u8> {
        self.frame(MessageKind::MinSvElevationReport, &degrees)
    }

    pub fn secondary_band(&self, disabled: ConstellationSet) -> Vec<u8> {
        self.frame(MessageKind::SecondaryBandReport, &disabled)
    }

    pub fn xtra_status(&self, trigger: XtraStatusTrigger, status: XtraStatus) -> Vec<u8> {
        self.frame(
            MessageKind::XtraStatusReport,
            &XtraStatusEvent { trigger, status },
        )
    }
}
