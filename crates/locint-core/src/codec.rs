//! Wire codec for daemon datagrams.
//!
//! Each datagram is one JSON [`Envelope`]: a kind discriminant, the sender's
//! identity, the registration session, and the JSON-encoded payload with its
//! declared length. Frames whose sender is not the daemon, or whose payload
//! length does not match, are rejected before the payload is looked at.
//!
//! The client stamps every frame with its registration epoch. The daemon
//! echoes the session of the request a reply answers and uses the session of
//! the latest hello for pushes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::message::{ClientHello, ConfigRequest, InboundMessage, MessageKind, OutboundMessage};
use crate::types::{Location, Response, RobustLocationConfig, XtraStatusEvent};

/// Largest datagram either side will produce.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors from encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame from unexpected sender {actual:?} (expected {expected:?})")]
    ForeignSender { expected: String, actual: String },

    #[error("payload length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),

    #[error("unexpected message kind {0}")]
    UnexpectedKind(MessageKind),
}

/// Outer frame shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: MessageKind,
    pub sender: String,
    #[serde(default)]
    pub session: u64,
    pub payload_len: usize,
    pub payload: String,
}

/// Body of a daemon status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckBody {
    pub status: Response,
}

impl Envelope {
    /// Wrap `body` into an envelope from `sender`.
    pub fn seal<T: Serialize>(
        kind: MessageKind,
        sender: &str,
        body: &T,
    ) -> Result<Self, CodecError> {
        let payload = serde_json::to_string(body)?;
        Ok(Self {
            kind,
            sender: sender.to_string(),
            session: 0,
            payload_len: payload.len(),
            payload,
        })
    }

    pub fn in_session(mut self, session: u64) -> Self {
        self.session = session;
        self
    }

    /// Decode the payload, checking its declared length first.
    pub fn open<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        if self.payload.len() != self.payload_len {
            return Err(CodecError::LengthMismatch {
                declared: self.payload_len,
                actual: self.payload.len(),
            });
        }
        Ok(serde_json::from_str(&self.payload)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_FRAME_LEN {
            return Err(CodecError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn from_bytes(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(CodecError::TooLarge(frame.len()));
        }
        Ok(serde_json::from_slice(frame)?)
    }
}

/// A decoded message with the session its frame was stamped with.
#[derive(Debug, Clone, PartialEq)]
pub struct Framed<M> {
    pub session: u64,
    pub message: M,
}

/// Converts between typed messages and datagram bytes.
pub trait WireCodec: Send + Sync + 'static {
    fn encode(&self, message: &OutboundMessage, session: u64) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, frame: &[u8]) -> Result<Framed<InboundMessage>, CodecError>;
}

/// JSON envelope codec bound to one client identity.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    identity: String,
    daemon_identity: String,
}

impl JsonCodec {
    pub fn new(identity: impl Into<String>, daemon_identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            daemon_identity: daemon_identity.into(),
        }
    }
}

impl WireCodec for JsonCodec {
    fn encode(&self, message: &OutboundMessage, session: u64) -> Result<Vec<u8>, CodecError> {
        let kind = message.kind();
        let envelope = match message {
            OutboundMessage::Register(hello) => Envelope::seal(kind, &self.identity, hello)?,
            OutboundMessage::Deregister => Envelope::seal(kind, &self.identity, &())?,
            OutboundMessage::InjectLocation(location) => {
                Envelope::seal(kind, &self.identity, location)?
            }
            OutboundMessage::Config(request) => Envelope::seal(kind, &self.identity, request)?,
        };
        envelope.in_session(session).to_bytes()
    }

    fn decode(&self, frame: &[u8]) -> Result<Framed<InboundMessage>, CodecError> {
        let envelope = Envelope::from_bytes(frame)?;
        if envelope.sender != self.daemon_identity {
            return Err(CodecError::ForeignSender {
                expected: self.daemon_identity.clone(),
                actual: envelope.sender,
            });
        }

        let message = match envelope.kind {
            MessageKind::DaemonReady => InboundMessage::DaemonReady,
            MessageKind::Config(category) => {
                let body: AckBody = envelope.open()?;
                InboundMessage::Ack {
                    category,
                    status: body.status,
                }
            }
            MessageKind::RobustLocationReport => {
                InboundMessage::RobustLocationReport(envelope.open::<RobustLocationConfig>()?)
            }
            MessageKind::MinGpsWeekReport => InboundMessage::MinGpsWeekReport(envelope.open()?),
            MessageKind::MinSvElevationReport => {
                InboundMessage::MinSvElevationReport(envelope.open()?)
            }
            MessageKind::SecondaryBandReport => {
                InboundMessage::SecondaryBandReport(envelope.open()?)
            }
            MessageKind::XtraStatusReport => {
                let mut event: XtraStatusEvent = envelope.open()?;
                event.status = event.status.normalized();
                InboundMessage::XtraStatusReport(event)
            }
            kind @ (MessageKind::Register
            | MessageKind::Deregister
            | MessageKind::InjectLocation) => return Err(CodecError::UnexpectedKind(kind)),
        };
        Ok(Framed {
            session: envelope.session,
            message,
        })
    }
}

/// Decode a frame produced by a client. Used on the daemon side and by test
/// doubles; returns the sender identity with the message.
pub fn decode_outbound(frame: &[u8]) -> Result<(String, Framed<OutboundMessage>), CodecError> {
    let envelope = Envelope::from_bytes(frame)?;
    let message = match envelope.kind {
        MessageKind::Register => OutboundMessage::Register(envelope.open::<ClientHello>()?),
        MessageKind::Deregister => {
            envelope.open::<()>()?;
            OutboundMessage::Deregister
        }
        MessageKind::InjectLocation => {
            OutboundMessage::InjectLocation(envelope.open::<Location>()?)
        }
        MessageKind::Config(category) => {
            let request: ConfigRequest = envelope.open()?;
            if request.category() != category {
                return Err(CodecError::UnexpectedKind(envelope.kind));
            }
            OutboundMessage::Config(request)
        }
        kind => return Err(CodecError::UnexpectedKind(kind)),
    };
    let framed = Framed {
        session: envelope.session,
        message,
    };
    Ok((envelope.sender, framed))
}
