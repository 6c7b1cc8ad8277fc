//! Caller-side handles for replies to outstanding requests.

use std::marker::PhantomData;

use tokio::sync::oneshot;

use super::ClientError;
use crate::message::ConfigCategory;
use crate::types::{ConstellationSet, Response, RobustLocationConfig, XtraStatus};

/// A reply routed from the daemon (or synthesized on flush) to one waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(Response),
    RobustLocation(RobustLocationConfig),
    MinGpsWeek(u16),
    MinSvElevation(u8),
    SecondaryBand(ConstellationSet),
    XtraStatus(XtraStatus),
}

pub(crate) type ReplySender = oneshot::Sender<Reply>;

/// Resolves with the daemon's processing status for a configuration request.
#[must_use = "a ticket does nothing unless awaited"]
#[derive(Debug)]
pub struct ConfigTicket {
    category: ConfigCategory,
    rx: oneshot::Receiver<Reply>,
}

impl ConfigTicket {
    pub(crate) fn new(category: ConfigCategory, rx: oneshot::Receiver<Reply>) -> Self {
        Self { category, rx }
    }

    pub fn category(&self) -> ConfigCategory {
        self.category
    }

    /// Wait for the status. A non-success status is still `Ok`.
    pub async fn wait(self) -> Result<Response, ClientError> {
        match self.rx.await {
            Ok(Reply::Status(response)) => Ok(response),
            Ok(_) => Err(ClientError::UnexpectedReply(self.category)),
            Err(_) => Err(ClientError::Closed),
        }
    }
}

/// Typed payload of a query reply.
pub trait QueryReply: Sized + Send + 'static {
    fn from_reply(reply: Reply) -> Option<Self>;
}

impl QueryReply for RobustLocationConfig {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::RobustLocation(config) => Some(config),
            _ => None,
        }
    }
}

/// Minimum GPS week.
impl QueryReply for u16 {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::MinGpsWeek(week) => Some(week),
            _ => None,
        }
    }
}

/// Minimum SV elevation in degrees.
impl QueryReply for u8 {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::MinSvElevation(elevation) => Some(elevation),
            _ => None,
        }
    }
}

impl QueryReply for ConstellationSet {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::SecondaryBand(set) => Some(set),
            _ => None,
        }
    }
}

impl QueryReply for XtraStatus {
    fn from_reply(reply: Reply) -> Option<Self> {
        match reply {
            Reply::XtraStatus(status) => Some(status),
            _ => None,
        }
    }
}

/// Resolves with the report answering a query.
#[must_use = "a ticket does nothing unless awaited"]
#[derive(Debug)]
pub struct QueryTicket<T> {
    category: ConfigCategory,
    rx: oneshot::Receiver<Reply>,
    _reply: PhantomData<fn() -> T>,
}

impl<T: QueryReply> QueryTicket<T> {
    pub(crate) fn new(category: ConfigCategory, rx: oneshot::Receiver<Reply>) -> Self {
        Self {
            category,
            rx,
            _reply: PhantomData,
        }
    }

    pub fn category(&self) -> ConfigCategory {
        self.category
    }

    /// Wait for the report. A bare status in place of a report means the
    /// daemon refused the query, or the query was flushed.
    pub async fn wait(self) -> Result<T, ClientError> {
        match self.rx.await {
            Ok(Reply::Status(response)) => Err(ClientError::Rejected {
                category: self.category,
                response,
            }),
            Ok(reply) => {
                T::from_reply(reply).ok_or(ClientError::UnexpectedReply(self.category))
            }
            Err(_) => Err(ClientError::Closed),
        }
    }
}
