//! Datagram transport to the location daemon and daemon liveness watching.
//!
//! The client only needs a non-blocking [`TransportSender`]; receiving and
//! liveness are pushed into the client from background tasks.

pub mod unix;
pub mod watcher;

pub use unix::{UnixDatagramSender, UnixDatagramTransport};
pub use watcher::SocketPathWatcher;

/// Errors from the datagram transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short datagram write: {sent} of {len} bytes")]
    ShortWrite { sent: usize, len: usize },

    #[error("transport closed")]
    Closed,
}

/// Sends one datagram to the daemon without blocking.
pub trait TransportSender: Send + Sync + 'static {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Daemon liveness as observed by a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Up,
    Down,
}
