#![deny(unsafe_code)]

//! Location integration client.
//!
//! Lets a privileged application configure the device's positioning engine
//! through the location daemon. The client registers over a datagram
//! channel, keeps every accepted setting so it can be replayed when the
//! daemon restarts, and matches the daemon's replies to the callers waiting
//! on them.

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Integration client facade, worker and reply tickets.
pub mod client;
/// JSON envelope codec for daemon datagrams.
pub mod codec;
/// Request categories and the messages exchanged with the daemon.
pub mod message;
/// Datagram transport and daemon liveness watcher.
pub mod transport;
/// Configuration and report value types.
pub mod types;

pub use client::{
    ClientBuilder, ClientError, ClientFactory, ClientService, ClientSnapshot, ConfigTicket,
    IntegrationClient, QueryTicket, RegistrationState,
};
pub use codec::{CodecError, JsonCodec, WireCodec};
pub use message::{ConfigCategory, ConfigRequest};
pub use transport::{ServiceStatus, TransportError, TransportSender};
