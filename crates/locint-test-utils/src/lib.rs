#![deny(unsafe_code)]

//! Shared test utilities for the locint workspace.
//!
//! Provides a recording transport, a scripted daemon that builds reply
//! frames, a harness that runs a client worker, config builders and tracing
//! helpers.
//!
//! ```toml
//! [dev-dependencies]
//! locint-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod harness;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use daemon::{DAEMON_IDENTITY, MockDaemon, RecordingSender};
pub use harness::TestClient;
