//! Tracing initialisation for tests.
//!
//! Most tests use `#[test_log::test]`; this is for helpers and fixtures that
//! need output outside that attribute.

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber honouring `RUST_LOG`, defaulting to
/// debug output from the client crate. Later calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,locint_core=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
