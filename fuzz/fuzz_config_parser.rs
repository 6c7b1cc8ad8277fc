//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary bytes to `AppConfig::parse()` to find panics or hangs in
//! parsing and validation.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = locint_config::AppConfig::parse(s) {
            // Derived values must be computable for any accepted config.
            let _ = config.client.socket_path(1);
            let _ = config.registration.backoff(u32::MAX);
            let _ = config.watcher.poll_interval();
        }
    }
});
