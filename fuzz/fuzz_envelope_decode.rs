//! Fuzz target for the datagram envelope codec.
//!
//! Run with: cargo +nightly fuzz run fuzz_envelope_decode
//!
//! Every datagram from the daemon socket is untrusted. Decoding must reject
//! malformed frames with an error, never a panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use locint_core::codec::{JsonCodec, WireCodec, decode_outbound};

fuzz_target!(|data: &[u8]| {
    let codec = JsonCodec::new("fuzz-client", "location-hal-daemon");
    let _ = codec.decode(data);

    if let Ok((_, framed)) = decode_outbound(data) {
        // Anything that decodes must encode again.
        let _ = codec.encode(&framed.message, framed.session);
    }
});
