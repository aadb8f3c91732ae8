//! Fuzz target for Git pkt-line protocol parsing.
//!
//! Tests that both the buffer decoder and the streaming reader handle
//! arbitrary input without panicking, and that they agree whenever the decoder
//! accepts the input.

#![no_main]

use gitlite_git::{decode, PktLineReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let decoded = decode(data);

    let mut reader = PktLineReader::new(data);
    let mut streamed = Vec::new();
    // Each packet consumes at least four bytes.
    for _ in 0..=data.len() / 4 {
        match reader.read() {
            Ok(Some(pkt)) => streamed.push(pkt),
            Ok(None) | Err(_) => break,
        }
    }

    if let Ok(decoded) = decoded {
        assert_eq!(decoded, streamed);
    }
});
