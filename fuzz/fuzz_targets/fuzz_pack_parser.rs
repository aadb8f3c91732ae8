//! Fuzz target for Git pack file parsing.
//!
//! Tests that the pack parser handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing into memory keeps iterations off the filesystem.
    let mut parser = gitlite_git::PackParser::new(data);
    let _ = parser.parse_objects();
});
