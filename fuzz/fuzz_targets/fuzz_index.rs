//! Fuzz target for index file parsing.
//!
//! Anything the parser accepts must survive a save/load cycle.

#![no_main]

use gitlite_storage::IndexStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(entries) = IndexStore::parse(data) {
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        let reparsed = IndexStore::parse(&IndexStore::serialize(&entries).unwrap()).unwrap();
        assert_eq!(reparsed, sorted);
    }
});
