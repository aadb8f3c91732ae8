//! Fuzz target for loose object, tree and commit decoding.

#![no_main]

use gitlite_storage::{Commit, ObjectStore, Tree};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = ObjectStore::decompress("fuzz", data);
    let _ = Tree::parse(data);
    let _ = Commit::parse(data);
});
