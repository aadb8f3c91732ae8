//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No object matches the requested id or prefix.
    #[error("object not found: {0}")]
    NotFound(String),

    /// More than one object matches the requested prefix.
    #[error("ambiguous object prefix {prefix}: {matches} candidates")]
    AmbiguousPrefix {
        /// The prefix that was looked up.
        prefix: String,
        /// Number of objects sharing the prefix.
        matches: usize,
    },

    /// A stored object could not be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject {
        /// Hex id (or prefix) of the object.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Caller supplied an invalid id, prefix, or object kind.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// The index trailer does not match its contents.
    #[error("index checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// Checksum stored in the file.
        expected: String,
        /// Checksum of the bytes actually read.
        computed: String,
    },

    /// The index does not start with `DIRC`.
    #[error("bad index signature: {0:?}")]
    BadSignature([u8; 4]),

    /// The index version is not one we can parse.
    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    /// The index ended before all of its entries were read.
    #[error("truncated index: expected {expected} entries, parsed {parsed}")]
    TruncatedIndex {
        /// Entry count from the header.
        expected: u32,
        /// Entries successfully parsed.
        parsed: u32,
    },
}
