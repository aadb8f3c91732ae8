//! Git protocol error types.

use thiserror::Error;

/// Errors that can occur during git protocol operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Invalid pack file format.
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// The remote said something we did not expect, or rejected the push.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Network or authentication failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The local branch has no commits.
    #[error("nothing to push: {0} has no commits")]
    NothingToPush(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] gitlite_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
