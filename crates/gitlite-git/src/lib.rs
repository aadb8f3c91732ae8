//! Git protocol implementation for Gitlite.
//!
//! This crate implements the client side of a smart HTTP push: pkt-line
//! framing, object graph reachability, pack file construction and the
//! receive-pack exchange itself.

mod error;
mod pack;
pub mod pktline;
mod protocol;
mod transport;
mod walk;

pub use error::GitError;
pub use pack::{PackBuilder, PackParser};
pub use pktline::{decode, encode, PktLine, PktLineReader, PktLineWriter, MAX_PKT_LEN};
pub use protocol::{
    push, Command, PushOutcome, RefAdvertisement, SmartProtocolClient, RECEIVE_PACK,
};
pub use transport::{Credentials, HttpTransport, Transport, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use walk::ObjectGraphWalker;

/// Result type for git protocol operations.
pub type Result<T> = std::result::Result<T, GitError>;
