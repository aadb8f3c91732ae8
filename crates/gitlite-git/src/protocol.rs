//! Git smart HTTP push.
//!
//! Implements the client half of `git-receive-pack` over HTTP: ref
//! discovery, the update command, the pack upload and the status report.
//! See: https://git-scm.com/docs/http-protocol

use crate::pack::PackBuilder;
use crate::pktline::{decode, encode, PktLine};
use crate::transport::{Credentials, HttpTransport, Transport};
use crate::walk::ObjectGraphWalker;
use crate::{GitError, Result};
use gitlite_storage::{ObjectId, Repository};

/// Service name of the push endpoint.
pub const RECEIVE_PACK: &str = "git-receive-pack";

const REQUEST_CONTENT_TYPE: &str = "application/x-git-receive-pack-request";
const REPORT_STATUS: &str = "report-status";
const UNPACK_OK: &str = "unpack ok";
const HEX_LEN: usize = 40;

/// A reference advertisement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefAdvertisement {
    /// Object ID the ref points to.
    pub id: ObjectId,
    /// Reference name.
    pub name: String,
    /// Capabilities listed after the NUL, if any.
    pub capabilities: Vec<String>,
}

impl RefAdvertisement {
    /// Parses `"<hash> <ref-name>[\0<capabilities>]"`.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = String::from_utf8_lossy(line);
        let (refspec, caps) = match line.split_once('\0') {
            Some((refspec, caps)) => (refspec, caps),
            None => (&line[..], ""),
        };
        let (hex, name) = refspec.split_once(' ').ok_or_else(|| {
            GitError::ProtocolViolation(format!("malformed ref advertisement: {:?}", refspec))
        })?;
        let id = ObjectId::from_hex(hex).map_err(|_| {
            GitError::ProtocolViolation(format!("invalid advertised object id: {:?}", hex))
        })?;

        Ok(Self {
            id,
            name: name.to_string(),
            capabilities: caps.split_whitespace().map(str::to_string).collect(),
        })
    }
}

/// A ref update command sent to the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Old object ID (zeros for create).
    pub old_id: ObjectId,
    /// New object ID.
    pub new_id: ObjectId,
    /// Reference name.
    pub ref_name: String,
}

impl Command {
    /// Checks if this is a create command.
    pub fn is_create(&self) -> bool {
        self.old_id.is_zero()
    }

    /// The command line as sent, requesting a status report.
    pub fn payload(&self) -> String {
        format!(
            "{} {} {}\0{}",
            self.old_id, self.new_id, self.ref_name, REPORT_STATUS
        )
    }

    /// Parses a command line, ignoring any capabilities after the NUL.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let line = String::from_utf8_lossy(line);
        let line = line.split('\0').next().unwrap_or_default();
        let parts: Vec<&str> = line.splitn(3, ' ').collect();
        let [old, new, ref_name] = parts.as_slice() else {
            return Err(GitError::ProtocolViolation(format!(
                "malformed command: {:?}",
                line
            )));
        };
        let parse_id = |hex: &str| {
            ObjectId::from_hex(hex).map_err(|_| {
                GitError::ProtocolViolation(format!("invalid object id in command: {:?}", hex))
            })
        };

        Ok(Self {
            old_id: parse_id(*old)?,
            new_id: parse_id(*new)?,
            ref_name: ref_name.to_string(),
        })
    }
}

/// Result of a successful push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote branch already pointed at the local head.
    UpToDate,
    /// The remote branch was moved.
    Pushed {
        /// Previous remote head, `None` for a fresh remote.
        old: Option<ObjectId>,
        /// New remote head.
        new: ObjectId,
        /// Number of objects sent in the pack.
        objects: usize,
    },
}

/// Pushes a single branch over the smart protocol.
pub struct SmartProtocolClient<T> {
    transport: T,
}

impl<T: Transport> SmartProtocolClient<T> {
    /// Creates a client on top of a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Asks the remote where `ref_name` points; `None` for an empty remote.
    pub fn discover(&self, url: &str, ref_name: &str) -> Result<Option<ObjectId>> {
        let url = url.trim_end_matches('/');
        let body = self
            .transport
            .get(&format!("{}/info/refs?service={}", url, RECEIVE_PACK))?;
        let lines = decode(&body)?;
        let mut lines = lines.iter();

        let announcement = format!("# service={}", RECEIVE_PACK);
        match lines.next() {
            Some(PktLine::Data(data)) if data.as_slice() == announcement.as_bytes() => {}
            other => {
                return Err(GitError::ProtocolViolation(format!(
                    "expected {:?}, got {:?}",
                    announcement, other
                )))
            }
        }
        if !matches!(lines.next(), Some(PktLine::Flush)) {
            return Err(GitError::ProtocolViolation(
                "missing flush after service announcement".to_string(),
            ));
        }

        let data = match lines.next() {
            Some(PktLine::Data(data)) => data,
            // No refs at all
            Some(PktLine::Flush) | None => return Ok(None),
        };
        if data.len() >= HEX_LEN && data[..HEX_LEN].iter().all(|&b| b == b'0') {
            tracing::debug!(url = %url, "remote is empty");
            return Ok(None);
        }

        let advertised = RefAdvertisement::parse(data)?;
        if advertised.name != ref_name {
            return Err(GitError::ProtocolViolation(format!(
                "remote advertises {}, expected {}",
                advertised.name, ref_name
            )));
        }
        tracing::debug!(url = %url, head = %advertised.id, "discovered remote head");
        Ok(Some(advertised.id))
    }

    /// Pushes the current branch of `repo` to `url`.
    ///
    /// Nothing is sent to the remote unless discovery and the object diff
    /// both succeed.
    pub fn push(&self, repo: &Repository, url: &str) -> Result<PushOutcome> {
        let url = url.trim_end_matches('/');
        let ref_name = repo.branch_ref()?;
        let local = repo
            .head()?
            .ok_or_else(|| GitError::NothingToPush(ref_name.clone()))?;

        let remote = self.discover(url, &ref_name)?;
        if remote == Some(local) {
            tracing::info!(url = %url, head = %local, "remote is up to date");
            return Ok(PushOutcome::UpToDate);
        }

        let missing = ObjectGraphWalker::new(&repo.objects).missing(&local, remote.as_ref())?;
        tracing::info!(
            url = %url,
            old = ?remote,
            new = %local,
            objects = missing.len(),
            "pushing"
        );

        let command = Command {
            old_id: remote.unwrap_or(ObjectId::ZERO),
            new_id: local,
            ref_name,
        };
        let pack = PackBuilder::from_store(&repo.objects, &missing)?.build()?;
        let mut body = encode(&[command.payload()])?;
        body.extend_from_slice(&pack);

        let response = self.transport.post(
            &format!("{}/{}", url, RECEIVE_PACK),
            REQUEST_CONTENT_TYPE,
            body,
        )?;
        if let Err(e) = confirm(&response) {
            tracing::warn!(url = %url, error = %e, "push rejected");
            return Err(e);
        }

        Ok(PushOutcome::Pushed {
            old: remote,
            new: local,
            objects: missing.len(),
        })
    }
}

/// Checks a `report-status` response.
///
/// The first line must be `unpack ok`; after that only `ok <ref>` lines
/// and flushes are accepted.
fn confirm(response: &[u8]) -> Result<()> {
    let lines = decode(response)?;
    let mut lines = lines.iter();

    match lines.next() {
        Some(PktLine::Data(data)) if data.as_slice() == UNPACK_OK.as_bytes() => {}
        Some(PktLine::Data(data)) => {
            return Err(GitError::ProtocolViolation(format!(
                "remote did not unpack: {}",
                String::from_utf8_lossy(data)
            )))
        }
        Some(PktLine::Flush) | None => {
            return Err(GitError::ProtocolViolation(
                "empty status report".to_string(),
            ))
        }
    }

    for line in lines {
        let Some(data) = line.data() else {
            continue;
        };
        let text = String::from_utf8_lossy(data);
        if !text.starts_with("ok ") {
            return Err(GitError::ProtocolViolation(format!(
                "remote rejected push: {}",
                text
            )));
        }
    }
    Ok(())
}

/// Pushes the current branch of `repo` over HTTP.
pub fn push(repo: &Repository, url: &str, credentials: Option<Credentials>) -> Result<PushOutcome> {
    SmartProtocolClient::new(HttpTransport::new(credentials)?).push(repo, url)
}
