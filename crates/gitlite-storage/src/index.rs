//! The staging index (`.git/index`).
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! "DIRC" | version (=2) | entry count
//! entries: 62 fixed bytes | path | NUL | zero padding to a multiple of 8
//! SHA-1 of everything above
//! ```

use crate::{ObjectId, Result, StorageError};
use sha1::{Digest, Sha1};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Magic bytes at the start of an index file.
const SIGNATURE: &[u8; 4] = b"DIRC";
/// Index version we read and write.
const VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;
const CHECKSUM_SIZE: usize = 20;
/// Size of the fixed-width part of an entry.
const ENTRY_FIXED_SIZE: usize = 62;
const ENTRY_BLOCK: usize = 8;
/// Path lengths at or above this are stored as 0xFFF in the flags.
const MAX_FLAG_PATH_LEN: usize = 0xFFF;

/// Regular file mode.
pub const MODE_FILE: u32 = 0o100644;
/// Executable file mode.
pub const MODE_EXECUTABLE: u32 = 0o100755;

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_sec: u32,
    pub ctime_nsec: u32,
    pub mtime_sec: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    /// Git file mode, e.g. `0o100644`.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// File size in bytes, truncated to 32 bits.
    pub size: u32,
    /// Blob id of the staged content.
    pub id: ObjectId,
    /// Flags; the low 12 bits hold the path length.
    pub flags: u16,
    /// Path relative to the work tree, `/`-separated.
    pub path: String,
}

impl IndexEntry {
    /// Creates an entry with zeroed stat data.
    pub fn new(path: impl Into<String>, id: ObjectId, mode: u32, size: u32) -> Self {
        let path = path.into();
        Self {
            ctime_sec: 0,
            ctime_nsec: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            size,
            id,
            flags: path.len().min(MAX_FLAG_PATH_LEN) as u16,
            path,
        }
    }

    /// Creates an entry from the file's stat data.
    #[cfg(unix)]
    pub fn from_metadata(path: impl Into<String>, id: ObjectId, meta: &fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let mode = if meta.mode() & 0o111 != 0 {
            MODE_EXECUTABLE
        } else {
            MODE_FILE
        };
        // The on-disk format only has room for 32-bit stat fields.
        Self {
            ctime_sec: meta.ctime() as u32,
            ctime_nsec: meta.ctime_nsec() as u32,
            mtime_sec: meta.mtime() as u32,
            mtime_nsec: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            ..Self::new(path, id, mode, meta.size() as u32)
        }
    }

    /// Creates an entry from the file's stat data.
    #[cfg(not(unix))]
    pub fn from_metadata(path: impl Into<String>, id: ObjectId, meta: &fs::Metadata) -> Self {
        Self::new(path, id, MODE_FILE, meta.len() as u32)
    }

    /// Number of bytes this entry occupies on disk, padding included.
    pub fn encoded_len(&self) -> usize {
        padded_entry_len(self.path.len())
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        for field in [
            self.ctime_sec,
            self.ctime_nsec,
            self.mtime_sec,
            self.mtime_nsec,
            self.dev,
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.size,
        ] {
            out.extend_from_slice(&field.to_be_bytes());
        }
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(self.path.as_bytes());
        // At least one NUL terminates the path; the rest is alignment.
        out.resize(start + self.encoded_len(), 0);
    }

    fn read_from(record: &[u8], path: &[u8]) -> Result<Self> {
        let field = |i: usize| {
            let at = i * 4;
            u32::from_be_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        let path = std::str::from_utf8(path)
            .map_err(|_| StorageError::InvalidObject("index path is not utf-8".to_string()))?;

        Ok(Self {
            ctime_sec: field(0),
            ctime_nsec: field(1),
            mtime_sec: field(2),
            mtime_nsec: field(3),
            dev: field(4),
            ino: field(5),
            mode: field(6),
            uid: field(7),
            gid: field(8),
            size: field(9),
            id: ObjectId::from_slice(&record[40..60])?,
            flags: u16::from_be_bytes([record[60], record[61]]),
            path: path.to_string(),
        })
    }
}

/// On-disk size of an entry whose path is `path_len` bytes long.
fn padded_entry_len(path_len: usize) -> usize {
    (ENTRY_FIXED_SIZE + path_len + 1).div_ceil(ENTRY_BLOCK) * ENTRY_BLOCK
}

/// Reads and writes the index file.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    /// Creates an index store for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the index file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all entries; a missing index file means nothing is staged.
    pub fn load(&self) -> Result<Vec<IndexEntry>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&data)
    }

    /// Replaces the index file with the given entries.
    pub fn save(&self, entries: &[IndexEntry]) -> Result<()> {
        let data = Self::serialize(entries)?;
        let dir = self
            .path
            .parent()
            .ok_or_else(|| StorageError::InvalidObject("index path has no parent".to_string()))?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "wrote index");
        Ok(())
    }

    /// Stages an entry, replacing any existing entry with the same path.
    pub fn stage(&self, entry: IndexEntry) -> Result<()> {
        let mut entries = self.load()?;
        match entries.binary_search_by(|e| e.path.as_bytes().cmp(entry.path.as_bytes())) {
            Ok(pos) => entries[pos] = entry,
            Err(pos) => entries.insert(pos, entry),
        }
        self.save(&entries)
    }

    /// Parses a complete index file.
    pub fn parse(data: &[u8]) -> Result<Vec<IndexEntry>> {
        if data.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(StorageError::TruncatedIndex {
                expected: 0,
                parsed: 0,
            });
        }

        let (body, trailer) = data.split_at(data.len() - CHECKSUM_SIZE);
        let computed = Sha1::digest(body);
        if computed.as_slice() != trailer {
            return Err(StorageError::ChecksumMismatch {
                expected: hex::encode(trailer),
                computed: hex::encode(computed),
            });
        }

        let signature = [body[0], body[1], body[2], body[3]];
        if &signature != SIGNATURE {
            return Err(StorageError::BadSignature(signature));
        }
        let version = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        if version != VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes([body[8], body[9], body[10], body[11]]);

        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;
        // Anything left after `count` entries is an extension we don't read.
        while entries.len() < count as usize && offset + ENTRY_FIXED_SIZE <= body.len() {
            let path_start = offset + ENTRY_FIXED_SIZE;
            let Some(path_len) = body[path_start..].iter().position(|&b| b == 0) else {
                break;
            };
            let record = &body[offset..path_start];
            let path = &body[path_start..path_start + path_len];
            entries.push(IndexEntry::read_from(record, path)?);
            offset += padded_entry_len(path_len);
        }

        if entries.len() != count as usize {
            return Err(StorageError::TruncatedIndex {
                expected: count,
                parsed: entries.len() as u32,
            });
        }
        Ok(entries)
    }

    /// Serializes entries in path order, checksum included.
    ///
    /// Paths are NUL-terminated on disk; a path containing NUL is rejected.
    pub fn serialize(entries: &[IndexEntry]) -> Result<Vec<u8>> {
        if let Some(entry) = entries.iter().find(|e| e.path.contains('\0')) {
            return Err(StorageError::InvalidObject(format!(
                "index path contains a NUL byte: {:?}",
                entry.path
            )));
        }

        let mut sorted: Vec<&IndexEntry> = entries.iter().collect();
        sorted.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));

        let mut out = Vec::with_capacity(
            HEADER_SIZE + CHECKSUM_SIZE + sorted.iter().map(|e| e.encoded_len()).sum::<usize>(),
        );
        out.extend_from_slice(SIGNATURE);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(sorted.len() as u32).to_be_bytes());
        for entry in sorted {
            entry.write_to(&mut out);
        }

        let checksum = Sha1::digest(&out);
        out.extend_from_slice(&checksum);
        Ok(out)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_entry() -> impl Strategy<Value = IndexEntry> {
        (
            "[a-z][a-z0-9_./-]{0,40}",
            any::<[u8; 20]>(),
            any::<[u32; 4]>(),
            any::<u32>(),
        )
            .prop_map(|(path, id, times, size)| IndexEntry {
                ctime_sec: times[0],
                ctime_nsec: times[1],
                mtime_sec: times[2],
                mtime_nsec: times[3],
                ..IndexEntry::new(path, ObjectId::from_bytes(id), MODE_FILE, size)
            })
    }

    proptest! {
        /// Property: load(save(entries)) == entries for path-ordered input.
        #[test]
        fn prop_index_roundtrip(mut entries in prop::collection::vec(arb_entry(), 0..20)) {
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            entries.dedup_by(|a, b| a.path == b.path);

            let parsed = IndexStore::parse(&IndexStore::serialize(&entries).unwrap()).unwrap();
            prop_assert_eq!(parsed, entries);
        }

        /// Property: arbitrary bytes never panic the parser.
        #[test]
        fn prop_parse_no_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = IndexStore::parse(&data);
        }
    }
}
