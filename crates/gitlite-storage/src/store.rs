//! Loose object database.
//!
//! Objects live at `<root>/<first two hex>/<remaining 38 hex>`, each file
//! holding the zlib-compressed `"<kind> <len>\0<payload>"` encoding.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Minimum number of hex characters accepted as an object prefix.
const MIN_PREFIX_LEN: usize = 2;

/// Content-addressed object store backed by a `objects/` directory.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Creates a store rooted at the given `objects` directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the `objects` directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Stores an object and returns its ID.
    ///
    /// Writing an object that already exists is a no-op. New objects are
    /// written to a temporary file in the bucket directory and renamed into
    /// place, so readers never observe a partial file.
    pub fn put(&self, object: &GitObject) -> Result<ObjectId> {
        let id = object.id;
        let path = self.object_path(&id);
        if path.exists() {
            tracing::trace!(id = %id, "object already stored");
            return Ok(id);
        }

        let bucket = path
            .parent()
            .ok_or_else(|| StorageError::InvalidObject(format!("no bucket for {}", id)))?;
        fs::create_dir_all(bucket)?;

        let compressed = Self::compress(object)?;
        let mut tmp = NamedTempFile::new_in(bucket)?;
        tmp.write_all(&compressed)?;
        tmp.as_file().sync_all()?;

        // Losing the race to a concurrent writer is fine: the bytes are identical.
        if let Err(e) = tmp.persist_noclobber(&path) {
            if e.error.kind() != ErrorKind::AlreadyExists {
                return Err(e.error.into());
            }
        }

        tracing::debug!(id = %id, kind = %object.object_type, size = object.size(), "stored object");
        Ok(id)
    }

    /// Stores a blob and returns its ID.
    pub fn put_blob(&self, content: impl Into<Bytes>) -> Result<ObjectId> {
        self.put(&GitObject::blob(content))
    }

    /// Checks if an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Retrieves an object by its full ID.
    ///
    /// The content must hash back to `id`, otherwise the object is corrupt.
    pub fn get(&self, id: &ObjectId) -> Result<GitObject> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.to_hex()))
            }
            Err(e) => return Err(e.into()),
        };
        let object = Self::decompress(&id.to_hex(), &compressed)?;
        if object.id != *id {
            return Err(StorageError::CorruptObject {
                id: id.to_hex(),
                reason: format!("content hashes to {}", object.id),
            });
        }
        Ok(object)
    }

    /// Retrieves an object by a hex prefix of at least two characters.
    pub fn get_by_prefix(&self, prefix: &str) -> Result<GitObject> {
        let id = self.resolve_prefix(prefix)?;
        self.get(&id)
    }

    /// Expands a hex prefix to the single object ID it names.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < MIN_PREFIX_LEN || prefix.len() > 40 {
            return Err(StorageError::InvalidObject(format!(
                "object prefix must be 2 to 40 hex characters: {:?}",
                prefix
            )));
        }
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidObject(format!(
                "object prefix is not hex: {:?}",
                prefix
            )));
        }

        let (bucket, rest) = prefix.split_at(2);
        let entries = match fs::read_dir(self.root.join(bucket)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(prefix))
            }
            Err(e) => return Err(e.into()),
        };

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Skips leftover temporary files, which never look like hex.
            if name.len() == 38 && name.starts_with(rest) {
                if let Ok(id) = ObjectId::from_hex(&format!("{}{}", bucket, name)) {
                    matches.push(id);
                }
            }
        }

        match matches.len() {
            0 => Err(StorageError::NotFound(prefix)),
            1 => Ok(matches[0]),
            n => Err(StorageError::AmbiguousPrefix { prefix, matches: n }),
        }
    }

    /// Compresses the loose encoding of an object using zlib.
    pub fn compress(object: &GitObject) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&object.to_loose_bytes())?;
        Ok(encoder.finish()?)
    }

    /// Decompresses and validates a loose object.
    ///
    /// `name` is only used to label errors.
    pub fn decompress(name: &str, compressed: &[u8]) -> Result<GitObject> {
        let corrupt = |reason: String| StorageError::CorruptObject {
            id: name.to_string(),
            reason,
        };

        let mut decoder = ZlibDecoder::new(compressed);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| corrupt(format!("zlib: {}", e)))?;

        // Parse header: "type size\0data"
        let null_pos = decompressed
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("missing null byte in header".to_string()))?;

        let header = std::str::from_utf8(&decompressed[..null_pos])
            .map_err(|_| corrupt("header is not utf-8".to_string()))?;
        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| corrupt(format!("invalid header: {:?}", header)))?;

        let object_type = ObjectType::parse(kind).map_err(|e| corrupt(e.to_string()))?;
        let size: usize = size
            .parse()
            .map_err(|_| corrupt(format!("invalid size: {:?}", size)))?;

        let data = &decompressed[null_pos + 1..];
        if data.len() != size {
            return Err(corrupt(format!(
                "header declares {} bytes, payload has {}",
                size,
                data.len()
            )));
        }

        Ok(GitObject::new(object_type, Bytes::copy_from_slice(data)))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn kind() -> impl Strategy<Value = ObjectType> {
        prop_oneof![
            Just(ObjectType::Blob),
            Just(ObjectType::Tree),
            Just(ObjectType::Commit),
        ]
    }

    proptest! {
        /// Property: whatever goes in comes back out unchanged.
        #[test]
        fn prop_put_get_roundtrip(kind in kind(), data in prop::collection::vec(any::<u8>(), 0..4096)) {
            let dir = tempfile::TempDir::new().unwrap();
            let store = ObjectStore::new(dir.path());
            let object = GitObject::new(kind, data.clone());

            let id = store.put(&object).unwrap();
            prop_assert_eq!(store.put(&object).unwrap(), id);

            let back = store.get(&id).unwrap();
            prop_assert_eq!(back.object_type, kind);
            prop_assert_eq!(back.data.as_ref(), data.as_slice());
        }
    }
}
