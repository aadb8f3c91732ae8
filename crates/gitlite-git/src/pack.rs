//! Git pack file format implementation.
//!
//! Pack files are the format used by git for efficient object transfer.
//! Objects are stored whole; deltas are never produced or accepted.
//! See: https://git-scm.com/docs/pack-format

use crate::{GitError, Result};
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use gitlite_storage::{GitObject, ObjectId, ObjectStore, ObjectType};
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack file version we support.
const PACK_VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;
const CHECKSUM_SIZE: usize = 20;

/// Builds a pack file from a set of objects.
pub struct PackBuilder {
    objects: Vec<GitObject>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Creates a builder holding the given objects from the store.
    pub fn from_store<'a>(
        store: &ObjectStore,
        ids: impl IntoIterator<Item = &'a ObjectId>,
    ) -> Result<Self> {
        let mut builder = Self::new();
        for id in ids {
            builder.add_from_store(store, id)?;
        }
        Ok(builder)
    }

    /// Adds an object to the pack.
    pub fn add(&mut self, object: GitObject) {
        self.objects.push(object);
    }

    /// Adds an object from the store by ID.
    pub fn add_from_store(&mut self, store: &ObjectStore, id: &ObjectId) -> Result<()> {
        let object = store.get(id)?;
        self.objects.push(object);
        Ok(())
    }

    /// Returns the number of objects added so far.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if no objects have been added.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Builds the pack file, objects ordered by ascending id.
    pub fn build(mut self) -> Result<Vec<u8>> {
        self.objects.sort_by_key(|o| o.id);
        self.objects.dedup_by_key(|o| o.id);

        let mut pack = Vec::new();

        // Write header
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.objects.len() as u32).to_be_bytes());

        // Write objects
        for object in &self.objects {
            Self::write_object(&mut pack, object)?;
        }

        // Compute and append checksum
        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);

        tracing::debug!(objects = self.objects.len(), bytes = pack.len(), "built pack");
        Ok(pack)
    }

    /// Writes a single object entry.
    fn write_object(pack: &mut Vec<u8>, object: &GitObject) -> Result<()> {
        let obj_type = object.object_type.pack_type();
        let size = object.data.len();

        // First byte: (MSB=more bytes) (3 bits type) (4 bits size)
        let mut first_byte = (obj_type << 4) | ((size & 0x0F) as u8);
        let mut remaining_size = size >> 4;

        if remaining_size > 0 {
            first_byte |= 0x80; // More bytes follow
        }
        pack.push(first_byte);

        // Additional size bytes (7 bits each, MSB=continue)
        while remaining_size > 0 {
            let mut byte = (remaining_size & 0x7F) as u8;
            remaining_size >>= 7;
            if remaining_size > 0 {
                byte |= 0x80;
            }
            pack.push(byte);
        }

        // Compress and write data
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&object.data)
            .map_err(|e| GitError::InvalidPack(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| GitError::InvalidPack(e.to_string()))?;
        pack.extend_from_slice(&compressed);

        Ok(())
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a pack file and extracts objects.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Parses the pack file and stores its objects.
    pub fn parse(&mut self, store: &ObjectStore) -> Result<Vec<ObjectId>> {
        let objects = self.parse_objects()?;
        objects
            .iter()
            .map(|object| Ok(store.put(object)?))
            .collect()
    }

    /// Parses the pack file into objects without storing them.
    pub fn parse_objects(&mut self) -> Result<Vec<GitObject>> {
        if self.data.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(GitError::InvalidPack("pack too small".to_string()));
        }

        if &self.data[0..4] != PACK_SIGNATURE {
            return Err(GitError::InvalidPack("invalid signature".to_string()));
        }

        let version = u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if version != PACK_VERSION {
            return Err(GitError::InvalidPack(format!(
                "unsupported version: {}",
                version
            )));
        }

        let object_count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]) as usize;

        // Verify checksum (last 20 bytes) before trusting the body
        let checksum_start = self.data.len() - CHECKSUM_SIZE;
        let computed = Sha1::digest(&self.data[..checksum_start]);
        if computed.as_slice() != &self.data[checksum_start..] {
            return Err(GitError::InvalidPack("checksum mismatch".to_string()));
        }

        self.pos = HEADER_SIZE;

        // Each entry takes at least a header byte and a small zlib stream.
        let mut objects = Vec::with_capacity(object_count.min(checksum_start / 2));
        for _ in 0..object_count {
            objects.push(self.parse_object(checksum_start)?);
        }

        if self.pos != checksum_start {
            return Err(GitError::InvalidPack(format!(
                "{} trailing bytes after last object",
                checksum_start - self.pos
            )));
        }

        Ok(objects)
    }

    /// Parses a single object.
    fn parse_object(&mut self, end: usize) -> Result<GitObject> {
        if self.pos >= end {
            return Err(GitError::InvalidPack("unexpected end of pack".to_string()));
        }

        // Read type and size
        let first_byte = self.data[self.pos];
        self.pos += 1;

        let obj_type_code = (first_byte >> 4) & 0x07;
        let mut size = (first_byte & 0x0F) as usize;
        let mut shift = 4;

        // Read remaining size bytes
        if first_byte & 0x80 != 0 {
            loop {
                if self.pos >= end {
                    return Err(GitError::InvalidPack("unexpected end in size".to_string()));
                }
                if shift > usize::BITS - 7 {
                    return Err(GitError::InvalidPack("object size overflows".to_string()));
                }
                let byte = self.data[self.pos];
                self.pos += 1;
                size |= ((byte & 0x7F) as usize) << shift;
                shift += 7;
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        let object_type = ObjectType::from_pack_type(obj_type_code)
            .map_err(|e| GitError::InvalidPack(e.to_string()))?;

        // Decompress data
        let mut decoder = ZlibDecoder::new(&self.data[self.pos..end]);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| GitError::InvalidPack(format!("decompression failed: {}", e)))?;

        if decompressed.len() != size {
            return Err(GitError::InvalidPack(format!(
                "object declares {} bytes, inflated to {}",
                size,
                decompressed.len()
            )));
        }

        // Update position based on how much was consumed
        self.pos += decoder.total_in() as usize;

        Ok(GitObject::new(object_type, decompressed))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: Pack roundtrip preserves blob content
        #[test]
        fn prop_pack_roundtrip_blob(data in prop::collection::vec(any::<u8>(), 0..10000)) {
            let blob = GitObject::blob(data.clone());
            let id = blob.id;

            let mut builder = PackBuilder::new();
            builder.add(blob);
            let pack = builder.build().unwrap();

            let objects = PackParser::new(&pack).parse_objects().unwrap();
            prop_assert_eq!(objects.len(), 1);
            prop_assert_eq!(objects[0].id, id);
            prop_assert_eq!(objects[0].data.as_ref(), data.as_slice());
        }

        /// Property: Invalid pack data doesn't panic
        #[test]
        fn prop_invalid_pack_no_panic(data in prop::collection::vec(any::<u8>(), 0..1000)) {
            let _ = PackParser::new(&data).parse_objects();
        }

        /// Property: Corrupted checksum is detected
        #[test]
        fn prop_corrupted_checksum_detected(
            content in prop::collection::vec(any::<u8>(), 1..1000),
            corrupt_byte in 0u8..20
        ) {
            let mut builder = PackBuilder::new();
            builder.add(GitObject::blob(content));
            let mut pack = builder.build().unwrap();

            let len = pack.len();
            pack[len - 1 - (corrupt_byte as usize % 20)] ^= 0xFF;
            prop_assert!(PackParser::new(&pack).parse_objects().is_err());
        }
    }
}
