//! Tree objects.
//!
//! A tree payload is a concatenation of `"<octal mode> <name>\0<20-byte id>"`
//! records, one per direct child.

use crate::{GitObject, IndexEntry, ObjectId, ObjectStore, ObjectType, Result, StorageError};
use std::collections::{BTreeMap, BTreeSet};

/// Mode git uses for sub-tree entries.
pub const MODE_TREE: u32 = 0o040000;
/// Bits of a mode that identify the entry type.
const MODE_TYPE_MASK: u32 = 0o170000;

/// One child of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// File mode, written in octal without leading zeros.
    pub mode: u32,
    /// Single path component.
    pub name: String,
    /// Id of the blob or sub-tree.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Returns true if this entry points at a sub-tree.
    pub fn is_tree(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_TREE
    }

    /// Git sorts directories as if their name ended in `/`.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.is_tree() {
            key.push(b'/');
        }
        key
    }
}

/// A decoded tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Parses a tree payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| StorageError::CorruptObject {
            id: ObjectId::hash_object(ObjectType::Tree, data).to_hex(),
            reason: reason.to_string(),
        };

        let mut entries = Vec::new();
        let mut pos = 0;
        // Every entry consumes at least 22 bytes, so this bound is never hit
        // by well-formed input.
        for _ in 0..=data.len() {
            let Some(nul) = data[pos..].iter().position(|&b| b == 0) else {
                break;
            };
            let header = std::str::from_utf8(&data[pos..pos + nul])
                .map_err(|_| corrupt("entry header is not utf-8"))?;
            let (mode, name) = header
                .split_once(' ')
                .ok_or_else(|| corrupt("entry header has no space"))?;
            let mode = u32::from_str_radix(mode, 8).map_err(|_| corrupt("mode is not octal"))?;

            let id_start = pos + nul + 1;
            let id_end = id_start + 20;
            if id_end > data.len() {
                return Err(corrupt("entry id is truncated"));
            }
            entries.push(TreeEntry {
                mode,
                name: name.to_string(),
                id: ObjectId::from_slice(&data[id_start..id_end])?,
            });
            pos = id_end;
        }

        Ok(Self { entries })
    }

    /// Encodes the tree payload, entries in the order given.
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for entry in &self.entries {
            data.extend_from_slice(format!("{:o} {}\0", entry.mode, entry.name).as_bytes());
            data.extend_from_slice(entry.id.as_bytes());
        }
        data
    }

    /// Wraps the payload in a tree object.
    pub fn to_object(&self) -> GitObject {
        GitObject::new(ObjectType::Tree, self.serialize())
    }
}

/// Writes the tree (and any sub-trees) described by index entries.
///
/// Paths containing `/` become nested trees.
pub fn write_tree(store: &ObjectStore, entries: &[IndexEntry]) -> Result<ObjectId> {
    let items: Vec<(&str, &IndexEntry)> = entries.iter().map(|e| (e.path.as_str(), e)).collect();
    write_subtree(store, &items)
}

fn write_subtree(store: &ObjectStore, items: &[(&str, &IndexEntry)]) -> Result<ObjectId> {
    let mut tree = Tree::default();
    let mut dirs: BTreeMap<&str, Vec<(&str, &IndexEntry)>> = BTreeMap::new();

    for &(rel, entry) in items {
        match rel.split_once('/') {
            Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, entry)),
            None => tree.entries.push(TreeEntry {
                mode: entry.mode,
                name: rel.to_string(),
                id: entry.id,
            }),
        }
    }
    for (dir, children) in dirs {
        let id = write_subtree(store, &children)?;
        tree.entries.push(TreeEntry {
            mode: MODE_TREE,
            name: dir.to_string(),
            id,
        });
    }

    let mut names = BTreeSet::new();
    for entry in &tree.entries {
        if matches!(entry.name.as_str(), "" | "." | "..") || entry.name.contains('\0') {
            return Err(StorageError::InvalidObject(format!(
                "index path has an invalid component: {:?}",
                entry.name
            )));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(StorageError::InvalidObject(format!(
                "path is both a file and a directory: {}",
                entry.name
            )));
        }
    }
    tree.entries.sort_by_cached_key(TreeEntry::sort_key);

    store.put(&tree.to_object())
}

/// Reads the entries of a stored tree.
pub fn read_tree(store: &ObjectStore, id: &ObjectId) -> Result<Vec<TreeEntry>> {
    let object = store.get(id)?;
    if object.object_type != ObjectType::Tree {
        return Err(StorageError::InvalidObject(format!(
            "{} is a {}, not a tree",
            id, object.object_type
        )));
    }
    Ok(Tree::parse(&object.data)?.entries)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: arbitrary payloads never panic the parser.
        #[test]
        fn prop_parse_no_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = Tree::parse(&data);
        }

        /// Property: parse(serialize(tree)) == tree.
        #[test]
        fn prop_tree_roundtrip(
            items in prop::collection::vec(("[a-zA-Z0-9_. -]{1,20}", any::<[u8; 20]>(), any::<bool>()), 0..16)
        ) {
            let tree = Tree {
                entries: items
                    .into_iter()
                    .map(|(name, id, dir)| TreeEntry {
                        mode: if dir { MODE_TREE } else { 0o100644 },
                        name,
                        id: ObjectId::from_bytes(id),
                    })
                    .collect(),
            };
            prop_assert_eq!(Tree::parse(&tree.serialize()).unwrap(), tree);
        }
    }
}
