//! Reachability over the commit → tree → blob graph.
//!
//! Traversal uses an explicit worklist and a visited set, so deep histories
//! and deep directory nesting never grow the call stack.

use crate::Result;
use gitlite_storage::{read_tree, Commit, ObjectId, ObjectStore, ObjectType, StorageError};
use std::collections::BTreeSet;

/// Computes which objects are reachable from commits and trees.
pub struct ObjectGraphWalker<'a> {
    store: &'a ObjectStore,
}

impl<'a> ObjectGraphWalker<'a> {
    /// Creates a walker over the given store.
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    /// The tree itself plus every blob and sub-tree below it.
    pub fn reachable_from_tree(&self, tree: &ObjectId) -> Result<BTreeSet<ObjectId>> {
        let mut seen = BTreeSet::new();
        self.walk_trees(vec![*tree], &mut seen)?;
        Ok(seen)
    }

    /// The commit, its tree closure, and the same for every ancestor.
    pub fn reachable_from_commit(&self, commit: &ObjectId) -> Result<BTreeSet<ObjectId>> {
        let mut seen = BTreeSet::new();
        let mut commits = vec![*commit];
        let mut trees = Vec::new();

        while let Some(id) = commits.pop() {
            if !seen.insert(id) {
                continue;
            }
            let commit = self.read_commit(&id)?;
            trees.push(commit.tree);
            commits.extend(commit.parents.iter().filter(|p| !seen.contains(*p)));
        }

        self.walk_trees(trees, &mut seen)?;
        tracing::trace!(commit = %commit, objects = seen.len(), "walked commit graph");
        Ok(seen)
    }

    /// Objects reachable from `local` that `remote` does not already have.
    ///
    /// With no remote commit everything reachable from `local` is missing.
    pub fn missing(
        &self,
        local: &ObjectId,
        remote: Option<&ObjectId>,
    ) -> Result<BTreeSet<ObjectId>> {
        let local_set = self.reachable_from_commit(local)?;
        let Some(remote) = remote else {
            return Ok(local_set);
        };
        let remote_set = self.reachable_from_commit(remote)?;
        Ok(local_set.difference(&remote_set).copied().collect())
    }

    fn walk_trees(&self, mut pending: Vec<ObjectId>, seen: &mut BTreeSet<ObjectId>) -> Result<()> {
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            for entry in read_tree(self.store, &id)? {
                if entry.is_tree() {
                    pending.push(entry.id);
                } else {
                    seen.insert(entry.id);
                }
            }
        }
        Ok(())
    }

    fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        let object = self.store.get(id)?;
        if object.object_type != ObjectType::Commit {
            return Err(StorageError::InvalidObject(format!(
                "{} is a {}, not a commit",
                id, object.object_type
            ))
            .into());
        }
        Ok(Commit::parse(&object.data)?)
    }
}
