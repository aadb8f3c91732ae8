//! Git object storage for Gitlite.
//!
//! This crate provides the on-disk half of a git repository: the loose
//! object database, the binary staging index, tree and commit encoding,
//! and branch references.

mod commit;
mod error;
mod index;
mod object;
mod refs;
mod repository;
mod store;
mod tree;

pub use commit::{Commit, Signature};
pub use error::StorageError;
pub use index::{IndexEntry, IndexStore, MODE_EXECUTABLE, MODE_FILE};
pub use object::{GitObject, ObjectId, ObjectType};
pub use refs::{branch_ref, RefStore, DEFAULT_BRANCH};
pub use repository::{Repository, GIT_DIR_NAME};
pub use store::ObjectStore;
pub use tree::{read_tree, write_tree, Tree, TreeEntry, MODE_TREE};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
