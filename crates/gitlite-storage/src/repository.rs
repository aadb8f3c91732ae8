//! Repository handle tying the object store, index and refs together.

use crate::refs::branch_ref;
use crate::tree::{read_tree, write_tree};
use crate::{
    Commit, IndexEntry, IndexStore, ObjectId, ObjectStore, ObjectType, RefStore, Result,
    Signature, StorageError, TreeEntry,
};
use chrono::{DateTime, FixedOffset, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the git directory inside a work tree.
pub const GIT_DIR_NAME: &str = ".git";

/// A git repository on disk.
///
/// Every component is rooted at the explicit `git_dir`; nothing depends on
/// the process working directory.
#[derive(Debug, Clone)]
pub struct Repository {
    work_tree: PathBuf,
    git_dir: PathBuf,
    /// Object store.
    pub objects: ObjectStore,
    /// Reference store.
    pub refs: RefStore,
    /// Staging index.
    pub index: IndexStore,
}

impl Repository {
    fn at(work_tree: PathBuf, git_dir: PathBuf) -> Self {
        Self {
            objects: ObjectStore::new(git_dir.join("objects")),
            refs: RefStore::new(&git_dir),
            index: IndexStore::new(git_dir.join("index")),
            work_tree,
            git_dir,
        }
    }

    /// Opens the repository whose work tree is `work_tree`.
    pub fn open(work_tree: impl AsRef<Path>) -> Result<Self> {
        let work_tree = work_tree.as_ref().to_path_buf();
        let git_dir = work_tree.join(GIT_DIR_NAME);
        if !git_dir.join("objects").is_dir() {
            return Err(StorageError::NotFound(format!(
                "no repository at {}",
                work_tree.display()
            )));
        }
        Ok(Self::at(work_tree, git_dir))
    }

    /// Creates the git directory skeleton with `HEAD` on `branch`.
    ///
    /// Re-running on an existing repository leaves objects and refs intact.
    pub fn init(work_tree: impl AsRef<Path>, branch: &str) -> Result<Self> {
        let work_tree = work_tree.as_ref().to_path_buf();
        let git_dir = work_tree.join(GIT_DIR_NAME);
        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs").join("heads"))?;

        let repo = Self::at(work_tree, git_dir);
        if !repo.git_dir.join("HEAD").exists() {
            repo.refs.set_head_branch(branch)?;
        }
        tracing::info!(path = %repo.git_dir.display(), branch = %branch, "initialized repository");
        Ok(repo)
    }

    /// Returns the work tree root.
    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Returns the git directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Returns the current branch name.
    pub fn branch(&self) -> Result<String> {
        self.refs.head_branch()
    }

    /// Returns the full ref name of the current branch.
    pub fn branch_ref(&self) -> Result<String> {
        Ok(branch_ref(&self.branch()?))
    }

    /// Returns the commit the current branch points at, if any.
    pub fn head(&self) -> Result<Option<ObjectId>> {
        self.refs.read(&self.branch_ref()?)
    }

    /// Hashes a work-tree file into the store and stages it.
    ///
    /// `path` is relative to the work tree and uses `/` separators.
    pub fn add(&self, path: &str) -> Result<ObjectId> {
        if !is_valid_work_tree_path(path) {
            return Err(StorageError::InvalidObject(format!(
                "path must be relative to the work tree: {:?}",
                path
            )));
        }

        let full = self.work_tree.join(path);
        let content = fs::read(&full)?;
        let meta = fs::metadata(&full)?;
        let id = self.objects.put_blob(content)?;
        self.index
            .stage(IndexEntry::from_metadata(path, id, &meta))?;

        tracing::debug!(path = %path, id = %id, "staged file");
        Ok(id)
    }

    /// Writes a tree object from the current index.
    pub fn write_tree(&self) -> Result<ObjectId> {
        let entries = self.index.load()?;
        write_tree(&self.objects, &entries)
    }

    /// Reads the entries of a tree.
    pub fn read_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>> {
        read_tree(&self.objects, id)
    }

    /// Reads and decodes a commit.
    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        let object = self.objects.get(id)?;
        if object.object_type != ObjectType::Commit {
            return Err(StorageError::InvalidObject(format!(
                "{} is a {}, not a commit",
                id, object.object_type
            )));
        }
        Commit::parse(&object.data)
    }

    /// Commits the index on the current branch, timestamped now.
    pub fn commit(&self, message: &str, author: &str) -> Result<ObjectId> {
        self.commit_at(message, author, Local::now().fixed_offset())
    }

    /// Commits the index on the current branch with an explicit timestamp.
    ///
    /// The branch ref only moves after the tree and commit objects are
    /// stored, so a failure leaves the previous head in place.
    pub fn commit_at(
        &self,
        message: &str,
        author: &str,
        when: DateTime<FixedOffset>,
    ) -> Result<ObjectId> {
        let tree = self.write_tree()?;
        let branch_ref = self.branch_ref()?;
        let parent = self.refs.read(&branch_ref)?;

        let signature = Signature::new(author, when);
        let commit = Commit {
            tree,
            parents: parent.into_iter().collect(),
            author: signature.clone(),
            committer: signature,
            message: message.to_string(),
        };
        let id = self.objects.put(&commit.to_object())?;
        self.refs.write(&branch_ref, &id)?;

        tracing::info!(
            id = %id,
            tree = %tree,
            parent = ?parent,
            branch = %branch_ref,
            "created commit"
        );
        Ok(id)
    }
}

/// A staged path is `/`-separated, relative, and in canonical form: no
/// empty, `.` or `..` components, no NUL, and nothing inside the git dir.
fn is_valid_work_tree_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\0')
        && path.split('/').all(|part| {
            !matches!(part, "" | "." | "..") && !part.eq_ignore_ascii_case(GIT_DIR_NAME)
        })
}
