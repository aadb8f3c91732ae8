//! CLI command implementations.

use crate::config::Config;
use gitlite_git::{GitError, HttpTransport, PushOutcome, SmartProtocolClient};
use gitlite_storage::{
    Commit, GitObject, ObjectId, ObjectType, Repository, StorageError, Tree, TreeEntry,
};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("no remote configured: pass a URL, set GITLITE_REMOTE, or add [remote] url")]
    NoRemote,

    #[error("{0} is a {1}, expected a tree or commit")]
    NotATree(ObjectId, ObjectType),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// What `cat-file` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatMode {
    /// Object type.
    Type,
    /// Payload size in bytes.
    Size,
    /// Payload, trees rendered one entry per line.
    Pretty,
}

/// Initialize a new repository.
pub fn init(work_tree: &Path, branch: &str, out: &mut impl Write) -> Result<()> {
    std::fs::create_dir_all(work_tree)?;
    let repo = Repository::init(work_tree, branch)?;
    writeln!(
        out,
        "Initialized empty Gitlite repository in {}",
        repo.git_dir().display()
    )?;
    Ok(())
}

/// Hash a file as a blob, optionally writing it to the object store.
pub fn hash_object(work_tree: &Path, file: &Path, write: bool, out: &mut impl Write) -> Result<()> {
    let content = std::fs::read(file)?;
    let id = if write {
        Repository::open(work_tree)?.objects.put_blob(content)?
    } else {
        ObjectId::hash_object(ObjectType::Blob, &content)
    };
    writeln!(out, "{}", id)?;
    Ok(())
}

/// Show an object named by a hex prefix.
pub fn cat_file(work_tree: &Path, prefix: &str, mode: CatMode, out: &mut impl Write) -> Result<()> {
    let repo = Repository::open(work_tree)?;
    let object = repo.objects.get_by_prefix(prefix)?;
    match mode {
        CatMode::Type => writeln!(out, "{}", object.object_type)?,
        CatMode::Size => writeln!(out, "{}", object.size())?,
        CatMode::Pretty if object.object_type == ObjectType::Tree => {
            print_entries(&Tree::parse(&object.data)?.entries, out)?;
        }
        CatMode::Pretty => out.write_all(&object.data)?,
    }
    Ok(())
}

/// Stage files.
pub fn add(work_tree: &Path, paths: &[String], out: &mut impl Write) -> Result<()> {
    let repo = Repository::open(work_tree)?;
    for path in paths {
        let relative = path.strip_prefix("./").unwrap_or(path);
        let id = repo.add(relative)?;
        writeln!(out, "add '{}' ({})", relative, &id.to_hex()[..7])?;
    }
    Ok(())
}

/// Write the index as a tree and print its id.
pub fn write_tree(work_tree: &Path, out: &mut impl Write) -> Result<()> {
    let repo = Repository::open(work_tree)?;
    writeln!(out, "{}", repo.write_tree()?)?;
    Ok(())
}

/// List a tree, or the tree of a commit.
pub fn ls_tree(work_tree: &Path, prefix: &str, out: &mut impl Write) -> Result<()> {
    let repo = Repository::open(work_tree)?;
    let object = repo.objects.get_by_prefix(prefix)?;
    let tree = tree_of(&object)?;
    print_entries(&repo.read_tree(&tree)?, out)?;
    Ok(())
}

/// Commit the index on the current branch.
pub fn commit(work_tree: &Path, message: &str, config: &Config, out: &mut impl Write) -> Result<()> {
    let repo = Repository::open(work_tree)?;
    let is_root = repo.head()?.is_none();
    let id = repo.commit(message, &config.user.author())?;

    let summary = message.lines().next().unwrap_or_default();
    let root = if is_root { " (root-commit)" } else { "" };
    writeln!(
        out,
        "[{}{} {}] {}",
        repo.branch()?,
        root,
        &id.to_hex()[..7],
        summary
    )?;
    Ok(())
}

/// Push the current branch.
pub fn push(
    work_tree: &Path,
    url: Option<&str>,
    config: &Config,
    out: &mut impl Write,
) -> Result<()> {
    let url = url
        .or(config.remote.url.as_deref())
        .ok_or(CliError::NoRemote)?;
    let repo = Repository::open(work_tree)?;

    let transport = HttpTransport::with_options(
        config.remote.credentials(),
        &config.remote.user_agent,
        config.remote.timeout(),
    )?;
    let client = SmartProtocolClient::new(transport);

    match client.push(&repo, url)? {
        PushOutcome::UpToDate => writeln!(out, "Everything up-to-date")?,
        PushOutcome::Pushed { old, new, objects } => {
            let old = match old {
                Some(id) => id.to_hex()[..7].to_string(),
                None => "[new branch]".to_string(),
            };
            writeln!(out, "To {}", url)?;
            writeln!(
                out,
                "   {}..{}  {} ({} objects)",
                old,
                &new.to_hex()[..7],
                repo.branch()?,
                objects
            )?;
        }
    }
    Ok(())
}

fn tree_of(object: &GitObject) -> Result<ObjectId> {
    match object.object_type {
        ObjectType::Tree => Ok(object.id),
        ObjectType::Commit => Ok(Commit::parse(&object.data)?.tree),
        ObjectType::Blob => Err(CliError::NotATree(object.id, object.object_type)),
    }
}

fn print_entries(entries: &[TreeEntry], out: &mut impl Write) -> std::io::Result<()> {
    for entry in entries {
        let kind = if entry.is_tree() {
            ObjectType::Tree
        } else {
            ObjectType::Blob
        };
        writeln!(out, "{:06o} {} {}\t{}", entry.mode, kind, entry.id, entry.name)?;
    }
    Ok(())
}
