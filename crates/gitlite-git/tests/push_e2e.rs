//! End-to-end push tests against an in-process receive-pack remote.
//!
//! The fake remote keeps its own on-disk repository, advertises its branch
//! head, unpacks whatever the client sends and moves the ref, just like a
//! real smart HTTP server would.

use chrono::DateTime;
use gitlite_git::{
    Command, GitError, ObjectGraphWalker, PackParser, PktLine, PktLineReader, PktLineWriter,
    PushOutcome, Result, SmartProtocolClient, Transport,
};
use gitlite_storage::{branch_ref, ObjectId, Repository};
use std::cell::{Cell, RefCell};
use std::io::Read;
use tempfile::TempDir;

const URL: &str = "http://remote.test/project.git";

struct FakeRemote {
    _dir: TempDir,
    repo: Repository,
    branch: String,
    reject_with: RefCell<Option<String>>,
    posts: Cell<usize>,
}

impl FakeRemote {
    fn new(branch: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path(), branch).unwrap();
        Self {
            _dir: dir,
            repo,
            branch: branch.to_string(),
            reject_with: RefCell::new(None),
            posts: Cell::new(0),
        }
    }

    fn head(&self) -> Option<ObjectId> {
        self.repo.refs.read(&branch_ref(&self.branch)).unwrap()
    }

    fn advertise_refs(&self) -> Result<Vec<u8>> {
        let mut writer = PktLineWriter::new(Vec::new());
        writer.write_line("# service=git-receive-pack")?;
        writer.flush_pkt()?;
        let first = match self.head() {
            Some(id) => format!("{} {}\0report-status delete-refs", id, branch_ref(&self.branch)),
            None => format!("{} capabilities^{{}}\0report-status delete-refs", ObjectId::ZERO),
        };
        writer.write_line(&first)?;
        writer.flush_pkt()?;
        Ok(writer.into_inner())
    }

    fn receive_pack(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut reader = PktLineReader::new(body);
        let commands = reader
            .read_until_flush()?
            .iter()
            .filter_map(PktLine::data)
            .map(Command::parse)
            .collect::<Result<Vec<_>>>()?;

        let mut pack = Vec::new();
        reader.inner_mut().read_to_end(&mut pack)?;
        PackParser::new(&pack).parse(&self.repo.objects)?;

        let mut writer = PktLineWriter::new(Vec::new());
        writer.write_line("unpack ok")?;
        for cmd in &commands {
            let current = self.repo.refs.read(&cmd.ref_name)?.unwrap_or(ObjectId::ZERO);
            if let Some(reason) = self.reject_with.borrow().as_deref() {
                writer.write_line(&format!("ng {} {}", cmd.ref_name, reason))?;
            } else if current != cmd.old_id {
                writer.write_line(&format!("ng {} fetch first", cmd.ref_name))?;
            } else {
                self.repo.refs.write(&cmd.ref_name, &cmd.new_id)?;
                writer.write_line(&format!("ok {}", cmd.ref_name))?;
            }
        }
        writer.flush_pkt()?;
        Ok(writer.into_inner())
    }
}

impl Transport for &FakeRemote {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        assert_eq!(url, format!("{}/info/refs?service=git-receive-pack", URL));
        self.advertise_refs()
    }

    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        assert_eq!(url, format!("{}/git-receive-pack", URL));
        assert_eq!(content_type, "application/x-git-receive-pack-request");
        self.posts.set(self.posts.get() + 1);
        self.receive_pack(&body)
    }
}

fn commit_file(repo: &Repository, path: &str, content: &str, message: &str) -> ObjectId {
    let full = repo.work_tree().join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(&full, content).unwrap();
    repo.add(path).unwrap();
    let when = DateTime::parse_from_rfc3339("2024-03-04T05:06:07-05:00").unwrap();
    repo.commit_at(message, "tester", when).unwrap()
}

#[test]
fn test_push_history_then_up_to_date() {
    let local_dir = TempDir::new().unwrap();
    let local = Repository::init(local_dir.path(), "master").unwrap();
    commit_file(&local, "README", "hello\n", "first");
    let head = commit_file(&local, "src/lib.rs", "pub fn f() {}\n", "second");

    let remote = FakeRemote::new("master");
    let client = SmartProtocolClient::new(&remote);

    let expected = ObjectGraphWalker::new(&local.objects)
        .reachable_from_commit(&head)
        .unwrap();
    assert_eq!(
        client.push(&local, URL).unwrap(),
        PushOutcome::Pushed {
            old: None,
            new: head,
            objects: expected.len(),
        }
    );
    assert_eq!(remote.head(), Some(head));

    // The remote can walk the full history on its own.
    let on_remote = ObjectGraphWalker::new(&remote.repo.objects)
        .reachable_from_commit(&head)
        .unwrap();
    assert_eq!(on_remote, expected);

    assert_eq!(client.push(&local, URL).unwrap(), PushOutcome::UpToDate);
    assert_eq!(remote.posts.get(), 1);
}

#[test]
fn test_incremental_push() {
    let local_dir = TempDir::new().unwrap();
    let local = Repository::init(local_dir.path(), "master").unwrap();
    let first = commit_file(&local, "a.txt", "a\n", "first");

    let remote = FakeRemote::new("master");
    let client = SmartProtocolClient::new(&remote);
    client.push(&local, URL).unwrap();

    let second = commit_file(&local, "a.txt", "b\n", "second");
    assert_eq!(
        client.push(&local, URL).unwrap(),
        PushOutcome::Pushed {
            old: Some(first),
            new: second,
            objects: 3,
        }
    );
    assert_eq!(remote.head(), Some(second));
    assert_eq!(
        remote.repo.read_commit(&second).unwrap().parents,
        vec![first]
    );
}

#[test]
fn test_remote_on_other_branch() {
    let local_dir = TempDir::new().unwrap();
    let local = Repository::init(local_dir.path(), "master").unwrap();
    commit_file(&local, "a.txt", "a\n", "first");

    let remote = FakeRemote::new("develop");
    let blob = remote.repo.objects.put_blob(b"elsewhere".to_vec()).unwrap();
    remote.repo.refs.write("refs/heads/develop", &blob).unwrap();

    let client = SmartProtocolClient::new(&remote);
    assert!(matches!(
        client.push(&local, URL),
        Err(GitError::ProtocolViolation(_))
    ));
    assert_eq!(remote.posts.get(), 0);
}

#[test]
fn test_rejected_push_keeps_remote_ref() {
    let local_dir = TempDir::new().unwrap();
    let local = Repository::init(local_dir.path(), "master").unwrap();
    let first = commit_file(&local, "a.txt", "a\n", "first");

    let remote = FakeRemote::new("master");
    let client = SmartProtocolClient::new(&remote);
    client.push(&local, URL).unwrap();

    commit_file(&local, "a.txt", "b\n", "second");
    *remote.reject_with.borrow_mut() = Some("pre-receive hook declined".to_string());

    let err = client.push(&local, URL).unwrap_err();
    assert!(matches!(err, GitError::ProtocolViolation(_)));
    assert!(err.to_string().contains("pre-receive hook declined"));
    assert_eq!(remote.head(), Some(first));
}
