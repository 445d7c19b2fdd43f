// Shared fixtures for integration tests: temporary git repositories,
// an in-memory database and recording fakes for the pipeline's collaborators
#![allow(dead_code)]

use async_trait::async_trait;
use credsweep::error::{Error, Result};
use credsweep::git::{BranchScope, GitClient};
use credsweep::hosting::ArchiveClient;
use credsweep::model::{Commit, RefUpdate, Task};
use credsweep::notify::Notifier;
use credsweep::queue::TaskQueue;
use credsweep::repository::{CommitLedger, Database};
use credsweep::scanner::Scanner;
use credsweep::sniff::{Classifier, Match, Sniffer, Violation};
use credsweep::util::RepoPaths;
use git2::{Repository, Signature};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const OWNER: &str = "acme";
pub const REPO: &str = "widgets";

/// Create an in-memory test database with schema
pub async fn create_test_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

/// Initialize a repository at `path` with a configured committer
pub fn init_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    let repo = Repository::init(path).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();
    repo
}

/// Create a temporary git repository
pub fn create_test_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = init_repo(&repo_path);
    (dir, repo_path, repo)
}

/// Create a repository at the `<workdir>/acme/widgets` clone location
pub fn create_workdir_repo() -> (TempDir, RepoPaths, Repository) {
    let dir = TempDir::new().unwrap();
    let paths = RepoPaths::new(dir.path());
    let repo = init_repo(&paths.repository_path(OWNER, REPO).unwrap());
    (dir, paths, repo)
}

/// Write files, stage them and commit on top of HEAD
pub fn add_commit(repo: &Repository, files: &[(&str, &[u8])], message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }

    commit_index(repo, &mut index, message)
}

/// Remove a file and commit on top of HEAD
pub fn remove_file_commit(repo: &Repository, path: &str, message: &str) -> git2::Oid {
    let full_path = repo.workdir().unwrap().join(path);
    if full_path.exists() {
        std::fs::remove_file(&full_path).unwrap();
    }
    let mut index = repo.index().unwrap();
    index.remove_path(Path::new(path)).unwrap();
    commit_index(repo, &mut index, message)
}

fn commit_index(repo: &Repository, index: &mut git2::Index, message: &str) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
}

/// Merge commit with the given parents, reusing the first parent's tree
pub fn merge_commit(repo: &Repository, parents: &[git2::Oid], message: &str) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let commits: Vec<git2::Commit<'_>> = parents.iter().map(|id| repo.find_commit(*id).unwrap()).collect();
    let refs: Vec<&git2::Commit<'_>> = commits.iter().collect();
    let tree = commits[0].tree().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &refs).unwrap()
}

/// Short name of the branch HEAD points at (`master` or `main` depending on git config)
pub fn head_branch(repo: &Repository) -> String {
    repo.head().unwrap().shorthand().unwrap().to_string()
}

/// Matches any line containing `SECRET` and counts how often it was asked
#[derive(Default)]
pub struct CountingClassifier {
    calls: AtomicUsize,
}

impl CountingClassifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for CountingClassifier {
    fn classify(&self, content: &str) -> Option<Match> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        content.find("SECRET").map(|start| Match {
            rule: "test-secret".into(),
            start,
            end: start + "SECRET".len(),
        })
    }
}

pub fn counting_sniffer() -> (Sniffer, Arc<CountingClassifier>) {
    let classifier = Arc::new(CountingClassifier::default());
    (Sniffer::new(classifier.clone()), classifier)
}

/// Records every task; optionally fails the nth enqueue (1-based)
#[derive(Default)]
pub struct RecordingQueue {
    tasks: Mutex<Vec<Task>>,
    attempts: AtomicUsize,
    fail_on: Option<usize>,
}

impl RecordingQueue {
    pub fn failing_on(nth: usize) -> Self {
        Self {
            fail_on: Some(nth),
            ..Default::default()
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn enqueue(&self, task: Task) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            return Err(Error::Enqueue("queue unavailable".into()));
        }
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// In-memory ledger; can be told to fail lookups or registrations
#[derive(Default)]
pub struct MemoryLedger {
    commits: Mutex<HashSet<(String, String, String)>>,
    registered: Mutex<Vec<Commit>>,
    fail_lookups: bool,
    fail_registrations: bool,
}

impl MemoryLedger {
    pub fn with_commit(sha: &str) -> Self {
        let ledger = Self::default();
        ledger
            .commits
            .lock()
            .unwrap()
            .insert((OWNER.into(), REPO.into(), sha.into()));
        ledger
    }

    pub fn failing_lookups() -> Self {
        Self {
            fail_lookups: true,
            ..Default::default()
        }
    }

    pub fn failing_registrations() -> Self {
        Self {
            fail_registrations: true,
            ..Default::default()
        }
    }

    pub fn registered(&self) -> Vec<Commit> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitLedger for MemoryLedger {
    async fn is_commit_registered(&self, owner: &str, repository: &str, sha: &str) -> Result<bool> {
        if self.fail_lookups {
            return Err(Error::Registry(sqlx::Error::PoolClosed));
        }
        Ok(self
            .commits
            .lock()
            .unwrap()
            .contains(&(owner.into(), repository.into(), sha.into())))
    }

    async fn register_commit(&self, commit: &Commit) -> Result<()> {
        if self.fail_registrations {
            return Err(Error::Registry(sqlx::Error::PoolClosed));
        }
        self.commits.lock().unwrap().insert((
            commit.owner.clone(),
            commit.repository.clone(),
            commit.sha.clone(),
        ));
        self.registered.lock().unwrap().push(commit.clone());
        Ok(())
    }
}

/// Git facade backed by canned parents and patches
#[derive(Default)]
pub struct FakeGit {
    pub parents: HashMap<String, Vec<String>>,
    pub patches: HashMap<(String, String), String>,
    parent_lookups: AtomicUsize,
}

impl FakeGit {
    pub fn with_parents(sha: &str, parents: &[&str]) -> Self {
        let mut git = Self::default();
        git.parents
            .insert(sha.into(), parents.iter().map(|p| p.to_string()).collect());
        git
    }

    pub fn parent_lookups(&self) -> usize {
        self.parent_lookups.load(Ordering::SeqCst)
    }
}

impl GitClient for FakeGit {
    fn clone_repo(&self, _url: &str, _dest: &Path, _cancel: &CancellationToken) -> Result<()> {
        Err(Error::upstream("clone not supported"))
    }

    fn fetch(&self, _path: &Path, _cancel: &CancellationToken) -> Result<BTreeMap<String, RefUpdate>> {
        Err(Error::upstream("fetch not supported"))
    }

    fn hard_reset(&self, _path: &Path, _commit: &str) -> Result<()> {
        Err(Error::upstream("reset not supported"))
    }

    fn diff(&self, _path: &Path, from: Option<&str>, to: &str) -> Result<String> {
        let key = (from.unwrap_or_default().to_string(), to.to_string());
        self.patches
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::upstream(format!("no diff {}..{}", key.0, key.1)))
    }

    fn branch_targets(&self, _path: &Path) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    fn get_parents(&self, _path: &Path, sha: &str) -> Result<Vec<String>> {
        self.parent_lookups.fetch_add(1, Ordering::SeqCst);
        self.parents
            .get(sha)
            .cloned()
            .ok_or_else(|| Error::upstream(format!("object not found: {}", sha)))
    }

    fn head(&self, _path: &Path) -> Result<String> {
        Err(Error::upstream("head not supported"))
    }

    fn commit_timestamp(&self, _path: &Path, _sha: &str) -> Result<i64> {
        Ok(0)
    }

    fn branch_credential_counts(
        &self,
        _path: &Path,
        _sniffer: &Sniffer,
        _scope: BranchScope,
        _cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, u64>> {
        Ok(BTreeMap::new())
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub repository: String,
    pub git_ref: String,
    pub violation: Violation,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification(&self, repository: &str, git_ref: &str, violation: &Violation) -> Result<()> {
        if self.fail {
            return Err(Error::Notify("delivery failed".into()));
        }
        self.sent.lock().unwrap().push(Notification {
            repository: repository.into(),
            git_ref: git_ref.into(),
            violation: violation.clone(),
        });
        Ok(())
    }
}

/// Write a zip archive holding `files` to `dest`
pub fn write_zip(dest: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(dest).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Serves a fixed archive (or a fixed failure) and remembers where it wrote
#[derive(Default)]
pub struct FakeArchiveClient {
    files: Vec<(String, Vec<u8>)>,
    corrupt: bool,
    unavailable: bool,
    downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeArchiveClient {
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            files: files.iter().map(|(n, c)| (n.to_string(), c.to_vec())).collect(),
            ..Default::default()
        }
    }

    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// `(ref, destination)` of every download
    pub fn downloads(&self) -> Vec<(String, PathBuf)> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveClient for FakeArchiveClient {
    async fn download_archive(
        &self,
        _owner: &str,
        _repository: &str,
        git_ref: &str,
        dest: &Path,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.downloads
            .lock()
            .unwrap()
            .push((git_ref.to_string(), dest.to_path_buf()));
        if self.unavailable {
            return Err(Error::upstream("404 Not Found"));
        }
        if self.corrupt {
            std::fs::write(dest, b"not a zip archive").unwrap();
            return Ok(());
        }
        let files: Vec<(&str, &[u8])> = self.files.iter().map(|(n, c)| (n.as_str(), c.as_slice())).collect();
        write_zip(dest, &files);
        Ok(())
    }
}

/// Records scan requests
#[derive(Default)]
pub struct RecordingScanner {
    scans: Mutex<Vec<(String, String, String)>>,
    cancel_on_scan: Option<CancellationToken>,
}

impl RecordingScanner {
    /// Fires `token` from inside every scan, i.e. while the caller's request is in flight
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_scan: Some(token),
            ..Self::default()
        }
    }

    pub fn scans(&self) -> Vec<(String, String, String)> {
        self.scans.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scanner for RecordingScanner {
    async fn scan(&self, owner: &str, repository: &str, sha: &str) -> Result<()> {
        self.scans
            .lock()
            .unwrap()
            .push((owner.into(), repository.into(), sha.into()));
        if let Some(token) = &self.cancel_on_scan {
            token.cancel();
        }
        Ok(())
    }
}
