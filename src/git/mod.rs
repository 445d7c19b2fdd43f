//! Repository operations facade
//!
//! Everything the pipeline needs from a local git working copy, behind the
//! [`GitClient`] trait. Calls are blocking; async callers run them on
//! `tokio::task::spawn_blocking`.
//!
//! - **client**: git2-backed implementation
//! - **auth**: SSH key credentials and certificate policy
//! - **walk**: whole-tree credential counting with per-walk blob memoization

mod auth;
mod client;
mod walk;

pub use auth::{CertificateCheck, SshCredentials};
pub use client::Git2Client;
pub use walk::{branch_credential_counts, BlobScanCache, BranchWalkCtx};

use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::RefUpdate;
use crate::sniff::Sniffer;

/// Which branches a whole-tree walk covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchScope {
    Local,
    #[default]
    Remote,
    All,
}

impl BranchScope {
    pub fn includes_local(self) -> bool {
        matches!(self, BranchScope::Local | BranchScope::All)
    }

    pub fn includes_remote(self) -> bool {
        matches!(self, BranchScope::Remote | BranchScope::All)
    }
}

pub trait GitClient: Send + Sync {
    /// Clone `url` into `dest`
    fn clone_repo(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Fetch from `origin`, returning every ref the fetch moved
    fn fetch(&self, path: &Path, cancel: &CancellationToken) -> Result<BTreeMap<String, RefUpdate>>;

    /// Reset the working copy and index to `commit`, discarding local changes
    fn hard_reset(&self, path: &Path, commit: &str) -> Result<()>;

    /// Unified patch text between two commits; `from = None` diffs against the empty tree
    fn diff(&self, path: &Path, from: Option<&str>, to: &str) -> Result<String>;

    /// Branch name -> tip commit for every branch with a direct target
    fn branch_targets(&self, path: &Path) -> Result<BTreeMap<String, String>>;

    /// Parent commit ids, in parent order
    fn get_parents(&self, path: &Path, sha: &str) -> Result<Vec<String>>;

    /// Commit id `HEAD` resolves to
    fn head(&self, path: &Path) -> Result<String>;

    /// Committer time of a commit, seconds since the epoch
    fn commit_timestamp(&self, path: &Path, sha: &str) -> Result<i64>;

    /// Credentials found in the tree of every branch tip in `scope`
    fn branch_credential_counts(
        &self,
        path: &Path,
        sniffer: &Sniffer,
        scope: BranchScope,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, u64>>;
}
