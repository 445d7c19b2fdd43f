use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, DiffOptions, FetchOptions, Oid, Patch, Repository, ResetType};
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::RefUpdate;
use crate::sniff::Sniffer;
use crate::util::is_zero_sha;

use super::auth::{remote_callbacks, CertificateCheck, SshCredentials};
use super::walk::branch_credential_counts;
use super::{BranchScope, GitClient};

const DEFAULT_REMOTE: &str = "origin";

/// git2-backed facade.
///
/// Every call opens its own `Repository` handle and drops it (and every
/// commit, tree and patch looked up through it) before returning.
#[derive(Debug, Clone, Default)]
pub struct Git2Client {
    credentials: SshCredentials,
    certificates: CertificateCheck,
}

impl Git2Client {
    pub fn new(credentials: SshCredentials, certificates: CertificateCheck) -> Self {
        Self { credentials, certificates }
    }

    fn fetch_options<'a>(&'a self, cancel: &'a CancellationToken) -> FetchOptions<'a> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(remote_callbacks(&self.credentials, &self.certificates, cancel));
        options.update_fetchhead(true);
        options
    }
}

fn parse_oid(sha: &str) -> Result<Oid> {
    Oid::from_str(sha).map_err(|e| Error::upstream(format!("invalid commit id {}: {}", sha, e.message())))
}

/// Map a transfer aborted by our progress callback to `Cancelled`
fn transfer_error(err: git2::Error, cancel: &CancellationToken) -> Error {
    if cancel.is_cancelled() {
        Error::Cancelled
    } else {
        err.into()
    }
}

fn commit_tree<'r>(repo: &'r Repository, sha: &str) -> Result<git2::Tree<'r>> {
    let commit = repo.find_commit(parse_oid(sha)?)?;
    Ok(commit.tree()?)
}

impl GitClient for Git2Client {
    fn clone_repo(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<()> {
        info!(url = %url, path = ?dest, "cloning repository");
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options(cancel));
        builder
            .clone(url, dest)
            .map_err(|e| transfer_error(e, cancel))?;

        debug!(path = ?dest, "clone completed");
        Ok(())
    }

    fn fetch(&self, path: &Path, cancel: &CancellationToken) -> Result<BTreeMap<String, RefUpdate>> {
        let repo = Repository::open(path)?;
        let mut remote = repo.find_remote(DEFAULT_REMOTE)?;

        let mut changes = BTreeMap::new();
        {
            let mut callbacks = remote_callbacks(&self.credentials, &self.certificates, cancel);
            callbacks.update_tips(|refname, old, new| {
                changes.insert(
                    refname.to_string(),
                    RefUpdate { old: old.to_string(), new: new.to_string() },
                );
                true
            });

            let mut options = FetchOptions::new();
            options.remote_callbacks(callbacks);
            options.update_fetchhead(true);

            remote
                .fetch::<&str>(&[], Some(&mut options), None)
                .map_err(|e| transfer_error(e, cancel))?;
        }

        debug!(path = ?path, refs = changes.len(), "fetch completed");
        Ok(changes)
    }

    fn hard_reset(&self, path: &Path, commit: &str) -> Result<()> {
        let repo = Repository::open(path)?;
        let commit = repo.find_commit(parse_oid(commit)?)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;
        Ok(())
    }

    fn diff(&self, path: &Path, from: Option<&str>, to: &str) -> Result<String> {
        let repo = Repository::open(path)?;

        let from_tree = match from {
            Some(sha) if !is_zero_sha(sha) => Some(commit_tree(&repo, sha)?),
            _ => None,
        };
        let to_tree = commit_tree(&repo, to)?;

        let mut options = DiffOptions::new();
        let diff = repo.diff_tree_to_tree(from_tree.as_ref(), Some(&to_tree), Some(&mut options))?;

        let mut patches = Vec::with_capacity(diff.deltas().len());
        for idx in 0..diff.deltas().len() {
            if let Some(mut patch) = Patch::from_diff(&diff, idx)? {
                let buf = patch.to_buf()?;
                patches.push(String::from_utf8_lossy(&buf).into_owned());
            }
        }

        Ok(patches.join("\n"))
    }

    fn branch_targets(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let repo = Repository::open(path)?;
        let mut targets = BTreeMap::new();

        for branch in repo.branches(None)? {
            let (branch, _kind): (git2::Branch<'_>, BranchType) = branch?;
            // Symbolic refs such as origin/HEAD have no direct target
            let Some(target) = branch.get().target() else {
                continue;
            };
            if let Some(name) = branch.name()? {
                targets.insert(name.to_string(), target.to_string());
            }
        }

        Ok(targets)
    }

    fn get_parents(&self, path: &Path, sha: &str) -> Result<Vec<String>> {
        let repo = Repository::open(path)?;
        let commit = repo.find_commit(parse_oid(sha)?)?;
        Ok(commit.parent_ids().map(|id| id.to_string()).collect())
    }

    fn head(&self, path: &Path) -> Result<String> {
        let repo = Repository::open(path)?;
        let head = repo.head()?.peel_to_commit()?;
        Ok(head.id().to_string())
    }

    fn commit_timestamp(&self, path: &Path, sha: &str) -> Result<i64> {
        let repo = Repository::open(path)?;
        let commit = repo.find_commit(parse_oid(sha)?)?;
        Ok(commit.time().seconds())
    }

    fn branch_credential_counts(
        &self,
        path: &Path,
        sniffer: &Sniffer,
        scope: BranchScope,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, u64>> {
        branch_credential_counts(path, sniffer, scope, cancel)
    }
}
