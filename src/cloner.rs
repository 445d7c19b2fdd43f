//! Clone and refresh worker
//!
//! The cloner is the only writer of local working copies. Clone and refresh
//! requests for every repository arrive on one channel and are handled one
//! at a time, so two operations never touch the same clone concurrently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::git::{BranchScope, GitClient};
use crate::metrics::Metrics;
use crate::model::FetchRecord;
use crate::repository::RepositoryStore;
use crate::scanner::Scanner;
use crate::sniff::Sniffer;
use crate::util::{is_zero_sha, short_sha, RepoPaths};

const REMOTE_PREFIX: &str = "origin/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkRequest {
    /// First clone of a discovered repository
    Clone {
        owner: String,
        repository: String,
        url: String,
    },
    /// Fetch an existing clone and scan whatever moved
    Refresh { owner: String, repository: String },
}

impl WorkRequest {
    pub fn owner(&self) -> &str {
        match self {
            WorkRequest::Clone { owner, .. } | WorkRequest::Refresh { owner, .. } => owner,
        }
    }

    pub fn repository(&self) -> &str {
        match self {
            WorkRequest::Clone { repository, .. } | WorkRequest::Refresh { repository, .. } => repository,
        }
    }
}

pub struct Cloner {
    git: Arc<dyn GitClient>,
    store: Arc<dyn RepositoryStore>,
    scanner: Arc<dyn Scanner>,
    sniffer: Sniffer,
    paths: RepoPaths,
    metrics: Arc<Metrics>,
    scope: BranchScope,
    abort: CancellationToken,
}

impl Cloner {
    pub fn new(
        git: Arc<dyn GitClient>,
        store: Arc<dyn RepositoryStore>,
        scanner: Arc<dyn Scanner>,
        sniffer: Sniffer,
        paths: RepoPaths,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            git,
            store,
            scanner,
            sniffer,
            paths,
            metrics,
            scope: BranchScope::default(),
            abort: CancellationToken::new(),
        }
    }

    /// Branches covered by the whole-tree credential count
    pub fn with_scope(mut self, scope: BranchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Token that interrupts an in-flight clone, fetch or tree walk.
    /// Separate from the shutdown signal passed to [`Cloner::run`], which
    /// lets the current request finish.
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Handle requests until `shutdown` fires or every sender is gone.
    pub async fn run(self, mut requests: mpsc::Receiver<WorkRequest>, shutdown: CancellationToken) {
        info!("cloner started");
        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.handle(request).await;
        }
        info!("cloner stopped");
    }

    pub async fn handle(&self, request: WorkRequest) {
        let result = match &request {
            WorkRequest::Clone { owner, repository, url } => self.clone_repository(owner, repository, url).await,
            WorkRequest::Refresh { owner, repository } => self.refresh_repository(owner, repository).await,
        };
        if let Err(e) = result {
            error!(owner = %request.owner(), repository = %request.repository(), error = %e, "work request failed");
        }
    }

    #[instrument(skip_all, fields(owner = %owner, repository = %repository))]
    async fn clone_repository(&self, owner: &str, repository: &str, url: &str) -> Result<()> {
        if let Some(record) = self.store.find(owner, repository).await? {
            if record.cloned {
                debug!("already cloned, skipping");
                return Ok(());
            }
        }
        let dest = self.paths.repository_path(owner, repository)?;
        // Never delete a directory this call did not create
        let preexisting = tokio::fs::try_exists(&dest).await?;

        let git = self.git.clone();
        let clone_url = url.to_string();
        let clone_dest = dest.clone();
        let abort = self.abort.clone();
        let cloned = tokio::task::spawn_blocking(move || git.clone_repo(&clone_url, &clone_dest, &abort))
            .await
            .map_err(Error::from)
            .and_then(|result| result);

        if let Err(e) = cloned {
            self.metrics.clone_failed.inc();
            if !preexisting {
                remove_partial_clone(&dest).await;
            }
            if let Err(store_err) = self.store.register_failed_fetch(owner, repository).await {
                warn!(error = %store_err, "failed to record clone failure");
            }
            return Err(e);
        }
        self.metrics.clone_success.inc();

        let path = dest.to_string_lossy().into_owned();
        self.store.mark_as_cloned(owner, repository, &path).await?;
        info!(path = %path, "repository cloned");

        let git = self.git.clone();
        let head_path = dest.clone();
        let head = tokio::task::spawn_blocking(move || git.head(&head_path)).await??;
        self.trigger_scan(owner, repository, &head).await;

        self.update_credential_counts(owner, repository, &dest).await;
        Ok(())
    }

    #[instrument(skip_all, fields(owner = %owner, repository = %repository))]
    async fn refresh_repository(&self, owner: &str, repository: &str) -> Result<()> {
        let Some(record) = self.store.find(owner, repository).await? else {
            warn!("refresh requested for unknown repository");
            return Ok(());
        };
        if !record.cloned {
            warn!("refresh requested before clone");
            return Ok(());
        }
        let dest = self.paths.repository_path(owner, repository)?;

        let git = self.git.clone();
        let fetch_path = dest.clone();
        let abort = self.abort.clone();
        let fetched = tokio::task::spawn_blocking(move || git.fetch(&fetch_path, &abort))
            .await
            .map_err(Error::from)
            .and_then(|result| result);

        let changes = match fetched {
            Ok(changes) => changes,
            Err(e) => {
                self.store.register_failed_fetch(owner, repository).await?;
                return Err(e);
            }
        };

        for (refname, update) in &changes {
            if is_zero_sha(&update.new) {
                debug!(refname = %refname, "ref deleted");
                continue;
            }
            // Tags may point at tag objects rather than commits
            if !is_branch_ref(refname) {
                debug!(refname = %refname, "skipping non-branch ref");
                continue;
            }
            debug!(refname = %refname, old = short_sha(&update.old), new = short_sha(&update.new), "ref moved");
            self.trigger_scan(owner, repository, &update.new).await;
        }

        if !changes.is_empty() {
            self.reset_to_default_branch(&dest, &record.default_branch).await?;
            self.update_credential_counts(owner, repository, &dest).await;
        }

        let fetch = FetchRecord {
            path: dest.to_string_lossy().into_owned(),
            changes,
        };
        self.store.register_fetch(owner, repository, &fetch).await?;
        info!(refs = fetch.changes.len(), "repository refreshed");
        Ok(())
    }

    async fn trigger_scan(&self, owner: &str, repository: &str, sha: &str) {
        match self.scanner.scan(owner, repository, sha).await {
            Ok(()) => self.metrics.scan_success.inc(),
            Err(e) => {
                self.metrics.scan_failed.inc();
                error!(owner = %owner, repository = %repository, sha = %sha, error = %e, "failed to start scan");
            }
        }
    }

    /// Move the working copy to the remote tip of the default branch
    async fn reset_to_default_branch(&self, dest: &Path, default_branch: &str) -> Result<()> {
        let git = self.git.clone();
        let path = dest.to_path_buf();
        let branch = default_branch.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let targets = git.branch_targets(&path)?;
            let remote = format!("{}{}", REMOTE_PREFIX, branch);
            let Some(tip) = targets.get(&remote).or_else(|| targets.get(&branch)) else {
                return Err(Error::upstream(format!("default branch {} not found", branch)));
            };
            git.hard_reset(&path, tip)
        })
        .await?
    }

    /// Recompute and store the whole-tree credential counts. Failures are
    /// logged; the previous counts stay in place.
    async fn update_credential_counts(&self, owner: &str, repository: &str, dest: &Path) {
        match self.branch_credential_counts(dest.to_path_buf()).await {
            Ok(counts) => {
                let total: u64 = counts.values().sum();
                if let Err(e) = self.store.update_credential_counts(owner, repository, &counts).await {
                    warn!(error = %e, "failed to store credential counts");
                } else {
                    info!(branches = counts.len(), credentials = total, "credential counts updated");
                }
            }
            Err(e) => warn!(error = %e, "failed to count credentials"),
        }
    }

    async fn branch_credential_counts(&self, path: PathBuf) -> Result<BTreeMap<String, u64>> {
        let git = self.git.clone();
        let sniffer = self.sniffer.clone();
        let scope = self.scope;
        let abort = self.abort.clone();
        tokio::task::spawn_blocking(move || git.branch_credential_counts(&path, &sniffer, scope, &abort)).await?
    }
}

fn is_branch_ref(refname: &str) -> bool {
    refname.starts_with("refs/heads/") || refname.starts_with("refs/remotes/")
}

async fn remove_partial_clone(dest: &Path) {
    match tokio::fs::remove_dir_all(dest).await {
        Ok(()) => debug!(path = ?dest, "removed partial clone"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?dest, error = %e, "failed to remove partial clone"),
    }
}
