//! Entry point for scanning a newly seen commit

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::git::GitClient;
use crate::model::AncestryScanPlan;
use crate::queue::{enqueue_error, TaskQueue};
use crate::util::{format_timestamp, RepoPaths};

/// Starts a history scan rooted at a commit
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, owner: &str, repository: &str, sha: &str) -> Result<()>;
}

/// Enqueues an ancestry scan of the commit at a fixed depth
pub struct QueueScanner {
    queue: Arc<dyn TaskQueue>,
    git: Arc<dyn GitClient>,
    paths: RepoPaths,
    depth: u32,
}

impl QueueScanner {
    pub fn new(queue: Arc<dyn TaskQueue>, git: Arc<dyn GitClient>, paths: RepoPaths, depth: u32) -> Self {
        Self { queue, git, paths, depth }
    }
}

#[async_trait]
impl Scanner for QueueScanner {
    async fn scan(&self, owner: &str, repository: &str, sha: &str) -> Result<()> {
        let path = self.paths.repository_path(owner, repository)?;
        let git = self.git.clone();
        let tip = sha.to_string();
        let commit_timestamp = tokio::task::spawn_blocking(move || git.commit_timestamp(&path, &tip)).await??;

        let plan = AncestryScanPlan {
            owner: owner.to_string(),
            repository: repository.to_string(),
            sha: sha.to_string(),
            depth: self.depth,
            commit_timestamp,
        };
        self.queue.enqueue(plan.into()).await.map_err(enqueue_error)?;

        debug!(
            owner = %owner,
            repository = %repository,
            sha = %sha,
            depth = self.depth,
            committed = %format_timestamp(commit_timestamp),
            "ancestry scan requested"
        );
        Ok(())
    }
}
