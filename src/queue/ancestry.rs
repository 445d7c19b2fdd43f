use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::error::{Error, Result};
use crate::git::GitClient;
use crate::model::{AncestryScanPlan, Commit, DiffScanPlan, RefScanPlan, Task};
use crate::repository::CommitLedger;
use crate::util::{is_zero_sha, RepoPaths};

use super::{enqueue_error, TaskQueue};

/// One step of a depth-bounded walk up a commit's history.
///
/// Above depth 0 the job enqueues, for every parent in order, a diff scan
/// `parent -> sha` followed by an ancestry scan of the parent one level
/// shallower. At depth 0 it enqueues a full scan of the tree at `sha`
/// instead. The commit is registered only after every enqueue succeeded, so
/// a failed attempt can be redelivered without losing follow-on work.
pub struct AncestryScanJob {
    plan: AncestryScanPlan,
    ledger: Arc<dyn CommitLedger>,
    git: Arc<dyn GitClient>,
    queue: Arc<dyn TaskQueue>,
    paths: RepoPaths,
}

impl AncestryScanJob {
    pub fn new(
        plan: AncestryScanPlan,
        ledger: Arc<dyn CommitLedger>,
        git: Arc<dyn GitClient>,
        queue: Arc<dyn TaskQueue>,
        paths: RepoPaths,
    ) -> Self {
        Self { plan, ledger, git, queue, paths }
    }

    #[instrument(
        name = "ancestry_scan",
        skip(self),
        fields(owner = %self.plan.owner, repository = %self.plan.repository, sha = %self.plan.sha, depth = self.plan.depth)
    )]
    pub async fn run(&self) -> Result<()> {
        let result = self.scan().await;
        if let Err(e) = &result {
            error!(error = %e, "scanning-ancestry failed");
        }
        result
    }

    async fn scan(&self) -> Result<()> {
        let plan = &self.plan;

        if self
            .ledger
            .is_commit_registered(&plan.owner, &plan.repository, &plan.sha)
            .await?
        {
            debug!("commit already registered");
            return Ok(());
        }

        if plan.depth > 0 {
            for parent in self.parents().await? {
                self.enqueue(DiffScanPlan {
                    owner: plan.owner.clone(),
                    repository: plan.repository.clone(),
                    from: parent.clone(),
                    to: plan.sha.clone(),
                })
                .await?;
                // Commit time is only known for the triggering tip
                self.enqueue(AncestryScanPlan {
                    owner: plan.owner.clone(),
                    repository: plan.repository.clone(),
                    sha: parent,
                    depth: plan.depth - 1,
                    commit_timestamp: 0,
                })
                .await?;
            }
        } else {
            self.enqueue(RefScanPlan {
                owner: plan.owner.clone(),
                repository: plan.repository.clone(),
                git_ref: plan.sha.clone(),
            })
            .await?;
        }

        let commit = Commit::new(&plan.owner, &plan.repository, &plan.sha, plan.commit_timestamp);
        self.ledger.register_commit(&commit).await?;
        debug!("commit registered");
        Ok(())
    }

    /// Parents of the plan's commit. The all-zero id has none.
    async fn parents(&self) -> Result<Vec<String>> {
        if is_zero_sha(&self.plan.sha) {
            return Ok(Vec::new());
        }

        let path = self.paths.repository_path(&self.plan.owner, &self.plan.repository)?;
        let git = self.git.clone();
        let sha = self.plan.sha.clone();
        let parents = tokio::task::spawn_blocking(move || git.get_parents(&path, &sha))
            .await?
            .map_err(|e| match e {
                Error::Upstream(_) => e,
                other => Error::upstream(other),
            })?;
        Ok(parents)
    }

    async fn enqueue(&self, task: impl Into<Task>) -> Result<()> {
        self.queue.enqueue(task.into()).await.map_err(enqueue_error)
    }
}
