use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::git::GitClient;
use crate::hosting::ArchiveClient;
use crate::metrics::Metrics;
use crate::model::Task;
use crate::notify::Notifier;
use crate::repository::CommitLedger;
use crate::sniff::Sniffer;
use crate::util::{short_sha, RepoPaths};

use super::{AncestryScanJob, DiffScanJob, Delivery, RefScanJob, TaskQueue, TaskReceiver};

/// Collaborators every job draws from
#[derive(Clone)]
pub struct JobContext {
    pub paths: RepoPaths,
    pub ledger: Arc<dyn CommitLedger>,
    pub git: Arc<dyn GitClient>,
    pub queue: Arc<dyn TaskQueue>,
    pub archives: Arc<dyn ArchiveClient>,
    pub notifier: Arc<dyn Notifier>,
    pub sniffer: Sniffer,
    pub metrics: Arc<Metrics>,
    /// Aborts long-running downloads and walks
    pub cancel: CancellationToken,
}

/// Dispatches a task to the job for its kind
pub struct JobRunner {
    ctx: JobContext,
}

impl JobRunner {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub async fn run(&self, task: Task) -> Result<()> {
        let ctx = &self.ctx;
        match task {
            Task::AncestryScan(plan) => {
                AncestryScanJob::new(
                    plan,
                    ctx.ledger.clone(),
                    ctx.git.clone(),
                    ctx.queue.clone(),
                    ctx.paths.clone(),
                )
                .run()
                .await
            }
            Task::DiffScan(plan) => {
                DiffScanJob::new(
                    plan,
                    ctx.git.clone(),
                    ctx.sniffer.clone(),
                    ctx.notifier.clone(),
                    ctx.metrics.clone(),
                    ctx.paths.clone(),
                )
                .run()
                .await
            }
            Task::RefScan(plan) => {
                RefScanJob::new(
                    plan,
                    ctx.archives.clone(),
                    ctx.sniffer.clone(),
                    ctx.notifier.clone(),
                    ctx.metrics.clone(),
                    ctx.cancel.clone(),
                )
                .run()
                .await
            }
        }
    }

    /// Run one delivery, recording the outcome. The delivery is released
    /// (and the queue's pending count drops) only after the job finishes.
    async fn process(&self, delivery: Delivery) {
        let task = &delivery.task;
        let kind = task.kind();
        let owner = task.owner().to_string();
        let repository = task.repository().to_string();
        let subject = match task {
            Task::AncestryScan(plan) => short_sha(&plan.sha).to_string(),
            Task::DiffScan(plan) => format!("{}..{}", short_sha(&plan.from), short_sha(&plan.to)),
            Task::RefScan(plan) => short_sha(&plan.git_ref).to_string(),
        };

        match self.run(delivery.task.clone()).await {
            Ok(()) => {
                self.ctx.metrics.jobs_succeeded.inc();
                debug!(kind, owner = %owner, repository = %repository, subject = %subject, "job finished");
            }
            Err(e) => {
                self.ctx.metrics.jobs_failed.inc();
                warn!(kind, owner = %owner, repository = %repository, subject = %subject, error = %e, "job failed");
            }
        }
        drop(delivery);
    }
}

/// Drains a [`TaskReceiver`], running up to `concurrency` jobs at once
pub struct Worker {
    runner: Arc<JobRunner>,
    receiver: TaskReceiver,
    concurrency: usize,
}

impl Worker {
    pub fn new(runner: JobRunner, receiver: TaskReceiver, concurrency: usize) -> Self {
        Self {
            runner: Arc::new(runner),
            receiver,
            concurrency: concurrency.max(1),
        }
    }

    /// Process tasks until `shutdown` fires or every sender is gone.
    /// Jobs already running are allowed to finish.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();
        info!(concurrency = self.concurrency, "worker started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                delivery = self.receiver.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let runner = self.runner.clone();
            running.spawn(async move {
                let _permit = permit;
                runner.process(delivery).await;
            });
            while running.try_join_next().is_some() {}
        }

        debug!(in_flight = running.len(), "worker draining");
        while running.join_next().await.is_some() {}
        info!("worker stopped");
    }

    /// Process tasks until nothing is queued or running, including the
    /// follow-on work the jobs themselves enqueue
    pub async fn run_until_idle(mut self) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();

        while self.receiver.pending() > 0 {
            tokio::select! {
                Some(_) = running.join_next(), if !running.is_empty() => {}
                delivery = self.receiver.recv(), if permits.available_permits() > 0 => {
                    let Some(delivery) = delivery else { break };
                    let Ok(permit) = permits.clone().acquire_owned().await else { break };
                    let runner = self.runner.clone();
                    running.spawn(async move {
                        let _permit = permit;
                        runner.process(delivery).await;
                    });
                }
                else => break,
            }
        }

        while running.join_next().await.is_some() {}
    }
}
