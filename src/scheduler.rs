//! Periodic refresh of tracked repositories

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cloner::WorkRequest;
use crate::error::{Error, Result};
use crate::repository::RepositoryStore;

/// Feeds the cloner: a `Refresh` for every cloned repository and a `Clone`
/// for every repository still waiting for its first clone
pub struct Scheduler {
    store: Arc<dyn RepositoryStore>,
    requests: mpsc::Sender<WorkRequest>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn RepositoryStore>, requests: mpsc::Sender<WorkRequest>, interval: Duration) -> Self {
        Self { store, requests, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(sent) => debug!(requests = sent, "refresh round scheduled"),
                        Err(e) => warn!(error = %e, "refresh round failed"),
                    }
                }
            }
        }
        info!("scheduler stopped");
    }

    /// Send one request per tracked repository, returning how many were sent
    pub async fn tick(&self) -> Result<usize> {
        let repositories = self.store.all().await?;
        let mut sent = 0;

        for repo in repositories {
            let request = if repo.cloned {
                WorkRequest::Refresh {
                    owner: repo.owner,
                    repository: repo.name,
                }
            } else {
                WorkRequest::Clone {
                    owner: repo.owner,
                    repository: repo.name,
                    url: repo.ssh_url,
                }
            };
            self.requests
                .send(request)
                .await
                .map_err(|_| Error::Enqueue("cloner is not running".into()))?;
            sent += 1;
        }

        Ok(sent)
    }
}
