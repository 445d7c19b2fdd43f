use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::error::Result;
use crate::git::GitClient;
use crate::metrics::Metrics;
use crate::model::DiffScanPlan;
use crate::notify::Notifier;
use crate::sniff::{DiffLines, Sniffer, Violation};
use crate::util::RepoPaths;

/// Scans the lines a commit pair adds and reports each credential found
pub struct DiffScanJob {
    plan: DiffScanPlan,
    git: Arc<dyn GitClient>,
    sniffer: Sniffer,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    paths: RepoPaths,
}

impl DiffScanJob {
    pub fn new(
        plan: DiffScanPlan,
        git: Arc<dyn GitClient>,
        sniffer: Sniffer,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        paths: RepoPaths,
    ) -> Self {
        Self { plan, git, sniffer, notifier, metrics, paths }
    }

    #[instrument(
        name = "diff_scan",
        skip(self),
        fields(owner = %self.plan.owner, repository = %self.plan.repository, from = %self.plan.from, to = %self.plan.to)
    )]
    pub async fn run(&self) -> Result<()> {
        let result = self.scan().await;
        if let Err(e) = &result {
            error!(error = %e, "diff scan failed");
        }
        result
    }

    async fn scan(&self) -> Result<()> {
        let plan = &self.plan;
        let violations = self.find_violations().await?;

        let repository = format!("{}/{}", plan.owner, plan.repository);
        for violation in &violations {
            self.notifier
                .send_notification(&repository, &plan.to, violation)
                .await?;
            self.metrics.violations.inc();
        }

        info!(violations = violations.len(), "diff scanned");
        Ok(())
    }

    /// Diff and sniff on the blocking pool; patches can be large
    async fn find_violations(&self) -> Result<Vec<Violation>> {
        let path = self.paths.repository_path(&self.plan.owner, &self.plan.repository)?;
        let git = self.git.clone();
        let sniffer = self.sniffer.clone();
        let from = self.plan.from.clone();
        let to = self.plan.to.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Violation>> {
            let patch = git.diff(&path, Some(&from), &to)?;
            let mut violations = Vec::new();
            sniffer.sniff(DiffLines::new(&patch), |violation| {
                violations.push(violation);
                Ok(())
            })?;
            Ok(violations)
        })
        .await?
    }
}
