use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::hosting::ArchiveClient;
use crate::metrics::Metrics;
use crate::model::RefScanPlan;
use crate::notify::Notifier;
use crate::sniff::{LineReader, Sniffer, Violation};

const ARCHIVE_NAME: &str = "archive.zip";
const CONTENTS_DIR: &str = "contents";

/// Scans every file in the tree at a ref, fetched as a zip archive.
///
/// All downloaded and extracted data lives in a temporary directory that is
/// removed when the job returns, fails, or is dropped mid-flight.
pub struct RefScanJob {
    plan: RefScanPlan,
    archives: Arc<dyn ArchiveClient>,
    sniffer: Sniffer,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
}

impl RefScanJob {
    pub fn new(
        plan: RefScanPlan,
        archives: Arc<dyn ArchiveClient>,
        sniffer: Sniffer,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self { plan, archives, sniffer, notifier, metrics, cancel }
    }

    #[instrument(
        name = "ref_scan",
        skip(self),
        fields(owner = %self.plan.owner, repository = %self.plan.repository, git_ref = %self.plan.git_ref)
    )]
    pub async fn run(&self) -> Result<()> {
        let result = self.scan().await;
        if let Err(e) = &result {
            error!(error = %e, "ref scan failed");
        }
        result
    }

    async fn scan(&self) -> Result<()> {
        let plan = &self.plan;
        let workspace = tempfile::Builder::new().prefix("ref-scan-").tempdir()?;
        let archive = workspace.path().join(ARCHIVE_NAME);
        let contents = workspace.path().join(CONTENTS_DIR);

        self.archives
            .download_archive(&plan.owner, &plan.repository, &plan.git_ref, &archive, &self.cancel)
            .await
            .map_err(|e| match e {
                Error::Cancelled | Error::Upstream(_) => e,
                other => Error::upstream(format!("archive download failed: {}", other)),
            })?;

        let sniffer = self.sniffer.clone();
        let cancel = self.cancel.clone();
        let violations = tokio::task::spawn_blocking(move || -> Result<Vec<Violation>> {
            extract_archive(&archive, &contents)?;
            scan_files(&contents, &sniffer, &cancel)
        })
        .await??;

        let repository = format!("{}/{}", plan.owner, plan.repository);
        for violation in &violations {
            self.notifier
                .send_notification(&repository, &plan.git_ref, violation)
                .await?;
            self.metrics.violations.inc();
        }

        info!(violations = violations.len(), "ref scanned");
        // Removes the archive and everything extracted from it
        drop(workspace);
        Ok(())
    }
}

fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|e| Error::upstream(format!("opening archive: {}", e)))?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

/// Hosting archives wrap the tree in a single `<owner>-<repo>-<sha>/` directory
fn content_root(extracted: &Path) -> PathBuf {
    let entries: Vec<_> = match std::fs::read_dir(extracted) {
        Ok(dir) => dir.filter_map(|e| e.ok()).collect(),
        Err(_) => return extracted.to_path_buf(),
    };
    match entries.as_slice() {
        [only] if only.file_type().map(|t| t.is_dir()).unwrap_or(false) => only.path(),
        _ => extracted.to_path_buf(),
    }
}

/// Sniff every regular file under `extracted`. Files that cannot be read
/// are logged and skipped.
fn scan_files(extracted: &Path, sniffer: &Sniffer, cancel: &CancellationToken) -> Result<Vec<Violation>> {
    scan_files_with(extracted, sniffer, cancel, |path: &Path| File::open(path))
}

fn scan_files_with<R, F>(
    extracted: &Path,
    sniffer: &Sniffer,
    cancel: &CancellationToken,
    mut open: F,
) -> Result<Vec<Violation>>
where
    R: Read,
    F: FnMut(&Path) -> io::Result<R>,
{
    let root = content_root(extracted);
    let mut violations = Vec::new();

    for entry in WalkDir::new(&root).follow_links(false) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        let file = match open(entry.path()) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %relative, error = %e, "skipping file that cannot be opened");
                continue;
            }
        };

        let mut found = Vec::new();
        let lines = LineReader::new(relative.clone(), BufReader::new(file));
        match sniffer.sniff(lines, |violation| {
            found.push(violation);
            Ok(())
        }) {
            Ok(_) => violations.append(&mut found),
            Err(e) => warn!(path = %relative, error = %e, "skipping file that cannot be read"),
        }
    }

    Ok(violations)
}
