mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use credsweep::aggregator::CredentialCountAggregator;
use credsweep::cloner::{Cloner, WorkRequest};
use credsweep::config::Config;
use credsweep::git::{Git2Client, GitClient};
use credsweep::hosting::GithubArchiveClient;
use credsweep::metrics::Metrics;
use credsweep::model::NewRepository;
use credsweep::notify::LogNotifier;
use credsweep::queue::{JobContext, JobRunner, MemoryQueue, TaskReceiver, Worker};
use credsweep::repository::{Database, RepositoryStore};
use credsweep::scanner::{QueueScanner, Scanner};
use credsweep::scheduler::Scheduler;
use credsweep::sniff::Sniffer;
use credsweep::util::RepoPaths;

const CLONE_QUEUE_CAPACITY: usize = 256;

/// Everything the jobs and the cloner share
struct Pipeline {
    config: Config,
    db: Arc<Database>,
    git: Arc<dyn GitClient>,
    queue: MemoryQueue,
    sniffer: Sniffer,
    paths: RepoPaths,
    metrics: Arc<Metrics>,
    abort: CancellationToken,
}

impl Pipeline {
    fn new(config: Config, db: Arc<Database>) -> Result<(Self, TaskReceiver)> {
        let git = Git2Client::new(config.ssh.credentials(), config.ssh.certificate_check());
        let (queue, receiver) = MemoryQueue::new();
        let paths = RepoPaths::new(&config.workdir);
        let pipeline = Self {
            config,
            db,
            git: Arc::new(git),
            queue,
            sniffer: Sniffer::default(),
            paths,
            metrics: Arc::new(Metrics::new()?),
            abort: CancellationToken::new(),
        };
        Ok((pipeline, receiver))
    }

    fn scanner(&self) -> Arc<dyn Scanner> {
        Arc::new(QueueScanner::new(
            Arc::new(self.queue.clone()),
            self.git.clone(),
            self.paths.clone(),
            self.config.scan_depth,
        ))
    }

    fn cloner(&self) -> Cloner {
        Cloner::new(
            self.git.clone(),
            self.db.clone(),
            self.scanner(),
            self.sniffer.clone(),
            self.paths.clone(),
            self.metrics.clone(),
        )
        .with_abort(self.abort.clone())
    }

    fn worker(&self, receiver: TaskReceiver) -> Result<Worker> {
        let archives = GithubArchiveClient::new(&self.config.hosting.api_url, self.config.hosting.token.clone())
            .context("Could not build hosting client")?;
        let ctx = JobContext {
            paths: self.paths.clone(),
            ledger: self.db.clone(),
            git: self.git.clone(),
            queue: Arc::new(self.queue.clone()),
            archives: Arc::new(archives),
            notifier: Arc::new(LogNotifier),
            sniffer: self.sniffer.clone(),
            metrics: self.metrics.clone(),
            cancel: self.abort.clone(),
        };
        Ok(Worker::new(JobRunner::new(ctx), receiver, self.config.worker_concurrency))
    }

    fn log_metrics(&self) {
        for (name, value) in self.metrics.snapshot() {
            info!(counter = %name, value, "metric");
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref(), cli.overrides()).context("Could not load configuration")?;
    init_tracing(&config.logging.level);

    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::create_dir_all(&config.workdir)
        .with_context(|| format!("Could not create {}", config.workdir.display()))?;

    let db_path = config.database_path.to_str().context("Invalid path encoding")?;
    let db = Database::new(db_path).await?;
    if db.init_schema().await? {
        info!(path = %db_path, "database schema up to date");
    }
    let db = Arc::new(db);

    match cli.command {
        Command::Serve { .. } => serve(config, db).await,
        Command::AddRepo { owner, name, url, default_branch } => {
            db.create(&NewRepository {
                owner: owner.clone(),
                name: name.clone(),
                ssh_url: url,
                default_branch,
            })
            .await?;
            eprintln!("Tracking {}/{}", owner, name);
            Ok(())
        }
        Command::Scan { owner, name, sha, .. } => scan(config, db, owner, name, sha).await,
        Command::Counts { owner, name, json } => counts(db, owner, name, json).await,
    }
}

async fn serve(config: Config, db: Arc<Database>) -> Result<()> {
    let interval = config.fetch_interval;
    let (pipeline, receiver) = Pipeline::new(config, db.clone())?;
    let (requests, request_rx) = mpsc::channel(CLONE_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(pipeline.worker(receiver)?.run(shutdown.clone()));
    let cloner = tokio::spawn(pipeline.cloner().run(request_rx, shutdown.clone()));
    let scheduler = tokio::spawn(Scheduler::new(db, requests, interval).run(shutdown.clone()));

    tokio::signal::ctrl_c().await.context("Could not listen for shutdown signal")?;
    info!("shutdown requested, finishing in-flight work");
    shutdown.cancel();

    scheduler.await?;
    cloner.await?;
    worker.await?;
    pipeline.log_metrics();
    Ok(())
}

async fn scan(config: Config, db: Arc<Database>, owner: String, name: String, sha: Option<String>) -> Result<()> {
    let Some(record) = db.find(&owner, &name).await? else {
        bail!("{}/{} is not tracked; run add-repo first", owner, name);
    };
    let (pipeline, receiver) = Pipeline::new(config, db)?;

    if !record.cloned {
        // Cloning scans HEAD on its own
        pipeline
            .cloner()
            .handle(WorkRequest::Clone {
                owner: owner.clone(),
                repository: name.clone(),
                url: record.ssh_url,
            })
            .await;
        if let Some(sha) = &sha {
            pipeline.scanner().scan(&owner, &name, sha).await?;
        }
    } else {
        let path = pipeline.paths.repository_path(&owner, &name)?;
        let sha = match sha {
            Some(sha) => sha,
            None => {
                let git = pipeline.git.clone();
                tokio::task::spawn_blocking(move || git.head(&path)).await??
            }
        };
        pipeline.scanner().scan(&owner, &name, &sha).await?;
    }

    pipeline.worker(receiver)?.run_until_idle().await;
    pipeline.log_metrics();
    eprintln!(
        "Scan finished: {} credentials reported, {} jobs failed",
        pipeline.metrics.violations.get(),
        pipeline.metrics.jobs_failed.get()
    );
    Ok(())
}

async fn counts(db: Arc<Database>, owner: Option<String>, name: Option<String>, json: bool) -> Result<()> {
    let aggregator = CredentialCountAggregator::new(db);

    match (owner, name) {
        (Some(owner), Some(name)) => {
            let counts = aggregator.get_repository_credential_counts(&owner, &name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for branch in counts {
                    println!("{:<40} {:>8}", branch.name, branch.count);
                }
            }
        }
        (Some(owner), None) => {
            let counts = aggregator.get_organization_credential_counts(&owner).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for repo in counts {
                    println!("{:<40} {:>8}", repo.name, repo.count);
                }
            }
        }
        _ => {
            let counts = aggregator.get_credential_counts().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for org in counts {
                    println!("{:<40} {:>8}", org.owner, org.count);
                }
            }
        }
    }
    Ok(())
}
