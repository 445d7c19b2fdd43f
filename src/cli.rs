use clap::{Parser, Subcommand};
use std::path::PathBuf;

use credsweep::config::{ConfigLayer, HostingConfigLayer, LoggingConfigLayer};

#[derive(Parser, Debug)]
#[command(name = "credsweep", version, about = "Find credentials committed to git repositories")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, env = "CREDSWEEP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "CREDSWEEP_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Directory holding local clones
    #[arg(long, env = "CREDSWEEP_WORKDIR", global = true)]
    pub workdir: Option<PathBuf>,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, env = "CREDSWEEP_LOG", global = true)]
    pub log_level: Option<String>,

    /// Hosting API token used for archive downloads
    #[arg(long, env = "CREDSWEEP_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone, refresh and scan every tracked repository until interrupted
    Serve {
        /// Jobs run concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Seconds between refresh rounds
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Start tracking a repository
    AddRepo {
        owner: String,
        name: String,
        /// Clone URL
        url: String,
        #[arg(long, default_value = "main")]
        default_branch: String,
    },

    /// Scan one repository's history and wait for every job to finish
    Scan {
        owner: String,
        name: String,
        /// Commit to start from (defaults to HEAD of the local clone)
        #[arg(long)]
        sha: Option<String>,
        /// Ancestry levels to walk
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Print stored credential counts
    Counts {
        /// Limit to one owner
        owner: Option<String>,
        /// Limit to one repository of the owner
        name: Option<String>,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Values given on the command line or through the environment
    pub fn overrides(&self) -> ConfigLayer {
        let mut layer = ConfigLayer {
            database_path: self.database.clone(),
            workdir: self.workdir.clone(),
            hosting: HostingConfigLayer {
                api_url: None,
                token: self.token.clone(),
            },
            logging: LoggingConfigLayer {
                level: self.log_level.clone(),
            },
            ..Default::default()
        };
        match &self.command {
            Command::Serve { concurrency, interval_secs } => {
                layer.worker_concurrency = *concurrency;
                layer.fetch_interval_secs = *interval_secs;
            }
            Command::Scan { depth, .. } => layer.scan_depth = *depth,
            Command::AddRepo { .. } | Command::Counts { .. } => {}
        }
        layer
    }
}
