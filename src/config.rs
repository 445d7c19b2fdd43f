//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then command line and
//! environment overrides. Each source produces a [`ConfigLayer`] of optional
//! values; later layers win field by field and the merged layer is
//! finalized into a fully resolved [`Config`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::git::{CertificateCheck, SshCredentials};
use crate::hosting::DEFAULT_API_URL;

const APP_DIR: &str = "credsweep";
const DEFAULT_SCAN_DEPTH: u32 = 5;
const DEFAULT_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_FETCH_INTERVAL_SECS: u64 = 3600;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    /// Root of the `<owner>/<repository>` clone layout
    pub workdir: PathBuf,
    pub scan_depth: u32,
    pub worker_concurrency: usize,
    pub fetch_interval: Duration,
    pub ssh: SshConfig,
    pub hosting: HostingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    /// Let libgit2 verify host keys instead of accepting any
    pub strict_host_checking: bool,
}

impl SshConfig {
    pub fn credentials(&self) -> SshCredentials {
        SshCredentials {
            private_key: self.private_key_path.clone(),
            public_key: self.public_key_path.clone(),
            passphrase: None,
        }
    }

    pub fn certificate_check(&self) -> CertificateCheck {
        if self.strict_host_checking {
            CertificateCheck::Passthrough
        } else {
            CertificateCheck::AcceptAll
        }
    }
}

#[derive(Clone)]
pub struct HostingConfig {
    pub api_url: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for HostingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostingConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

/// Partial configuration, as read from one source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub database_path: Option<PathBuf>,
    pub workdir: Option<PathBuf>,
    pub scan_depth: Option<u32>,
    pub worker_concurrency: Option<usize>,
    pub fetch_interval_secs: Option<u64>,
    #[serde(default)]
    pub ssh: SshConfigLayer,
    #[serde(default)]
    pub hosting: HostingConfigLayer,
    #[serde(default)]
    pub logging: LoggingConfigLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfigLayer {
    pub private_key_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub strict_host_checking: Option<bool>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostingConfigLayer {
    pub api_url: Option<String>,
    pub token: Option<String>,
}

impl std::fmt::Debug for HostingConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostingConfigLayer")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfigLayer {
    pub level: Option<String>,
}

fn replace<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl ConfigLayer {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a TOML file; a missing file is an empty layer
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(Self::default());
        }
        debug!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn merge(&mut self, other: ConfigLayer) {
        replace(&mut self.database_path, other.database_path);
        replace(&mut self.workdir, other.workdir);
        replace(&mut self.scan_depth, other.scan_depth);
        replace(&mut self.worker_concurrency, other.worker_concurrency);
        replace(&mut self.fetch_interval_secs, other.fetch_interval_secs);
        replace(&mut self.ssh.private_key_path, other.ssh.private_key_path);
        replace(&mut self.ssh.public_key_path, other.ssh.public_key_path);
        replace(&mut self.ssh.strict_host_checking, other.ssh.strict_host_checking);
        replace(&mut self.hosting.api_url, other.hosting.api_url);
        replace(&mut self.hosting.token, other.hosting.token);
        replace(&mut self.logging.level, other.logging.level);
    }

    pub fn finalize(self) -> Result<Config> {
        let data_dir = default_data_dir();

        let worker_concurrency = self.worker_concurrency.unwrap_or(DEFAULT_WORKER_CONCURRENCY);
        if worker_concurrency == 0 {
            return Err(Error::Config("worker_concurrency must be at least 1".into()));
        }
        let fetch_interval_secs = self.fetch_interval_secs.unwrap_or(DEFAULT_FETCH_INTERVAL_SECS);
        if fetch_interval_secs == 0 {
            return Err(Error::Config("fetch_interval_secs must be positive".into()));
        }

        Ok(Config {
            database_path: self
                .database_path
                .unwrap_or_else(|| data_dir.join(format!("{}.db", APP_DIR))),
            workdir: self.workdir.unwrap_or_else(|| data_dir.join("repositories")),
            scan_depth: self.scan_depth.unwrap_or(DEFAULT_SCAN_DEPTH),
            worker_concurrency,
            fetch_interval: Duration::from_secs(fetch_interval_secs),
            ssh: SshConfig {
                private_key_path: self.ssh.private_key_path,
                public_key_path: self.ssh.public_key_path,
                strict_host_checking: self.ssh.strict_host_checking.unwrap_or(false),
            },
            hosting: HostingConfig {
                api_url: self.hosting.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                token: self.hosting.token,
            },
            logging: LoggingConfig {
                level: self.logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            },
        })
    }
}

/// Cache directory for the database and clones
fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

/// `<config dir>/credsweep/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

impl Config {
    /// Defaults, then `file` (or the default config path), then `overrides`
    pub fn load(file: Option<&Path>, overrides: ConfigLayer) -> Result<Self> {
        let mut layer = ConfigLayer::default();
        let path = file.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(path) = path {
            layer.merge(ConfigLayer::from_file(&path)?);
        }
        layer.merge(overrides);
        layer.finalize()
    }
}
