//! Hosting provider transport

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Downloads a zip archive of a repository at a ref
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Write the archive of `owner/repository` at `git_ref` to `dest`
    async fn download_archive(
        &self,
        owner: &str,
        repository: &str,
        git_ref: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Fetches `zipball` archives from a GitHub-compatible REST API
#[derive(Debug, Clone)]
pub struct GithubArchiveClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GithubArchiveClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn archive_url(&self, owner: &str, repository: &str, git_ref: &str) -> String {
        format!("{}/repos/{}/{}/zipball/{}", self.api_url, owner, repository, git_ref)
    }
}

#[async_trait]
impl ArchiveClient for GithubArchiveClient {
    #[instrument(skip_all, fields(owner = %owner, repository = %repository, git_ref = %git_ref))]
    async fn download_archive(
        &self,
        owner: &str,
        repository: &str,
        git_ref: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut request = self.http.get(self.archive_url(owner, repository, git_ref));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let mut response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response?.error_for_status()?,
        };

        let mut file = File::create(dest).await?;
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(bytes = written, "archive downloaded");
        Ok(())
    }
}
