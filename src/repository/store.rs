//! Persistence contracts
//!
//! Jobs and workers depend on these traits, not on SQLite, so they can be
//! exercised against in-memory fakes.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Commit, FetchRecord, NewRepository, RepositoryRecord};

/// Durable record of which commits have been fully processed
#[async_trait]
pub trait CommitLedger: Send + Sync {
    async fn is_commit_registered(&self, owner: &str, repository: &str, sha: &str) -> Result<bool>;

    /// Record a commit as processed.
    ///
    /// Atomic per commit; registering twice is not an error. Also resets the
    /// owning repository's failed fetch counter in the same transaction.
    async fn register_commit(&self, commit: &Commit) -> Result<()>;
}

/// Repository rows, owned by the cloner and the whole-tree count writer
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Insert a discovered repository; existing rows are left untouched
    async fn create(&self, repo: &NewRepository) -> Result<()>;

    async fn find(&self, owner: &str, name: &str) -> Result<Option<RepositoryRecord>>;

    /// Every repository, ordered by owner then name
    async fn all(&self) -> Result<Vec<RepositoryRecord>>;

    async fn mark_as_cloned(&self, owner: &str, name: &str, path: &str) -> Result<()>;

    async fn register_failed_fetch(&self, owner: &str, name: &str) -> Result<()>;

    async fn update_credential_counts(
        &self,
        owner: &str,
        name: &str,
        counts: &BTreeMap<String, u64>,
    ) -> Result<()>;

    /// Record a successful fetch and reset the failed fetch counter atomically
    async fn register_fetch(&self, owner: &str, name: &str, fetch: &FetchRecord) -> Result<()>;
}
