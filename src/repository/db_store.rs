//! Database implementation of the persistence contracts

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Commit, FetchRecord, NewRepository, RepositoryRecord};

use super::database::Database;
use super::store::{CommitLedger, RepositoryStore};

#[async_trait]
impl CommitLedger for Database {
    async fn is_commit_registered(&self, owner: &str, repository: &str, sha: &str) -> Result<bool> {
        self.commit_exists(owner, repository, sha).await
    }

    async fn register_commit(&self, commit: &Commit) -> Result<()> {
        self.insert_commit(commit).await
    }
}

#[async_trait]
impl RepositoryStore for Database {
    async fn create(&self, repo: &NewRepository) -> Result<()> {
        self.insert_repository(repo).await
    }

    async fn find(&self, owner: &str, name: &str) -> Result<Option<RepositoryRecord>> {
        self.find_repository(owner, name).await
    }

    async fn all(&self) -> Result<Vec<RepositoryRecord>> {
        self.all_repositories().await
    }

    async fn mark_as_cloned(&self, owner: &str, name: &str, path: &str) -> Result<()> {
        self.mark_repository_cloned(owner, name, path).await
    }

    async fn register_failed_fetch(&self, owner: &str, name: &str) -> Result<()> {
        self.increment_failed_fetches(owner, name).await
    }

    async fn update_credential_counts(
        &self,
        owner: &str,
        name: &str,
        counts: &BTreeMap<String, u64>,
    ) -> Result<()> {
        self.set_credential_counts(owner, name, counts).await
    }

    async fn register_fetch(&self, owner: &str, name: &str, fetch: &FetchRecord) -> Result<()> {
        self.insert_fetch(owner, name, fetch).await
    }
}
