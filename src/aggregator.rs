//! Read-only rollups of the stored whole-tree credential counts

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{
    BranchCredentialCount, CredentialCountRequest, CredentialCountResponse,
    OrganizationCredentialCount, RepositoryCredentialCount,
};
use crate::repository::RepositoryStore;

pub struct CredentialCountAggregator {
    store: Arc<dyn RepositoryStore>,
}

impl CredentialCountAggregator {
    pub fn new(store: Arc<dyn RepositoryStore>) -> Self {
        Self { store }
    }

    /// Total credentials per owner across all of its repositories and
    /// branches, sorted by owner
    pub async fn get_credential_counts(&self) -> Result<Vec<OrganizationCredentialCount>> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for repo in self.store.all().await? {
            *totals.entry(repo.owner.clone()).or_default() += repo.total_credentials();
        }

        Ok(totals
            .into_iter()
            .map(|(owner, count)| OrganizationCredentialCount { owner, count })
            .collect())
    }

    pub async fn get_credential_counts_response(
        &self,
        _request: &CredentialCountRequest,
    ) -> Result<CredentialCountResponse> {
        Ok(CredentialCountResponse {
            credential_counts: self.get_credential_counts().await?,
        })
    }

    /// Per-repository totals for one owner, sorted by repository name
    pub async fn get_organization_credential_counts(&self, owner: &str) -> Result<Vec<RepositoryCredentialCount>> {
        let mut counts: Vec<_> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|repo| repo.owner == owner)
            .map(|repo| RepositoryCredentialCount {
                count: repo.total_credentials(),
                owner: repo.owner,
                name: repo.name,
            })
            .collect();
        counts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(counts)
    }

    /// Per-branch counts for one repository, sorted by branch. Unknown
    /// repositories have no branches.
    pub async fn get_repository_credential_counts(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Vec<BranchCredentialCount>> {
        let Some(repo) = self.store.find(owner, name).await? else {
            return Ok(Vec::new());
        };
        Ok(repo
            .credential_counts
            .into_iter()
            .map(|(name, count)| BranchCredentialCount { name, count })
            .collect())
    }
}
