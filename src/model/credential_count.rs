//! Read-path response types for aggregated credential counts.

use serde::{Deserialize, Serialize};

/// Request for the per-organization totals; carries no filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialCountRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialCountResponse {
    pub credential_counts: Vec<OrganizationCredentialCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCredentialCount {
    pub owner: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCredentialCount {
    pub owner: String,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCredentialCount {
    pub name: String,
    pub count: u64,
}
