use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tracked repository as stored in the `repositories` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub owner: String,
    pub name: String,
    pub ssh_url: String,
    pub default_branch: String,
    pub cloned: bool,
    /// Local working copy, set once the clone succeeds
    pub path: Option<String>,
    /// Branch name -> number of credentials found at the branch tip
    pub credential_counts: BTreeMap<String, u64>,
    pub failed_fetches: i64,
}

impl RepositoryRecord {
    /// `owner/name`, the form used in notifications
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Sum of all branch counts
    pub fn total_credentials(&self) -> u64 {
        self.credential_counts.values().sum()
    }
}

/// A newly discovered repository
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub owner: String,
    pub name: String,
    pub ssh_url: String,
    pub default_branch: String,
}

/// Old and new tip of a ref touched by a fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    pub old: String,
    pub new: String,
}

/// A successful fetch, persisted in the `fetches` table
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub path: String,
    pub changes: BTreeMap<String, RefUpdate>,
}
