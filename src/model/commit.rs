/// A commit that has been fully processed by an ancestry scan.
///
/// `(owner, repository, sha)` is the dedup key; rows are never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub owner: String,
    pub repository: String,
    pub sha: String,
    /// Commit time in seconds since the epoch, 0 when unknown
    pub timestamp: i64,
}

impl Commit {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        sha: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            sha: sha.into(),
            timestamp,
        }
    }
}
