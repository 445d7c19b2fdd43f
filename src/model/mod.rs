mod commit;
mod credential_count;
mod plan;
mod repository;

pub use commit::Commit;
pub use credential_count::{
    BranchCredentialCount, CredentialCountRequest, CredentialCountResponse,
    OrganizationCredentialCount, RepositoryCredentialCount,
};
pub use plan::{AncestryScanPlan, DiffScanPlan, RefScanPlan, Task};
pub use repository::{FetchRecord, NewRepository, RefUpdate, RepositoryRecord};
