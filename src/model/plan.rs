//! Scan plans and the task envelope that carries them across the queue.
//!
//! Field names are part of the wire contract and must not change:
//! a plan enqueued by one version has to be readable by the next.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ANCESTRY_SCAN: &str = "ancestry-scan";
pub const DIFF_SCAN: &str = "diff-scan";
pub const REF_SCAN: &str = "ref-scan";

/// Walk one commit's ancestry, `depth` levels further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestryScanPlan {
    pub owner: String,
    pub repository: String,
    pub sha: String,
    pub depth: u32,
    #[serde(rename = "commit-timestamp", default)]
    pub commit_timestamp: i64,
}

/// Scan the lines added between two commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffScanPlan {
    pub owner: String,
    pub repository: String,
    pub from: String,
    pub to: String,
}

/// Scan every file of the tree at `ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefScanPlan {
    pub owner: String,
    pub repository: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// The closed set of jobs the pipeline can dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Task {
    #[serde(rename = "ancestry-scan")]
    AncestryScan(AncestryScanPlan),
    #[serde(rename = "diff-scan")]
    DiffScan(DiffScanPlan),
    #[serde(rename = "ref-scan")]
    RefScan(RefScanPlan),
}

impl Task {
    /// The string discriminator used by queue backends.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::AncestryScan(_) => ANCESTRY_SCAN,
            Task::DiffScan(_) => DIFF_SCAN,
            Task::RefScan(_) => REF_SCAN,
        }
    }

    /// Serialized plan, without the discriminator.
    pub fn payload(&self) -> Result<String> {
        let json = match self {
            Task::AncestryScan(plan) => serde_json::to_string(plan)?,
            Task::DiffScan(plan) => serde_json::to_string(plan)?,
            Task::RefScan(plan) => serde_json::to_string(plan)?,
        };
        Ok(json)
    }

    /// Rebuild a task from a discriminator and a payload produced by [`Task::payload`].
    pub fn from_parts(kind: &str, payload: &str) -> Result<Self> {
        match kind {
            ANCESTRY_SCAN => Ok(Task::AncestryScan(serde_json::from_str(payload)?)),
            DIFF_SCAN => Ok(Task::DiffScan(serde_json::from_str(payload)?)),
            REF_SCAN => Ok(Task::RefScan(serde_json::from_str(payload)?)),
            other => Err(Error::UnknownTaskKind(other.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            Task::AncestryScan(plan) => &plan.owner,
            Task::DiffScan(plan) => &plan.owner,
            Task::RefScan(plan) => &plan.owner,
        }
    }

    pub fn repository(&self) -> &str {
        match self {
            Task::AncestryScan(plan) => &plan.repository,
            Task::DiffScan(plan) => &plan.repository,
            Task::RefScan(plan) => &plan.repository,
        }
    }
}

impl From<AncestryScanPlan> for Task {
    fn from(plan: AncestryScanPlan) -> Self {
        Task::AncestryScan(plan)
    }
}

impl From<DiffScanPlan> for Task {
    fn from(plan: DiffScanPlan) -> Self {
        Task::DiffScan(plan)
    }
}

impl From<RefScanPlan> for Task {
    fn from(plan: RefScanPlan) -> Self {
        Task::RefScan(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ancestry_payload_field_names() {
        let task = Task::AncestryScan(AncestryScanPlan {
            owner: "owner".into(),
            repository: "repo".into(),
            sha: "abc".into(),
            depth: 3,
            commit_timestamp: 1700000000,
        });
        let value: serde_json::Value = serde_json::from_str(&task.payload().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "owner": "owner",
                "repository": "repo",
                "sha": "abc",
                "depth": 3,
                "commit-timestamp": 1700000000
            })
        );
    }

    #[test]
    fn test_ref_payload_uses_ref_key() {
        let task = Task::RefScan(RefScanPlan {
            owner: "o".into(),
            repository: "r".into(),
            git_ref: "main".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&task.payload().unwrap()).unwrap();
        assert_eq!(value, json!({"owner": "o", "repository": "r", "ref": "main"}));
    }

    #[test]
    fn test_from_parts_restores_task() {
        let task = Task::DiffScan(DiffScanPlan {
            owner: "o".into(),
            repository: "r".into(),
            from: "a".into(),
            to: "b".into(),
        });
        let rebuilt = Task::from_parts(task.kind(), &task.payload().unwrap()).unwrap();
        assert_eq!(rebuilt, task);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = Task::from_parts("bogus", "{}").unwrap_err();
        assert!(matches!(err, Error::UnknownTaskKind(kind) if kind == "bogus"));
    }

    #[test]
    fn test_envelope_uses_discriminator() {
        let task = Task::RefScan(RefScanPlan {
            owner: "o".into(),
            repository: "r".into(),
            git_ref: "deadbeef".into(),
        });
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["kind"], "ref-scan");
        assert_eq!(value["payload"]["ref"], "deadbeef");
    }
}
