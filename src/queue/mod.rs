//! Scan jobs and the queue that dispatches them
//!
//! Jobs never recurse directly: an ancestry scan hands its follow-on work
//! back to the [`TaskQueue`] and returns. Delivery is at-least-once with no
//! ordering guarantee between jobs, so every job must tolerate re-delivery.
//!
//! - **memory**: in-process queue backend
//! - **ancestry**: depth-bounded history traversal
//! - **diff_scan**: scan lines added between two commits
//! - **ref_scan**: scan every file of an archived ref
//! - **runner**: dispatch of a [`Task`] to its job, and the worker loop

mod ancestry;
mod diff_scan;
mod memory;
mod ref_scan;
mod runner;

pub use ancestry::AncestryScanJob;
pub use diff_scan::DiffScanJob;
pub use memory::{Delivery, MemoryQueue, TaskReceiver};
pub use ref_scan::RefScanJob;
pub use runner::{JobContext, JobRunner, Worker};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::Task;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Hand a task to the queue. Failures are reported as [`Error::Enqueue`].
    async fn enqueue(&self, task: Task) -> Result<()>;
}

/// Normalize a backend failure into [`Error::Enqueue`]
pub(crate) fn enqueue_error(err: Error) -> Error {
    match err {
        Error::Enqueue(_) => err,
        other => Error::Enqueue(other.to_string()),
    }
}
