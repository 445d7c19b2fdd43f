//! Notification boundary

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::sniff::Violation;

/// Delivers a detected credential to whoever needs to rotate it
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `repository` is `owner/name`; `git_ref` is the commit or ref the
    /// violation was found at
    async fn send_notification(&self, repository: &str, git_ref: &str, violation: &Violation) -> Result<()>;
}

/// Reports violations as structured log events. The matched text itself is
/// never logged.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, repository: &str, git_ref: &str, violation: &Violation) -> Result<()> {
        warn!(
            repository = %repository,
            git_ref = %git_ref,
            path = %violation.line.path,
            line_number = violation.line.line_number,
            rule = %violation.rule,
            "found credential"
        );
        Ok(())
    }
}
