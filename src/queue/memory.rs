use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::Task;

use super::TaskQueue;

/// Serialized form a task travels in
struct Envelope {
    kind: &'static str,
    payload: String,
}

/// Unbounded in-process queue.
///
/// Tasks are serialized on enqueue and rebuilt on delivery, exactly as a
/// remote backend would carry them. `pending` counts tasks that are queued
/// or still being processed.
#[derive(Clone)]
pub struct MemoryQueue {
    sender: mpsc::UnboundedSender<Envelope>,
    pending: Arc<AtomicUsize>,
}

pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<Envelope>,
    pending: Arc<AtomicUsize>,
}

/// A delivered task. The pending count drops when this is dropped.
pub struct Delivery {
    pub task: Task,
    _guard: PendingGuard,
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl MemoryQueue {
    pub fn new() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        (
            Self { sender, pending: pending.clone() },
            TaskReceiver { receiver, pending },
        )
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: Task) -> Result<()> {
        let envelope = Envelope {
            kind: task.kind(),
            payload: task.payload().map_err(|e| Error::Enqueue(e.to_string()))?,
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(envelope).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::Enqueue("queue closed".into()));
        }

        debug!(kind = task.kind(), owner = %task.owner(), repository = %task.repository(), "task enqueued");
        Ok(())
    }
}

impl TaskReceiver {
    /// Next task, or `None` once every sender is gone and the queue is drained
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let envelope = self.receiver.recv().await?;
            let guard = PendingGuard(self.pending.clone());
            match Task::from_parts(envelope.kind, &envelope.payload) {
                Ok(task) => return Some(Delivery { task, _guard: guard }),
                Err(e) => error!(kind = envelope.kind, error = %e, "dropping undecodable task"),
            }
        }
    }

    /// Tasks queued or in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}
