//! Appends tasks to the shared work queue.

use std::sync::Arc;

use taskgate_core::task::Task;

use crate::broker::Broker;
use crate::error::EnqueueError;

/// Serializes tasks and appends them to a single work queue.
///
/// All task kinds share the queue; workers discriminate on `type`. Appends
/// made through one dispatcher reach workers in call order.
pub struct TaskDispatcher {
    broker: Arc<dyn Broker>,
    queue_key: String,
}

impl TaskDispatcher {
    pub fn new(broker: Arc<dyn Broker>, queue_key: impl Into<String>) -> Self {
        Self {
            broker,
            queue_key: queue_key.into(),
        }
    }

    /// Append `task` to the tail of the queue and return the queue length.
    ///
    /// The task id must already be assigned. Broker failures are returned
    /// as-is; nothing is retried.
    pub async fn enqueue(&self, task: &Task) -> Result<u64, EnqueueError> {
        if task.task_id.is_empty() {
            return Err(EnqueueError::MissingTaskId);
        }

        let payload = serde_json::to_string(task)?;
        let queue_len = self
            .broker
            .push(&self.queue_key, payload)
            .await
            .map_err(|e| {
                tracing::error!(task_id = %task.task_id, error = %e, "Failed to enqueue task");
                EnqueueError::Broker(e)
            })?;

        tracing::debug!(
            task_id = %task.task_id,
            kind = %task.kind,
            queue = %self.queue_key,
            queue_len,
            "Task enqueued",
        );
        Ok(queue_len)
    }
}
