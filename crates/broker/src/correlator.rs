//! Waits for the single result of a task.
//!
//! [`ResultCorrelator::await_result`] opens a dedicated subscription to
//! `result:<taskId>` and waits for the first message. One deadline covers
//! both the subscribe and the wait. The subscription is closed before the
//! call returns, whatever the outcome. A result published after the deadline
//! is lost: nobody is listening.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use taskgate_core::message::{result_channel, ResultMessage};
use tokio::time::Instant;

use crate::broker::Broker;
use crate::error::CorrelationError;

pub struct ResultCorrelator {
    broker: Arc<dyn Broker>,
}

impl ResultCorrelator {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Wait up to `timeout` for the result of `task_id`. The time spent
    /// subscribing counts against `timeout`.
    ///
    /// Exactly one outcome is produced: the decoded result, a subscribe
    /// failure (returned immediately), a timeout, or another terminal error.
    pub async fn await_result(
        &self,
        task_id: &str,
        timeout: Duration,
    ) -> Result<Value, CorrelationError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let channel = result_channel(task_id);
        let timed_out = || CorrelationError::Timeout {
            task_id: task_id.to_string(),
            timeout,
        };

        let mut subscription =
            match tokio::time::timeout_at(deadline, self.broker.subscribe(&channel)).await {
                Ok(Ok(subscription)) => subscription,
                Ok(Err(e)) => {
                    tracing::error!(task_id, error = %e, "Result subscription failed");
                    return Err(CorrelationError::Subscribe(e));
                }
                Err(_elapsed) => {
                    tracing::warn!(
                        task_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Timed out subscribing for result",
                    );
                    return Err(timed_out());
                }
            };

        let outcome = match tokio::time::timeout_at(deadline, subscription.next_message()).await {
            Ok(Ok(Some(raw))) => match ResultMessage::decode(&raw) {
                Ok(ResultMessage::Data(value)) => Ok(value),
                Ok(ResultMessage::End) => Err(CorrelationError::Ended {
                    task_id: task_id.to_string(),
                }),
                Err(e) => Err(CorrelationError::Decode(e)),
            },
            Ok(Ok(None)) => Err(CorrelationError::Closed),
            Ok(Err(e)) => Err(CorrelationError::Receive(e)),
            Err(_elapsed) => Err(timed_out()),
        };

        subscription.close().await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => tracing::info!(task_id, elapsed_ms, "Result received"),
            Err(CorrelationError::Timeout { .. }) => {
                tracing::warn!(task_id, elapsed_ms, "Timed out waiting for result")
            }
            Err(e) => tracing::error!(task_id, elapsed_ms, error = %e, "Result correlation failed"),
        }

        outcome
    }
}
