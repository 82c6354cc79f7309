//! Error types for broker I/O and the operations built on it.

use std::time::Duration;

use taskgate_core::message::DecodeError;

// ---------------------------------------------------------------------------
// BrokerError
// ---------------------------------------------------------------------------

/// Failure talking to the message broker.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The connection could not be established or was lost.
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// The broker rejected or failed a command.
    #[error("Broker command failed: {0}")]
    Command(String),

    /// The broker is deliberately unavailable (shut down or disabled).
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    pub fn is_connection(&self) -> bool {
        matches!(self, BrokerError::Connection(_))
    }
}

impl From<::redis::RedisError> for BrokerError {
    fn from(err: ::redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            BrokerError::Connection(err.to_string())
        } else {
            BrokerError::Command(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// EnqueueError
// ---------------------------------------------------------------------------

/// Failure appending a task to the work queue.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// The task reached the dispatcher without an id.
    #[error("Task id must be assigned before enqueue")]
    MissingTaskId,

    #[error("Failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to enqueue task: {0}")]
    Broker(#[from] BrokerError),
}

// ---------------------------------------------------------------------------
// CorrelationError
// ---------------------------------------------------------------------------

/// Failure waiting for the single result of a task.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// No message arrived before the deadline. The task may still finish.
    #[error("Timeout: no result for task {task_id} within {timeout:?}")]
    Timeout { task_id: String, timeout: Duration },

    #[error("Failed to subscribe to result channel: {0}")]
    Subscribe(#[source] BrokerError),

    /// The result arrived but is not valid JSON. Carries the raw payload.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Result subscription failed: {0}")]
    Receive(#[source] BrokerError),

    #[error("Result channel closed before a result arrived")]
    Closed,

    /// The end-of-stream sentinel arrived where a result was expected.
    #[error("Task {task_id} ended without producing a result")]
    Ended { task_id: String },
}

// ---------------------------------------------------------------------------
// RelayError
// ---------------------------------------------------------------------------

/// Failure opening or driving a result stream.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to subscribe to result channel: {0}")]
    Subscribe(#[source] BrokerError),

    #[error("Result stream failed: {0}")]
    Receive(#[source] BrokerError),

    #[error("Result channel closed before end of stream")]
    Closed,
}
