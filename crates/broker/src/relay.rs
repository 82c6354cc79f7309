//! Relays a task's partial results as an NDJSON chunk stream.
//!
//! [`StreamRelay::open_stream`] subscribes to `result:<taskId>` right away
//! and spawns a forwarding task that hands chunks to the consumer through a
//! one-slot channel. The forwarder stops, unsubscribes and disconnects on
//! the first of:
//!
//! - the end-of-stream sentinel (the stream ends normally),
//! - the consumer dropping the [`ChunkStream`] (client disconnect),
//! - gateway shutdown,
//! - a broker failure (one error item is emitted first).
//!
//! There is no deadline on this path: a stalled worker keeps the stream open
//! until the consumer goes away.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use taskgate_core::message::{encode_chunk, result_channel, ResultMessage};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, Subscription};
use crate::error::RelayError;

/// Lazily produced, finite sequence of NDJSON lines for one task.
pub type ChunkStream = ReceiverStream<Result<Bytes, RelayError>>;

/// Hand at most one chunk to the consumer at a time.
const CHUNK_BUFFER: usize = 1;

pub struct StreamRelay {
    broker: Arc<dyn Broker>,
    /// Cancelled on gateway shutdown; every forwarder watches a child token.
    shutdown: CancellationToken,
}

impl StreamRelay {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            shutdown: CancellationToken::new(),
        }
    }

    /// Subscribe to the task's channel and start forwarding.
    ///
    /// Fails only if the subscription cannot be opened. Opening a stream for
    /// a task that already finished waits forever, since the channel keeps
    /// no history.
    pub async fn open_stream(&self, task_id: &str) -> Result<ChunkStream, RelayError> {
        let channel = result_channel(task_id);
        let subscription = self.broker.subscribe(&channel).await.map_err(|e| {
            tracing::error!(task_id, error = %e, "Stream subscription failed");
            RelayError::Subscribe(e)
        })?;

        tracing::debug!(task_id, channel = subscription.channel(), "Stream relay opened");

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        tokio::spawn(forward(
            task_id.to_string(),
            subscription,
            tx,
            self.shutdown.child_token(),
        ));

        Ok(ReceiverStream::new(rx))
    }

    /// Stop every active forwarder.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Forwarding loop owned by one stream. Always closes `subscription`.
async fn forward(
    task_id: String,
    mut subscription: Box<dyn Subscription>,
    tx: mpsc::Sender<Result<Bytes, RelayError>>,
    cancel: CancellationToken,
) {
    let mut forwarded = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::info!(task_id = %task_id, forwarded, "Stream consumer disconnected");
                break;
            }
            _ = cancel.cancelled() => {
                tracing::info!(task_id = %task_id, forwarded, "Stream relay cancelled");
                break;
            }
            next = subscription.next_message() => next,
        };

        let raw = match next {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::warn!(task_id = %task_id, forwarded, "Result channel closed before end of stream");
                let _ = tx.send(Err(RelayError::Closed)).await;
                break;
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Result stream failed");
                let _ = tx.send(Err(RelayError::Receive(e))).await;
                break;
            }
        };

        let line = match ResultMessage::decode(&raw) {
            Ok(ResultMessage::End) => {
                tracing::info!(task_id = %task_id, chunks = forwarded, "Stream complete");
                break;
            }
            Ok(ResultMessage::Data(value)) => encode_chunk(&value),
            Err(e) => {
                tracing::warn!(
                    task_id = %task_id,
                    error = %e,
                    "Forwarding undecodable stream message as a string",
                );
                encode_chunk(&Value::String(e.raw))
            }
        };

        if tx.send(Ok(Bytes::from(line))).await.is_err() {
            tracing::info!(task_id = %task_id, forwarded, "Stream consumer disconnected");
            break;
        }
        forwarded += 1;
        tracing::trace!(task_id = %task_id, forwarded, "Stream chunk forwarded");
    }

    subscription.close().await;
}
