//! Result notifications published by workers.
//!
//! Workers publish on `result:<taskId>`. Each payload is decoded at the
//! boundary into a [`ResultMessage`] so the end-of-stream sentinel never
//! reaches correlation or relay logic as data.

use serde_json::Value;

/// Reserved payload marking the end of a streamed result.
pub const END_OF_STREAM: &str = "END_OF_STREAM";

/// Prefix of every per-task notification channel.
pub const RESULT_CHANNEL_PREFIX: &str = "result:";

/// Channel a worker publishes results for `task_id` on.
pub fn result_channel(task_id: &str) -> String {
    format!("{RESULT_CHANNEL_PREFIX}{task_id}")
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultMessage {
    /// A full result (blocking path) or one partial result (streaming path).
    Data(Value),
    /// The stream is complete. No further messages follow.
    End,
}

/// A payload that is neither the sentinel nor valid JSON.
#[derive(Debug, thiserror::Error)]
#[error("Undecodable result payload: {source}")]
pub struct DecodeError {
    /// The payload exactly as received, kept for best-effort passthrough.
    pub raw: String,
    #[source]
    pub source: serde_json::Error,
}

impl ResultMessage {
    /// Decode one raw channel payload.
    ///
    /// The sentinel is accepted both bare (`END_OF_STREAM`) and as a JSON
    /// string (`"END_OF_STREAM"`).
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        if raw.trim() == END_OF_STREAM {
            return Ok(ResultMessage::End);
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::String(s)) if s == END_OF_STREAM => Ok(ResultMessage::End),
            Ok(value) => Ok(ResultMessage::Data(value)),
            Err(source) => Err(DecodeError {
                raw: raw.to_string(),
                source,
            }),
        }
    }
}

/// Encode a value as one NDJSON line.
pub fn encode_chunk(value: &Value) -> String {
    format!("{value}\n")
}
