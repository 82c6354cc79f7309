//! Worker liveness derived from heartbeat records.
//!
//! Workers register themselves in a broker hash (field = worker id, value =
//! JSON record with epoch-millisecond timestamps) and refresh
//! `last_heartbeat_at` periodically. The gateway only reads these records.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// A worker whose last heartbeat is older than this is reported as down.
/// Matches the TTL workers use when refreshing their record.
pub const DEFAULT_HEARTBEAT_EXPIRY_MS: i64 = 15_000;

/// Broker hash holding one record per registered worker.
pub const DEFAULT_WORKERS_KEY: &str = "workers:registered";

/// Raw record as written by a worker.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerRecord {
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub last_heartbeat_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Alive,
    Down,
}

/// Liveness report for one worker, as returned by the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub created_at: Option<Timestamp>,
    pub last_heartbeat_at: Option<Timestamp>,
    pub status: WorkerHealth,
}

/// Parse the JSON value stored for `worker_id`.
pub fn parse_worker_record(worker_id: &str, raw: &str) -> Result<WorkerRecord, CoreError> {
    serde_json::from_str(raw).map_err(|e| CoreError::MalformedWorkerRecord {
        worker_id: worker_id.to_string(),
        reason: e.to_string(),
    })
}

/// A worker is alive when its last heartbeat is strictly younger than
/// `expiry_ms`. A worker that never sent a heartbeat is down, as is one
/// whose age does not fit in an `i64`.
pub fn classify(last_heartbeat_ms: Option<i64>, now_ms: i64, expiry_ms: i64) -> WorkerHealth {
    let alive = last_heartbeat_ms
        .and_then(|last| now_ms.checked_sub(last))
        .is_some_and(|age| age < expiry_ms);

    if alive {
        WorkerHealth::Alive
    } else {
        WorkerHealth::Down
    }
}

/// Build the status report for one hash entry.
pub fn worker_status(
    worker_id: &str,
    raw: &str,
    now: Timestamp,
    expiry_ms: i64,
) -> Result<WorkerStatus, CoreError> {
    let record = parse_worker_record(worker_id, raw)?;

    Ok(WorkerStatus {
        worker_id: worker_id.to_string(),
        created_at: record.created_at.and_then(DateTime::from_timestamp_millis),
        last_heartbeat_at: record
            .last_heartbeat_at
            .and_then(DateTime::from_timestamp_millis),
        status: classify(record.last_heartbeat_at, now.timestamp_millis(), expiry_ms),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn recent_heartbeat_is_alive() {
        assert_eq!(classify(Some(10_000), 20_000, 15_000), WorkerHealth::Alive);
    }

    #[test]
    fn heartbeat_at_expiry_is_down() {
        assert_eq!(classify(Some(5_000), 20_000, 15_000), WorkerHealth::Down);
    }

    #[test]
    fn missing_heartbeat_is_down() {
        assert_eq!(classify(None, 20_000, 15_000), WorkerHealth::Down);
    }

    #[test]
    fn out_of_range_heartbeat_is_down() {
        assert_eq!(classify(Some(i64::MIN), 20_000, 15_000), WorkerHealth::Down);

        let now = DateTime::from_timestamp_millis(1_700_000_010_000).unwrap();
        let raw = r#"{"created_at":0,"last_heartbeat_at":-9223372036854775808}"#;
        let status = worker_status("w-3", raw, now, DEFAULT_HEARTBEAT_EXPIRY_MS).unwrap();
        assert_eq!(status.status, WorkerHealth::Down);
        assert_eq!(status.last_heartbeat_at, None);
    }

    #[test]
    fn status_converts_millis_to_timestamps() {
        let now = DateTime::from_timestamp_millis(1_700_000_010_000).unwrap();
        let raw = r#"{"created_at":1700000000000,"last_heartbeat_at":1700000005000}"#;

        let status = worker_status("w-1", raw, now, DEFAULT_HEARTBEAT_EXPIRY_MS).unwrap();

        assert_eq!(status.worker_id, "w-1");
        assert_eq!(status.status, WorkerHealth::Alive);
        assert_eq!(
            status.created_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "alive");
        assert!(json["last_heartbeat_at"].is_string());
    }

    #[test]
    fn malformed_record_names_the_worker() {
        let now = DateTime::from_timestamp_millis(0).unwrap();
        let err = worker_status("w-2", "oops", now, DEFAULT_HEARTBEAT_EXPIRY_MS).unwrap_err();
        assert_matches!(err, CoreError::MalformedWorkerRecord { worker_id, .. } if worker_id == "w-2");
    }
}
