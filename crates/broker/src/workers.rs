//! Worker liveness as seen through the broker.

use std::sync::Arc;

use taskgate_core::heartbeat::{worker_status, WorkerStatus};

use crate::broker::Broker;
use crate::error::BrokerError;

/// Reads the heartbeat hash workers maintain and reports their liveness.
pub struct WorkerRegistry {
    broker: Arc<dyn Broker>,
    key: String,
    expiry_ms: i64,
}

impl WorkerRegistry {
    pub fn new(broker: Arc<dyn Broker>, key: impl Into<String>, expiry_ms: i64) -> Self {
        Self {
            broker,
            key: key.into(),
            expiry_ms,
        }
    }

    /// Status of every registered worker, sorted by worker id.
    ///
    /// Records that cannot be parsed are logged and skipped.
    pub async fn statuses(&self) -> Result<Vec<WorkerStatus>, BrokerError> {
        let records = self.broker.read_hash(&self.key).await?;
        let now = chrono::Utc::now();

        let mut statuses: Vec<WorkerStatus> = records
            .iter()
            .filter_map(|(worker_id, raw)| {
                match worker_status(worker_id, raw, now, self.expiry_ms) {
                    Ok(status) => Some(status),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping worker record");
                        None
                    }
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use taskgate_core::heartbeat::WorkerHealth;

    use super::*;
    use crate::memory::MemoryBroker;

    #[tokio::test]
    async fn reports_alive_and_down_workers_and_skips_garbage() {
        let broker = Arc::new(MemoryBroker::new());
        let now = chrono::Utc::now().timestamp_millis();
        broker.set_hash_field(
            "workers:registered",
            "w-b",
            format!(r#"{{"created_at":{},"last_heartbeat_at":{}}}"#, now - 60_000, now - 1_000),
        );
        broker.set_hash_field(
            "workers:registered",
            "w-a",
            format!(r#"{{"created_at":{},"last_heartbeat_at":{}}}"#, now - 60_000, now - 30_000),
        );
        broker.set_hash_field("workers:registered", "w-c", "not json");

        let registry = WorkerRegistry::new(broker, "workers:registered", 15_000);
        let statuses = registry.statuses().await.unwrap();

        let summary: Vec<(&str, WorkerHealth)> = statuses
            .iter()
            .map(|s| (s.worker_id.as_str(), s.status))
            .collect();
        assert_eq!(
            summary,
            vec![("w-a", WorkerHealth::Down), ("w-b", WorkerHealth::Alive)]
        );
    }

    #[tokio::test]
    async fn broker_failure_is_returned() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_unavailable(true);

        let registry = WorkerRegistry::new(broker, "workers:registered", 15_000);
        assert!(registry.statuses().await.is_err());
    }
}
