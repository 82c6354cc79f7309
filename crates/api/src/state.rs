use std::sync::Arc;

use taskgate_broker::{Broker, ResultCorrelator, StreamRelay, TaskDispatcher, WorkerRegistry};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, including the result timeout.
    pub config: Arc<ServerConfig>,
    /// Appends tasks to the shared work queue.
    pub dispatcher: Arc<TaskDispatcher>,
    /// Waits for single results on the blocking path.
    pub correlator: Arc<ResultCorrelator>,
    /// Relays partial results on the streaming path.
    pub relay: Arc<StreamRelay>,
    /// Worker heartbeat records, for `/health`.
    pub workers: Arc<WorkerRegistry>,
}

impl AppState {
    /// Wire every broker-backed component to the same `broker`.
    pub fn new(config: ServerConfig, broker: Arc<dyn Broker>) -> Self {
        let dispatcher = TaskDispatcher::new(Arc::clone(&broker), config.broker.queue_key());
        let workers = WorkerRegistry::new(
            Arc::clone(&broker),
            config.broker.workers_key.clone(),
            config.broker.heartbeat_expiry_ms,
        );

        Self {
            dispatcher: Arc::new(dispatcher),
            correlator: Arc::new(ResultCorrelator::new(Arc::clone(&broker))),
            relay: Arc::new(StreamRelay::new(broker)),
            workers: Arc::new(workers),
            config: Arc::new(config),
        }
    }
}
