//! Task dispatch and result correlation over a message broker.
//!
//! This crate provides the moving parts between the HTTP layer and the
//! out-of-process workers:
//!
//! - [`Broker`] / [`Subscription`]: the broker seam. [`RedisBroker`] is the
//!   production implementation; [`MemoryBroker`] runs in-process for tests
//!   and local development.
//! - [`TaskDispatcher`]: appends serialized tasks to the shared work queue.
//! - [`ResultCorrelator`]: waits for the single result of a task, bounded
//!   by a deadline.
//! - [`StreamRelay`]: turns a task's partial results into a cancellable
//!   NDJSON chunk stream.
//! - [`WorkerRegistry`]: reads worker heartbeat records.

pub mod broker;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod redis_broker;
pub mod relay;
pub mod workers;

pub use broker::{Broker, Subscription};
pub use config::{BrokerConfig, ConfigError};
pub use correlator::ResultCorrelator;
pub use dispatcher::TaskDispatcher;
pub use error::{BrokerError, CorrelationError, EnqueueError, RelayError};
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;
pub use relay::{ChunkStream, StreamRelay};
pub use workers::WorkerRegistry;
