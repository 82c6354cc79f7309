//! Domain types for the task gateway.
//!
//! Everything in this crate is pure: task records and request validation,
//! decoding of result notifications, channel and queue naming, and worker
//! heartbeat classification. Broker I/O lives in `taskgate-broker`.

pub mod error;
pub mod heartbeat;
pub mod message;
pub mod task;
pub mod types;
