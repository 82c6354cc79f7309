//! The broker seam.
//!
//! The gateway needs three things from a broker: append to a list, subscribe
//! to a single pub/sub channel, and read a hash. [`Broker`] captures exactly
//! that so the dispatcher, correlator and relay never see a concrete client.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BrokerError;

/// Shared broker handle.
///
/// Implementations must be safe to call concurrently: `push` and `read_hash`
/// go over a shared dispatch connection, `subscribe` opens a new connection
/// per call.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append `payload` to the tail of `queue`, returning the queue length
    /// after the append.
    async fn push(&self, queue: &str, payload: String) -> Result<u64, BrokerError>;

    /// Open a dedicated connection subscribed to `channel`.
    ///
    /// Returns once the subscription is acknowledged. Messages published
    /// before that point are not delivered.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BrokerError>;

    /// Read every field of the hash stored at `key`. A missing key reads as
    /// an empty map.
    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>, BrokerError>;
}

/// An open subscription to one channel, owned by exactly one consumer.
///
/// Call [`close`](Subscription::close) to unsubscribe and disconnect.
/// Dropping an unclosed subscription still releases its connection, without
/// the unsubscribe round trip.
#[async_trait]
pub trait Subscription: Send {
    /// The channel this subscription listens on.
    fn channel(&self) -> &str;

    /// Wait for the next payload on the channel.
    ///
    /// Returns `Ok(None)` when the subscription ended without a message.
    async fn next_message(&mut self) -> Result<Option<String>, BrokerError>;

    /// Unsubscribe and disconnect. Failures are logged, not returned.
    async fn close(self: Box<Self>);
}
