//! Redis implementation of [`Broker`].
//!
//! [`RedisBroker`] owns one lazily-established multiplexed connection used
//! for queue appends and hash reads, and opens a fresh pub/sub connection
//! for every subscription. Create it once at startup with
//! [`RedisBroker::connect`] and tear it down with [`RedisBroker::shutdown`].

use std::collections::HashMap;

use ::redis::aio::{MultiplexedConnection, PubSub};
use ::redis::AsyncCommands;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::broker::{Broker, Subscription};
use crate::error::BrokerError;

/// Broker backed by a Redis server.
pub struct RedisBroker {
    client: ::redis::Client,
    /// Shared dispatch connection. `None` until first use or after a
    /// connection-level failure, in which case the next call reconnects.
    dispatch: RwLock<Option<MultiplexedConnection>>,
}

impl RedisBroker {
    /// Validate `url` without connecting.
    pub fn new(url: &str) -> Result<Self, BrokerError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| BrokerError::Connection(format!("Invalid broker URL: {e}")))?;

        Ok(Self {
            client,
            dispatch: RwLock::new(None),
        })
    }

    /// Create a broker and establish the dispatch connection eagerly, so
    /// startup fails fast when the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let broker = Self::new(url)?;
        broker.dispatch_connection().await?;
        tracing::info!("Connected to Redis");
        Ok(broker)
    }

    /// Drop the dispatch connection. Later calls reconnect lazily.
    pub async fn shutdown(&self) {
        if self.dispatch.write().await.take().is_some() {
            tracing::info!("Redis dispatch connection closed");
        }
    }

    /// Return a handle to the shared dispatch connection, establishing it on
    /// first use. Multiplexed handles are cheap to clone.
    async fn dispatch_connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        if let Some(conn) = self.dispatch.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut guard = self.dispatch.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        tracing::debug!("Redis dispatch connection established");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget a broken dispatch connection so the next call reconnects.
    async fn reset_on_connection_error(&self, err: &BrokerError) {
        if err.is_connection() {
            tracing::warn!(error = %err, "Discarding Redis dispatch connection");
            self.dispatch.write().await.take();
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push(&self, queue: &str, payload: String) -> Result<u64, BrokerError> {
        let mut conn = self.dispatch_connection().await?;
        let result: Result<u64, BrokerError> =
            conn.rpush(queue, payload).await.map_err(BrokerError::from);
        if let Err(err) = &result {
            self.reset_on_connection_error(err).await;
        }
        result
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BrokerError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        pubsub.subscribe(channel).await?;
        tracing::debug!(channel, "Subscribed");

        Ok(Box::new(RedisSubscription {
            pubsub,
            channel: channel.to_string(),
        }))
    }

    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>, BrokerError> {
        let mut conn = self.dispatch_connection().await?;
        let result: Result<HashMap<String, String>, BrokerError> =
            conn.hgetall(key).await.map_err(BrokerError::from);
        if let Err(err) = &result {
            self.reset_on_connection_error(err).await;
        }
        result
    }
}

/// A pub/sub connection subscribed to one channel.
struct RedisSubscription {
    pubsub: PubSub,
    channel: String,
}

#[async_trait]
impl Subscription for RedisSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Result<Option<String>, BrokerError> {
        let mut messages = self.pubsub.on_message();
        while let Some(msg) = messages.next().await {
            if msg.get_channel_name() != self.channel {
                continue;
            }
            return Ok(Some(payload_text(msg.get_payload_bytes())));
        }
        Ok(None)
    }

    async fn close(self: Box<Self>) {
        let RedisSubscription {
            mut pubsub,
            channel,
        } = *self;

        if let Err(e) = pubsub.unsubscribe(&channel).await {
            tracing::warn!(channel = %channel, error = %e, "Failed to unsubscribe");
        }
        // Dropping the pub/sub handle closes its connection.
        drop(pubsub);
        tracing::debug!(channel = %channel, "Subscriber closed");
    }
}

/// Payload as text. Invalid UTF-8 is replaced rather than rejected so the
/// message still reaches the decoder and its raw fallback.
fn payload_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
