//! In-process implementation of [`Broker`].
//!
//! [`MemoryBroker`] mirrors the Redis semantics the gateway relies on: FIFO
//! lists, fire-and-forget pub/sub with no history (a message published
//! before anyone subscribes is dropped), and hashes. It also exposes the
//! worker side of the protocol (`pop_task`, `publish`, `set_hash_field`) and
//! counts open subscriptions, which makes it the broker of choice in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::broker::{Broker, Subscription};
use crate::error::BrokerError;

/// Per-channel buffer. Slow subscribers beyond this lag and lose messages.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct MemoryState {
    queues: HashMap<String, VecDeque<String>>,
    channels: HashMap<String, broadcast::Sender<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Broker that lives entirely in this process.
#[derive(Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
    open_subscriptions: Arc<AtomicUsize>,
    unavailable: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every broker call fail with [`BrokerError::Unavailable`] (or
    /// succeed again when `false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of subscriptions currently open (not yet closed or dropped).
    pub fn open_subscriptions(&self) -> usize {
        self.open_subscriptions.load(Ordering::SeqCst)
    }

    /// Number of subscribers currently listening on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Number of channels with at least one live subscriber.
    pub fn active_channels(&self) -> usize {
        self.lock().channels.len()
    }

    /// Worker side: take the task at the head of `queue`.
    pub fn pop_task(&self, queue: &str) -> Option<String> {
        self.lock().queues.get_mut(queue)?.pop_front()
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Worker side: publish `payload` on `channel`, returning how many
    /// subscribers received it.
    pub fn publish(&self, channel: &str, payload: impl Into<String>) -> usize {
        let mut state = self.lock();
        let Some(sender) = state.channels.get(channel) else {
            return 0;
        };
        match sender.send(payload.into()) {
            Ok(receivers) => receivers,
            Err(_) => {
                // Nobody is listening any more; forget the channel.
                state.channels.remove(channel);
                0
            }
        }
    }

    /// Worker side: write one field of a hash.
    pub fn set_hash_field(&self, key: &str, field: &str, value: impl Into<String>) {
        self.lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BrokerError::Unavailable("in-memory broker disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push(&self, queue: &str, payload: String) -> Result<u64, BrokerError> {
        self.check_available()?;
        let mut state = self.lock();
        let list = state.queues.entry(queue.to_string()).or_default();
        list.push_back(payload);
        Ok(list.len() as u64)
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BrokerError> {
        self.check_available()?;
        let receiver = self
            .lock()
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        self.open_subscriptions.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            receiver,
            state: Arc::clone(&self.state),
            open_subscriptions: Arc::clone(&self.open_subscriptions),
            released: false,
        }))
    }

    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>, BrokerError> {
        self.check_available()?;
        Ok(self.lock().hashes.get(key).cloned().unwrap_or_default())
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MemorySubscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
    state: Arc<Mutex<MemoryState>>,
    open_subscriptions: Arc<AtomicUsize>,
    released: bool,
}

impl MemorySubscription {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open_subscriptions.fetch_sub(1, Ordering::SeqCst);

            // The last subscriber forgets the channel.
            let mut state = lock_state(&self.state);
            let last = state
                .channels
                .get(&self.channel)
                .is_some_and(|sender| sender.receiver_count() <= 1);
            if last {
                state.channels.remove(&self.channel);
            }
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Result<Option<String>, BrokerError> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Ok(Some(payload)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = %self.channel, skipped, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn close(mut self: Box<Self>) {
        self.release();
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn push_is_fifo_and_reports_length() {
        let broker = MemoryBroker::new();

        assert_eq!(broker.push("q", "a".into()).await.unwrap(), 1);
        assert_eq!(broker.push("q", "b".into()).await.unwrap(), 2);

        assert_eq!(broker.pop_task("q").as_deref(), Some("a"));
        assert_eq!(broker.pop_task("q").as_deref(), Some("b"));
        assert_eq!(broker.pop_task("q"), None);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.publish("result:t", "{}"), 0);

        // A later subscriber does not see the earlier message.
        let mut sub = broker.subscribe("result:t").await.unwrap();
        assert_eq!(broker.publish("result:t", "\"late\""), 1);
        assert_eq!(sub.next_message().await.unwrap().as_deref(), Some("\"late\""));
    }

    #[tokio::test]
    async fn close_and_drop_both_release_the_subscription() {
        let broker = MemoryBroker::new();

        let a = broker.subscribe("c").await.unwrap();
        let b = broker.subscribe("c").await.unwrap();
        assert_eq!(broker.open_subscriptions(), 2);
        assert_eq!(broker.subscriber_count("c"), 2);

        a.close().await;
        assert_eq!(broker.open_subscriptions(), 1);

        drop(b);
        assert_eq!(broker.open_subscriptions(), 0);
        assert_eq!(broker.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn channel_is_forgotten_when_its_last_subscriber_leaves() {
        let broker = MemoryBroker::new();

        let a = broker.subscribe("result:a").await.unwrap();
        let b = broker.subscribe("result:a").await.unwrap();
        let other = broker.subscribe("result:b").await.unwrap();
        assert_eq!(broker.active_channels(), 2);

        a.close().await;
        assert_eq!(broker.active_channels(), 2);

        drop(b);
        assert_eq!(broker.active_channels(), 1);

        other.close().await;
        assert_eq!(broker.active_channels(), 0);
    }

    #[tokio::test]
    async fn unavailable_broker_fails_every_call() {
        let broker = MemoryBroker::new();
        broker.set_unavailable(true);

        assert_matches!(broker.push("q", "x".into()).await, Err(BrokerError::Unavailable(_)));
        assert_matches!(broker.subscribe("c").await.err(), Some(BrokerError::Unavailable(_)));
        assert_matches!(broker.read_hash("h").await, Err(BrokerError::Unavailable(_)));
        assert_eq!(broker.open_subscriptions(), 0);
    }

    #[tokio::test]
    async fn missing_hash_reads_empty() {
        let broker = MemoryBroker::new();
        assert!(broker.read_hash("workers").await.unwrap().is_empty());

        broker.set_hash_field("workers", "w1", "{}");
        assert_eq!(broker.read_hash("workers").await.unwrap().len(), 1);
    }
}
