//! In-process broker.
//!
//! Clones share one set of channels, leases, and retained values, so several
//! distribution clients built on clones of the same [`MemoryBroker`] behave
//! like peers on one server. Leases never time out by themselves; tests call
//! [`MemoryBroker::expire`] to simulate a holder that stopped renewing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

use crate::broker::{Acquisition, Broker, Delivery, Subscription};
use crate::error::NetError;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Inner {
    channels: HashMap<String, broadcast::Sender<Delivery>>,
    leases: BTreeMap<String, String>,
    retained: BTreeMap<String, Vec<u8>>,
    published: u64,
    acked: u64,
}

impl Inner {
    fn sender(&mut self, channel: &str) -> broadcast::Sender<Delivery> {
        self.channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// A broker that lives entirely in this process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop `lease` regardless of holder, as if its TTL ran out.
    pub async fn expire(&self, lease: &str) {
        self.inner.lock().await.leases.remove(lease);
    }

    /// Current holder of `lease`.
    pub async fn holder(&self, lease: &str) -> Option<String> {
        self.inner.lock().await.leases.get(lease).cloned()
    }

    /// Messages published so far, across all channels.
    pub async fn published(&self) -> u64 {
        self.inner.lock().await.published
    }

    /// Deliveries acknowledged so far.
    pub async fn acked(&self) -> u64 {
        self.inner.lock().await.acked
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), NetError> {
        let mut inner = self.inner.lock().await;
        inner.published = inner.published.saturating_add(1);
        let receivers = inner.sender(channel).send(Delivery::new(payload)).unwrap_or(0);
        debug!(channel, receivers, "memory publish");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, NetError> {
        let rx = self.inner.lock().await.sender(channel).subscribe();
        let channel = channel.to_owned();
        let stream = futures::stream::unfold((rx, channel), |(mut rx, channel)| async move {
            loop {
                match rx.recv().await {
                    Ok(delivery) => return Some((delivery, (rx, channel))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), NetError> {
        let mut inner = self.inner.lock().await;
        inner.acked = inner.acked.saturating_add(1);
        Ok(())
    }

    async fn acquire(&self, lease: &str, holder: &str) -> Result<Acquisition, NetError> {
        let mut inner = self.inner.lock().await;
        match inner.leases.get(lease) {
            Some(current) if current != holder => Ok(Acquisition::Follower),
            _ => {
                inner.leases.insert(lease.to_owned(), holder.to_owned());
                Ok(Acquisition::Leader)
            }
        }
    }

    async fn release(&self, lease: &str, holder: &str) -> Result<(), NetError> {
        let mut inner = self.inner.lock().await;
        if inner.leases.get(lease).is_some_and(|current| current == holder) {
            inner.leases.remove(lease);
        }
        Ok(())
    }

    async fn retain(&self, channel: &str, payload: Vec<u8>) -> Result<(), NetError> {
        self.inner
            .lock()
            .await
            .retained
            .insert(channel.to_owned(), payload);
        Ok(())
    }

    async fn latest(&self, channel: &str) -> Result<Option<Vec<u8>>, NetError> {
        Ok(self.inner.lock().await.retained.get(channel).cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt as _;

    use super::*;

    #[tokio::test]
    async fn subscribers_only_see_later_messages() {
        let broker = MemoryBroker::new();
        broker.publish("lobby", b"early".to_vec()).await.unwrap();
        let mut sub = broker.subscribe("lobby").await.unwrap();
        broker.publish("lobby", b"late".to_vec()).await.unwrap();
        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.payload, b"late".to_vec());
        assert_eq!(broker.published().await, 2);
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let broker = MemoryBroker::new();
        let mut obstacle = broker.subscribe("lobby-obstacle").await.unwrap();
        broker.publish("lobby", b"move".to_vec()).await.unwrap();
        broker.publish("lobby-obstacle", b"layout".to_vec()).await.unwrap();
        assert_eq!(obstacle.next().await.unwrap().payload, b"layout".to_vec());
    }

    #[tokio::test]
    async fn lease_is_exclusive_and_renewable() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.acquire("l", "a").await.unwrap(), Acquisition::Leader);
        assert_eq!(broker.acquire("l", "b").await.unwrap(), Acquisition::Follower);
        assert_eq!(broker.acquire("l", "a").await.unwrap(), Acquisition::Leader);
    }

    #[tokio::test]
    async fn release_by_non_holder_is_ignored() {
        let broker = MemoryBroker::new();
        broker.acquire("l", "a").await.unwrap();
        broker.release("l", "b").await.unwrap();
        assert_eq!(broker.holder("l").await.as_deref(), Some("a"));
        broker.release("l", "a").await.unwrap();
        assert!(broker.holder("l").await.is_none());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let broker = MemoryBroker::new();
        broker.acquire("l", "a").await.unwrap();
        broker.expire("l").await;
        assert_eq!(broker.acquire("l", "b").await.unwrap(), Acquisition::Leader);
    }

    #[tokio::test]
    async fn retained_value_is_last_write() {
        let broker = MemoryBroker::new();
        assert!(broker.latest("c").await.unwrap().is_none());
        broker.retain("c", b"1".to_vec()).await.unwrap();
        broker.retain("c", b"2".to_vec()).await.unwrap();
        assert_eq!(broker.latest("c").await.unwrap(), Some(b"2".to_vec()));
    }
}
