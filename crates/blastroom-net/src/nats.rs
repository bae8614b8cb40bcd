//! NATS-backed broker.
//!
//! Channels map one-to-one onto core NATS subjects. Leases and retained
//! values live in two JetStream key-value buckets per room:
//!
//! - `<room>-leases`: one key per lease (`lease.<name>`), value is the
//!   holder token. The bucket's `max_age` is the lease TTL, so a key that
//!   is not renewed disappears and the lease frees itself.
//! - `<room>-retained`: one key per channel (`retained.<channel>`),
//!   history of one.
//!
//! Acquisition is a compare-and-set: `create` succeeds only for an absent
//! key, renewal is `update` against the revision we last wrote.

use std::collections::HashMap;
use std::time::Duration;

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use futures::StreamExt as _;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broker::{Acquisition, Broker, Delivery, Subscription};
use crate::error::NetError;

/// A lease we currently hold: who holds it and the revision we last wrote.
#[derive(Debug, Clone)]
struct Held {
    holder: String,
    revision: u64,
}

/// Broker backed by a NATS server with JetStream enabled.
pub struct NatsBroker {
    client: async_nats::Client,
    leases: kv::Store,
    retained: kv::Store,
    held: Mutex<HashMap<String, Held>>,
}

impl NatsBroker {
    /// Connect to `url` and open (or create) the room's key-value buckets.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Nats`] if the connection or bucket setup fails.
    pub async fn connect(url: &str, room: &str, lease_ttl: Duration) -> Result<Self, NetError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| NetError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");

        let js = jetstream::new(client.clone());
        let leases = open_bucket(&js, format!("{room}-leases"), lease_ttl).await?;
        let retained = open_bucket(&js, format!("{room}-retained"), Duration::ZERO).await?;
        Ok(Self {
            client,
            leases,
            retained,
            held: Mutex::new(HashMap::new()),
        })
    }
}

async fn open_bucket(
    js: &jetstream::Context,
    bucket: String,
    max_age: Duration,
) -> Result<kv::Store, NetError> {
    if let Ok(store) = js.get_key_value(bucket.clone()).await {
        debug!(bucket = bucket, "opened key-value bucket");
        return Ok(store);
    }
    let store = js
        .create_key_value(kv::Config {
            bucket: bucket.clone(),
            history: 1,
            max_age,
            storage: jetstream::stream::StorageType::Memory,
            ..Default::default()
        })
        .await
        .map_err(|e| NetError::Nats(format!("failed to create bucket {bucket}: {e}")))?;
    info!(bucket = bucket, "created key-value bucket");
    Ok(store)
}

fn lease_key(lease: &str) -> String {
    format!("lease.{lease}")
}

fn retained_key(channel: &str) -> String {
    format!("retained.{channel}")
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), NetError> {
        self.client
            .publish(channel.to_owned(), payload.into())
            .await
            .map_err(|e| NetError::Nats(format!("failed to publish to {channel}: {e}")))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, NetError> {
        debug!(subject = channel, "subscribing");
        let subscriber = self
            .client
            .subscribe(channel.to_owned())
            .await
            .map_err(|e| NetError::Nats(format!("failed to subscribe to {channel}: {e}")))?;
        let stream = subscriber.map(|message| Delivery {
            payload: message.payload.to_vec(),
            reply: message.reply.map(|subject| subject.to_string()),
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), NetError> {
        let Some(reply) = &delivery.reply else {
            return Ok(());
        };
        self.client
            .publish(reply.clone(), "+ACK".into())
            .await
            .map_err(|e| NetError::Nats(format!("failed to ack on {reply}: {e}")))
    }

    async fn acquire(&self, lease: &str, holder: &str) -> Result<Acquisition, NetError> {
        let key = lease_key(lease);
        let mut held = self.held.lock().await;

        if let Some(current) = held.get(&key).filter(|h| h.holder == holder).cloned() {
            match self
                .leases
                .update(&key, holder.to_owned().into(), current.revision)
                .await
            {
                Ok(revision) => {
                    held.insert(key, Held { holder: holder.to_owned(), revision });
                    return Ok(Acquisition::Leader);
                }
                Err(e) => {
                    warn!(lease = lease, error = %e, "lease renewal failed");
                    held.remove(&key);
                }
            }
        }

        match self.leases.create(&key, holder.to_owned().into()).await {
            Ok(revision) => {
                debug!(lease = lease, revision, "lease acquired");
                held.insert(key, Held { holder: holder.to_owned(), revision });
                Ok(Acquisition::Leader)
            }
            Err(e) if matches!(e.kind(), kv::CreateErrorKind::AlreadyExists) => {
                Ok(Acquisition::Follower)
            }
            Err(e) => Err(NetError::Nats(format!("failed to acquire lease {lease}: {e}"))),
        }
    }

    async fn release(&self, lease: &str, holder: &str) -> Result<(), NetError> {
        let key = lease_key(lease);
        let mut held = self.held.lock().await;
        if !held.get(&key).is_some_and(|h| h.holder == holder) {
            return Ok(());
        }
        held.remove(&key);
        self.leases
            .delete(&key)
            .await
            .map_err(|e| NetError::Nats(format!("failed to release lease {lease}: {e}")))
    }

    async fn retain(&self, channel: &str, payload: Vec<u8>) -> Result<(), NetError> {
        self.retained
            .put(retained_key(channel), payload.into())
            .await
            .map(|_| ())
            .map_err(|e| NetError::Nats(format!("failed to retain on {channel}: {e}")))
    }

    async fn latest(&self, channel: &str) -> Result<Option<Vec<u8>>, NetError> {
        self.retained
            .get(retained_key(channel))
            .await
            .map(|value| value.map(|bytes| bytes.to_vec()))
            .map_err(|e| NetError::Nats(format!("failed to read retained {channel}: {e}")))
    }
}

impl std::fmt::Debug for NatsBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsBroker")
            .field("connected", &true)
            .finish_non_exhaustive()
    }
}
