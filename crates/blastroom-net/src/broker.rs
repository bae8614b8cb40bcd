//! The broker seam.
//!
//! A [`Broker`] offers named broadcast channels, explicit acknowledgement,
//! exclusive time-bounded leases, and a retained last value per channel.
//! Production uses [`crate::NatsBroker`]; tests use [`crate::MemoryBroker`].
//!
//! ```text
//! publish(room, bytes) ──► every subscriber of `room` ──► ack(delivery)
//! acquire(lease, me)   ──► Leader | Follower
//! retain(chan, bytes)  ──► latest(chan) for late joiners
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::NetError;

/// One message received from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Raw message body.
    pub payload: Vec<u8>,
    /// Where the acknowledgement goes, if the transport wants one.
    pub reply: Option<String>,
}

impl Delivery {
    /// A delivery that expects no acknowledgement.
    pub const fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            reply: None,
        }
    }
}

/// Live tail of a channel. Ends when the broker goes away.
pub type Subscription = BoxStream<'static, Delivery>;

/// Outcome of a lease acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The caller holds the lease (newly acquired or renewed).
    Leader,
    /// Somebody else holds the lease.
    Follower,
}

impl Acquisition {
    /// Whether the caller holds the lease.
    pub const fn is_leader(self) -> bool {
        matches!(self, Self::Leader)
    }
}

/// Message broker operations the distribution client depends on.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Broadcast `payload` to every subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), NetError>;

    /// Start a live tail of `channel`. Only messages published after this
    /// call returns are delivered.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, NetError>;

    /// Acknowledge a delivery.
    async fn ack(&self, delivery: &Delivery) -> Result<(), NetError>;

    /// Try to take, or renew, the exclusive lease `lease` for `holder`.
    ///
    /// Calling again while holding the lease renews it. A lease that is not
    /// renewed expires on its own, after which another holder may take it.
    async fn acquire(&self, lease: &str, holder: &str) -> Result<Acquisition, NetError>;

    /// Give up `lease` if `holder` has it. Releasing a lease held by someone
    /// else does nothing.
    async fn release(&self, lease: &str, holder: &str) -> Result<(), NetError>;

    /// Store `payload` as the last value of `channel`.
    async fn retain(&self, channel: &str, payload: Vec<u8>) -> Result<(), NetError>;

    /// The last value stored with [`Broker::retain`], if any.
    async fn latest(&self, channel: &str) -> Result<Option<Vec<u8>>, NetError>;
}
