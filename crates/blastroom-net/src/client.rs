//! The distribution client.
//!
//! One client per process and room. It owns every broker resource the
//! process uses and runs four background tasks:
//!
//! - **primary receiver**: tails `<room>`, acks each delivery at once,
//!   decodes it, and forwards the event to the inbound queue
//! - **obstacle receiver**: the same for `<room>-obstacle`
//! - **publisher**: drains the bounded outbound queue onto `<room>`
//! - **maintainer**: on every refresh interval renews the identity lease
//!   and tries to take the obstacle leadership; the leader samples a new
//!   layout, publishes it, and retains it for late joiners. If another
//!   process has taken the identity lease, the maintainer gives up the
//!   leadership, flags the client, and stops; [`DistributionClient::ensure_identity`]
//!   reports the collision from then on
//!
//! Leases are held under a random per-process token, so two processes
//! using the same identity collide on the identity lease even though they
//! share a name.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use blastroom_events::{Event, decode, encode};
use blastroom_types::Grid;
use futures::StreamExt as _;
use rand::Rng as _;
use rand::distr::Alphanumeric;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::broker::{Acquisition, Broker, Subscription};
use crate::error::NetError;
use crate::layout::sample_layout;

/// Received payloads are logged up to this many bytes.
const PREVIEW_BYTES: usize = 100;

const TOKEN_LEN: usize = 12;

/// Everything the client needs to join a room.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Room name; also the primary channel name.
    pub room: String,
    /// This process's player identity, unique within the room.
    pub identity: String,
    /// Arena dimensions, used to sample obstacle layouts.
    pub grid: Grid,
    /// One cell in this many becomes an obstacle.
    pub density_ratio: u32,
    /// How often leases are renewed and the leader republishes.
    pub obstacle_refresh: Duration,
    /// Outbound queue size; events beyond it are dropped.
    pub outbound_capacity: usize,
    /// Inbound queue size.
    pub inbound_capacity: usize,
}

impl ClientSettings {
    /// Channel carrying every player and bomb event.
    pub fn primary_channel(&self) -> &str {
        &self.room
    }

    /// Channel carrying obstacle layouts.
    pub fn obstacle_channel(&self) -> String {
        format!("{}-obstacle", self.room)
    }

    /// Lease that makes the identity unique in the room.
    pub fn identity_lease(&self) -> String {
        format!("{}.identity.{}", self.room, self.identity)
    }

    /// Lease whose holder publishes obstacle layouts.
    pub fn leader_lease(&self) -> String {
        format!("{}.obstacle-leader", self.room)
    }
}

/// Cloneable handle for queueing outbound events.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Event>,
}

impl Publisher {
    /// Queue `event` for publishing without waiting.
    ///
    /// Returns `false` if the event was dropped because the queue is full or
    /// the client has shut down.
    pub fn submit(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(kind = %event.kind(), "outbound queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(kind = %event.kind(), "outbound queue closed, dropping event");
                false
            }
        }
    }
}

/// A live connection to one room.
pub struct DistributionClient {
    broker: Arc<dyn Broker>,
    settings: ClientSettings,
    token: String,
    publisher: Publisher,
    inbound: mpsc::Receiver<Event>,
    leading: Arc<AtomicBool>,
    identity_lost: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DistributionClient {
    /// Join the room.
    ///
    /// Claims the identity, queues the retained obstacle layout (if any) as
    /// the first inbound event, then starts the live tails and background
    /// tasks.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::DuplicateIdentity`] if another live process holds
    /// the identity, or [`NetError::Nats`] if the broker refuses a setup step.
    pub async fn connect(broker: Arc<dyn Broker>, settings: ClientSettings) -> Result<Self, NetError> {
        let token = instance_token();
        let identity_lease = settings.identity_lease();
        if !broker.acquire(&identity_lease, &token).await?.is_leader() {
            return Err(NetError::DuplicateIdentity {
                identity: settings.identity.clone(),
                room: settings.room.clone(),
            });
        }
        info!(room = settings.room, identity = settings.identity, "identity claimed");

        let obstacle_channel = settings.obstacle_channel();
        let primary = broker.subscribe(settings.primary_channel()).await?;
        let obstacles = broker.subscribe(&obstacle_channel).await?;

        let (inbound_tx, inbound) = mpsc::channel(settings.inbound_capacity.max(1));
        match broker.latest(&obstacle_channel).await? {
            Some(payload) => match decode(&payload) {
                Ok(event) => {
                    info!(channel = obstacle_channel, "loaded retained obstacle layout");
                    if inbound_tx.try_send(event).is_err() {
                        warn!("inbound queue full, retained layout dropped");
                    }
                }
                Err(e) => warn!(channel = obstacle_channel, error = %e, "retained layout is unreadable"),
            },
            None => debug!(channel = obstacle_channel, "no retained obstacle layout"),
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity.max(1));
        let leading = Arc::new(AtomicBool::new(false));
        let identity_lost = Arc::new(AtomicBool::new(false));
        let tasks = vec![
            tokio::spawn(receive(
                Arc::clone(&broker),
                primary,
                inbound_tx.clone(),
                settings.room.clone(),
            )),
            tokio::spawn(receive(
                Arc::clone(&broker),
                obstacles,
                inbound_tx,
                obstacle_channel,
            )),
            tokio::spawn(publish_outbound(
                Arc::clone(&broker),
                outbound_rx,
                settings.room.clone(),
            )),
            tokio::spawn(maintain(
                Arc::clone(&broker),
                settings.clone(),
                token.clone(),
                Arc::clone(&leading),
                Arc::clone(&identity_lost),
            )),
        ];

        Ok(Self {
            broker,
            settings,
            token,
            publisher: Publisher { tx: outbound_tx },
            inbound,
            leading,
            identity_lost,
            tasks,
        })
    }

    /// A handle for queueing outbound events.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Whether this process currently publishes obstacle layouts.
    pub fn is_leader(&self) -> bool {
        self.leading.load(Ordering::Relaxed)
    }

    /// Check that this process still holds its identity.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::DuplicateIdentity`] once a renewal found the
    /// identity lease held by another process.
    pub fn ensure_identity(&self) -> Result<(), NetError> {
        if self.identity_lost.load(Ordering::Relaxed) {
            return Err(NetError::DuplicateIdentity {
                identity: self.settings.identity.clone(),
                room: self.settings.room.clone(),
            });
        }
        Ok(())
    }

    /// Number of received events waiting to be applied.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Take every event that is queued right now, without waiting.
    ///
    /// Events that arrive while draining are left for the next call.
    pub fn drain_ready(&mut self) -> Vec<Event> {
        let ready = self.inbound.len();
        let mut events = Vec::with_capacity(ready);
        while events.len() < ready {
            match self.inbound.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    /// Wait for the next received event.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Closed`] once both receivers have stopped.
    pub async fn recv(&mut self) -> Result<Event, NetError> {
        self.inbound.recv().await.ok_or(NetError::Closed)
    }

    /// Stop all background tasks and release held leases.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for lease in [self.settings.leader_lease(), self.settings.identity_lease()] {
            if let Err(e) = self.broker.release(&lease, &self.token).await {
                warn!(lease = lease, error = %e, "failed to release lease");
            }
        }
        info!(room = self.settings.room, identity = self.settings.identity, "left room");
    }
}

impl Drop for DistributionClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for DistributionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionClient")
            .field("room", &self.settings.room)
            .field("identity", &self.settings.identity)
            .field("pending", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

fn instance_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

async fn receive(
    broker: Arc<dyn Broker>,
    mut subscription: Subscription,
    inbound: mpsc::Sender<Event>,
    channel: String,
) {
    while let Some(delivery) = subscription.next().await {
        if let Err(e) = broker.ack(&delivery).await {
            warn!(channel = channel, error = %e, "ack failed");
        }
        let preview = delivery
            .payload
            .get(..PREVIEW_BYTES)
            .unwrap_or(delivery.payload.as_slice());
        debug!(
            channel = channel,
            payload = %String::from_utf8_lossy(preview),
            "received message"
        );
        match decode(&delivery.payload) {
            Ok(event) => {
                if inbound.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(channel = channel, error = %e, "dropping undecodable message"),
        }
    }
    debug!(channel = channel, "receiver stopped");
}

async fn publish_outbound(broker: Arc<dyn Broker>, mut outbound: mpsc::Receiver<Event>, channel: String) {
    while let Some(event) = outbound.recv().await {
        let kind = event.kind();
        let payload = match encode(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%kind, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = broker.publish(&channel, payload).await {
            warn!(%kind, error = %e, "failed to publish event");
        }
    }
}

async fn maintain(
    broker: Arc<dyn Broker>,
    settings: ClientSettings,
    token: String,
    leading: Arc<AtomicBool>,
    identity_lost: Arc<AtomicBool>,
) {
    let identity_lease = settings.identity_lease();
    let leader_lease = settings.leader_lease();
    let obstacle_channel = settings.obstacle_channel();
    let mut interval = tokio::time::interval(settings.obstacle_refresh);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match broker.acquire(&identity_lease, &token).await {
            Ok(Acquisition::Leader) => {}
            Ok(Acquisition::Follower) => {
                error!(identity = settings.identity, "identity lease taken by another process");
                identity_lost.store(true, Ordering::Relaxed);
                leading.store(false, Ordering::Relaxed);
                if let Err(e) = broker.release(&leader_lease, &token).await {
                    warn!(error = %e, "failed to release obstacle leadership");
                }
                return;
            }
            Err(e) => warn!(error = %e, "identity lease renewal failed"),
        }

        let acquisition = match broker.acquire(&leader_lease, &token).await {
            Ok(acquisition) => acquisition,
            Err(e) => {
                warn!(error = %e, "leader election attempt failed");
                continue;
            }
        };
        let was_leading = leading.swap(acquisition.is_leader(), Ordering::Relaxed);
        match (was_leading, acquisition.is_leader()) {
            (false, true) => info!(room = settings.room, "became obstacle leader"),
            (true, false) => info!(room = settings.room, "lost obstacle leadership"),
            _ => {}
        }
        if acquisition.is_leader() {
            if let Err(e) = publish_layout(broker.as_ref(), &settings, &obstacle_channel).await {
                warn!(error = %e, "failed to publish obstacle layout");
            }
        }
    }
}

async fn publish_layout(
    broker: &dyn Broker,
    settings: &ClientSettings,
    channel: &str,
) -> Result<(), NetError> {
    let cells = sample_layout(&settings.grid, settings.density_ratio);
    let count = cells.len();
    let payload = encode(&Event::ObstacleSnapshot { cells })?;
    broker.publish(channel, payload.clone()).await?;
    broker.retain(channel, payload).await?;
    debug!(channel = channel, cells = count, "published obstacle layout");
    Ok(())
}
