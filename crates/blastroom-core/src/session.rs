//! The per-frame session.
//!
//! A [`Session`] is the single writer of one peer's [`Room`]. The host calls
//! [`Session::tick`] once per frame; each tick
//!
//! 1. applies every event received since the last tick, in arrival order
//! 2. handles follow-ups from timer tasks (detonations, decays, random bombs)
//! 3. turns the frame's input into outbound events
//! 4. checks whether the local player stands in flames
//!
//! Locally originated events are only published, never applied directly;
//! they change the room when their echo comes back from the broker, like
//! everyone else's. The exceptions are the initial self-join (so the local
//! player exists from the first frame) and flame decay, which every peer
//! schedules for itself from the explosions it applies.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use blastroom_events::{BombRef, Event, EventKind, PlayerSnapshot};
use blastroom_net::{Broker, DistributionClient, Publisher};
use blastroom_types::{Direction, Position};
use blastroom_world::{Applied, Explosion, PlayerState, Room};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::RoomConfig;
use crate::error::SessionError;
use crate::orchestrator::{Followup, Orchestrator, RANDOM_OWNER, Timings, bomb_name};

/// Where every player enters the arena.
pub const SPAWN: Position = Position::new(0, 0);

const FOLLOWUP_CAPACITY: usize = 64;

/// Input gathered by the host for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameIntent {
    /// Step one cell this way.
    pub direction: Option<Direction>,
    /// Drop a bomb on the current cell.
    pub place_bomb: bool,
    /// Come back to life at the current cell.
    pub revive: bool,
}

impl FrameIntent {
    /// A frame with no input.
    pub const IDLE: Self = Self {
        direction: None,
        place_bomb: false,
        revive: false,
    };

    /// A frame that steps in `direction`.
    pub const fn step(direction: Direction) -> Self {
        Self {
            direction: Some(direction),
            ..Self::IDLE
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events that changed the room.
    pub applied: usize,
    /// Events absorbed by reducer guards.
    pub ignored: usize,
    /// The local player died this tick.
    pub local_died: bool,
}

impl TickReport {
    fn count(&mut self, applied: &Applied) {
        if applied.is_ignored() {
            self.ignored = self.ignored.saturating_add(1);
        } else {
            self.applied = self.applied.saturating_add(1);
        }
    }
}

/// One peer's live view of a room.
#[derive(Debug)]
pub struct Session {
    identity: String,
    attribute: String,
    room: Room,
    client: DistributionClient,
    publisher: Publisher,
    orchestrator: Orchestrator,
    followups: mpsc::Receiver<Followup>,
    obstacles: watch::Sender<Arc<BTreeSet<Position>>>,
    owned_bombs: HashSet<String>,
    death_reported: bool,
}

impl Session {
    /// Join the room described by `config` and announce the local player.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] for an unusable configuration and
    /// [`SessionError::Net`] if the room cannot be joined, including when
    /// the identity is already taken.
    pub async fn start(broker: Arc<dyn Broker>, config: &RoomConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let grid = config.grid()?;
        let client = DistributionClient::connect(broker, config.client_settings()?).await?;
        let publisher = client.publisher();

        let (followup_tx, followups) = mpsc::channel(FOLLOWUP_CAPACITY);
        let (obstacles, obstacle_view) = watch::channel(Arc::new(BTreeSet::new()));
        let mut orchestrator = Orchestrator::new(
            grid,
            Timings {
                fuse: config.timing.fuse(),
                flame: config.timing.flame(),
                push_interval: config.timing.push_interval(),
                push_steps: config.timing.push_steps,
            },
            followup_tx,
            publisher.clone(),
            obstacle_view,
        );
        if let Some(period) = config.timing.random_bomb() {
            orchestrator.start_random_bombs(period);
        }

        let mut session = Self {
            identity: config.player.clone(),
            attribute: config.attribute.clone(),
            room: Room::new(grid, config.grid.blast_length),
            client,
            publisher,
            orchestrator,
            followups,
            obstacles,
            owned_bombs: HashSet::new(),
            death_reported: false,
        };

        let me = PlayerSnapshot {
            name: session.identity.clone(),
            attribute: session.attribute.clone(),
            position: SPAWN,
            alive: true,
        };
        session.room.apply(Event::Join(me.clone()));
        session.publish(Event::Join(me));
        info!(room = config.room, player = session.identity, "session started");
        Ok(session)
    }

    /// Advance one frame.
    pub fn tick(&mut self, intent: FrameIntent) -> TickReport {
        let mut report = TickReport::default();

        for event in self.client.drain_ready() {
            self.apply(event, &mut report);
        }
        while let Ok(followup) = self.followups.try_recv() {
            self.handle_followup(followup, &mut report);
        }
        self.handle_intent(intent);
        self.check_death(&mut report);
        self.orchestrator.reap();

        report
    }

    /// The room as this peer currently sees it.
    pub const fn room(&self) -> &Room {
        &self.room
    }

    /// The local player's identity.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The local player's record.
    pub fn local_player(&self) -> Option<&PlayerState> {
        self.room.player(&self.identity)
    }

    /// Whether this peer currently publishes obstacle layouts.
    pub fn is_leader(&self) -> bool {
        self.client.is_leader()
    }

    /// Check that no other process has taken over the local identity.
    ///
    /// The host should stop the session once this fails.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Net`] wrapping
    /// [`NetError::DuplicateIdentity`](blastroom_net::NetError::DuplicateIdentity).
    pub fn ensure_identity(&self) -> Result<(), SessionError> {
        self.client.ensure_identity().map_err(SessionError::from)
    }

    /// Leave the room: stop every task and release the identity.
    pub async fn shutdown(mut self) {
        self.orchestrator.shutdown();
        self.client.shutdown().await;
    }

    fn publish(&self, event: Event) -> bool {
        self.publisher.submit(event)
    }

    fn handle_followup(&mut self, followup: Followup, report: &mut TickReport) {
        match followup {
            Followup::Detonate { bomb } => {
                if !self.owned_bombs.contains(&bomb) {
                    return;
                }
                let Some(position) = self.room.bomb(&bomb).map(|b| b.position) else {
                    debug!(bomb = bomb, "bomb is already gone");
                    self.owned_bombs.remove(&bomb);
                    return;
                };
                let explode = Event::Explode(BombRef {
                    name: bomb.clone(),
                    position,
                });
                if !self.publish(explode) {
                    warn!(bomb = bomb, "explode dropped");
                }
                // owned until the explosion is applied
                self.orchestrator.recheck_detonation(bomb);
            }
            Followup::Decay { origin } => {
                self.apply(Event::UndoExplode { position: origin }, report);
            }
            Followup::RandomBomb { position } => {
                if self.room.is_obstacle(position) || self.room.bomb_at(position).is_some() {
                    trace!(at = %position, "random bomb cell taken");
                    return;
                }
                let name = bomb_name(RANDOM_OWNER);
                if self.publish(Event::PlaceBomb(BombRef {
                    name: name.clone(),
                    position,
                })) {
                    self.owned_bombs.insert(name);
                }
            }
        }
    }

    fn apply(&mut self, event: Event, report: &mut TickReport) {
        let kind = event.kind();
        let remote_join = matches!(&event, Event::Join(p) if p.name != self.identity);
        let applied = self.room.apply(event);
        report.count(&applied);

        match applied {
            Applied::Ignored(_) | Applied::BombMoved { .. } | Applied::BlastDecayed { .. } => {}
            Applied::Player { name, new } => {
                if new && remote_join {
                    info!(player = name, "player joined, announcing presence");
                    self.announce();
                }
                if name == self.identity && kind == EventKind::Revive {
                    self.death_reported = false;
                }
            }
            Applied::PlayerDied { name } => {
                if name == self.identity {
                    info!(player = name, "local player died");
                }
            }
            Applied::BombPlaced { name, .. } => {
                if self.owned_bombs.contains(&name) {
                    self.orchestrator.arm_fuse(name);
                }
            }
            Applied::Exploded(explosion) => self.on_explosion(explosion, report),
            Applied::ObstaclesReplaced { count } => {
                debug!(count, "obstacle layout updated");
                self.obstacles
                    .send_replace(Arc::new(self.room.obstacles().clone()));
            }
        }
    }

    fn on_explosion(&mut self, explosion: Explosion, report: &mut TickReport) {
        let Explosion {
            bomb,
            origin,
            casualties,
            cancel,
            ..
        } = explosion;
        let stopped = cancel.offer();
        if stopped > 0 {
            debug!(bomb = bomb, "detonation stopped a push");
        }
        self.owned_bombs.remove(&bomb);
        self.orchestrator.start_decay(origin);
        if casualties.iter().any(|name| *name == self.identity) && !self.death_reported {
            info!(player = self.identity, bomb = bomb, "local player caught in blast");
            self.death_reported = true;
            report.local_died = true;
        }
    }

    fn announce(&self) {
        if let Some(me) = self.local_player() {
            self.publish(Event::Join(me.snapshot()));
        }
    }

    fn handle_intent(&mut self, intent: FrameIntent) {
        let Some(me) = self.local_player().cloned() else {
            return;
        };
        if !me.alive {
            if intent.revive {
                self.publish(Event::Revive(PlayerSnapshot {
                    alive: true,
                    ..me.snapshot()
                }));
            }
            return;
        }
        if let Some(direction) = intent.direction {
            self.step(&me, direction);
        }
        if intent.place_bomb {
            self.place_bomb(me.position);
        }
    }

    fn step(&mut self, me: &PlayerState, direction: Direction) {
        let target = self.room.grid().step_clamped(me.position, direction);
        if target == me.position {
            return;
        }
        if self.room.is_obstacle(target) {
            trace!(at = %target, "move blocked by obstacle");
            return;
        }
        self.publish(Event::Move(PlayerSnapshot {
            position: target,
            ..me.snapshot()
        }));

        if let Some(bomb) = self.room.bomb_at(target) {
            if !self.orchestrator.is_pushing(&bomb.name) {
                let cancel = bomb.cancel.listen();
                self.orchestrator
                    .start_push(bomb.name.clone(), target, direction, cancel);
            }
        }
    }

    fn place_bomb(&mut self, position: Position) {
        if self.room.bomb_at(position).is_some() {
            return;
        }
        let name = bomb_name(&self.identity);
        if self.publish(Event::PlaceBomb(BombRef {
            name: name.clone(),
            position,
        })) {
            self.owned_bombs.insert(name);
        }
    }

    fn check_death(&mut self, report: &mut TickReport) {
        if self.death_reported {
            return;
        }
        let Some(me) = self.local_player() else {
            return;
        };
        if !me.alive || self.room.blast_level(me.position) == 0 {
            return;
        }
        let at = me.position;
        let dead = Event::Dead(PlayerSnapshot {
            alive: false,
            ..me.snapshot()
        });
        if !self.publish(dead) {
            // retried next tick
            return;
        }
        info!(player = self.identity, at = %at, "local player stands in flames");
        self.death_reported = true;
        report.local_died = true;
    }
}
