//! Timed follow-up events.
//!
//! Some events are consequences of others after a delay: a placed bomb
//! explodes when its fuse runs out, an explosion's flames decay, a pushed
//! bomb slides one cell per interval. Each of these runs as its own task.
//! Tasks never touch the room. They either ask the session to act through a
//! [`Followup`], or (for pushes) publish directly after checking a snapshot
//! of the obstacle layout.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use blastroom_events::{BombRef, Event};
use blastroom_net::Publisher;
use blastroom_types::{Direction, Grid, Position};
use blastroom_world::CancelListener;
use rand::Rng as _;
use rand::distr::Alphanumeric;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Length of the random part of a bomb name.
pub const BOMB_SUFFIX_LEN: usize = 5;

/// Owner prefix for bombs dropped by the random spawner.
pub const RANDOM_OWNER: &str = "random";

/// Read-only view of the obstacle layout handed to background tasks.
pub type ObstacleView = watch::Receiver<Arc<BTreeSet<Position>>>;

/// A request from a timer task back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    /// A fuse ran out; detonate the bomb wherever it is now.
    Detonate {
        /// Bomb name.
        bomb: String,
    },
    /// Flames of the explosion at `origin` are spent.
    Decay {
        /// Explosion origin.
        origin: Position,
    },
    /// The random spawner picked a cell.
    RandomBomb {
        /// Candidate cell.
        position: Position,
    },
}

/// Durations for the tasks the orchestrator starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Fuse length.
    pub fuse: Duration,
    /// Flame lifetime.
    pub flame: Duration,
    /// Delay between push steps.
    pub push_interval: Duration,
    /// Maximum push steps.
    pub push_steps: u32,
}

/// Owner of every timer and push task of one session.
#[derive(Debug)]
pub struct Orchestrator {
    grid: Grid,
    timings: Timings,
    followups: mpsc::Sender<Followup>,
    publisher: Publisher,
    obstacles: ObstacleView,
    timers: JoinSet<()>,
    pushes: HashMap<String, JoinHandle<()>>,
    spawner: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create an orchestrator with no tasks running.
    pub fn new(
        grid: Grid,
        timings: Timings,
        followups: mpsc::Sender<Followup>,
        publisher: Publisher,
        obstacles: ObstacleView,
    ) -> Self {
        Self {
            grid,
            timings,
            followups,
            publisher,
            obstacles,
            timers: JoinSet::new(),
            pushes: HashMap::new(),
            spawner: None,
        }
    }

    /// Start the fuse of `bomb`.
    pub fn arm_fuse(&mut self, bomb: String) {
        debug!(bomb = bomb, fuse_ms = self.timings.fuse.as_millis(), "fuse armed");
        self.schedule(self.timings.fuse, Followup::Detonate { bomb });
    }

    /// Ask again in one push interval whether `bomb` has gone off.
    ///
    /// An Explode names a cell, not a bomb. If the bomb slid away before the
    /// Explode was applied, every peer ignores it and the bomb needs another
    /// Explode aimed at where it is now.
    pub fn recheck_detonation(&mut self, bomb: String) {
        trace!(bomb = bomb, "detonation recheck scheduled");
        self.schedule(self.timings.push_interval, Followup::Detonate { bomb });
    }

    /// Start the flame decay of the explosion at `origin`.
    pub fn start_decay(&mut self, origin: Position) {
        self.schedule(self.timings.flame, Followup::Decay { origin });
    }

    fn schedule(&mut self, delay: Duration, followup: Followup) {
        let followups = self.followups.clone();
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = followups.send(followup).await;
        });
    }

    /// Whether a push animation for `bomb` is still running.
    pub fn is_pushing(&self, bomb: &str) -> bool {
        self.pushes.get(bomb).is_some_and(|task| !task.is_finished())
    }

    /// Slide `bomb` from `from` one cell per interval in `direction`.
    ///
    /// Each step re-checks bounds and the latest obstacle layout before
    /// publishing. The animation stops at the first blocked step, after the
    /// configured number of steps, or as soon as `cancel` fires.
    pub fn start_push(
        &mut self,
        bomb: String,
        from: Position,
        direction: Direction,
        cancel: CancelListener,
    ) {
        if self.is_pushing(&bomb) {
            return;
        }
        debug!(bomb = bomb, from = %from, ?direction, "push started");
        let task = tokio::spawn(push(
            PushJob {
                bomb: bomb.clone(),
                from,
                direction,
                grid: self.grid,
                interval: self.timings.push_interval,
                steps: self.timings.push_steps,
            },
            self.obstacles.clone(),
            self.publisher.clone(),
            cancel,
        ));
        self.pushes.insert(bomb, task);
    }

    /// Propose a random cell for a bomb every `period`.
    pub fn start_random_bombs(&mut self, period: Duration) {
        if let Some(previous) = self.spawner.take() {
            previous.abort();
        }
        let grid = self.grid;
        let followups = self.followups.clone();
        self.spawner = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let position = random_cell(&grid);
                if followups.send(Followup::RandomBomb { position }).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Forget finished tasks.
    pub fn reap(&mut self) {
        while self.timers.try_join_next().is_some() {}
        self.pushes.retain(|_, task| !task.is_finished());
    }

    /// Stop every task.
    pub fn shutdown(&mut self) {
        self.timers.abort_all();
        for task in self.pushes.values() {
            task.abort();
        }
        self.pushes.clear();
        if let Some(spawner) = self.spawner.take() {
            spawner.abort();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A fresh bomb name for `owner`.
pub fn bomb_name(owner: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(BOMB_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{owner}-{suffix}")
}

fn random_cell(grid: &Grid) -> Position {
    let mut rng = rand::rng();
    Position::new(
        rng.random_range(0..grid.width()),
        rng.random_range(0..grid.height()),
    )
}

#[derive(Debug)]
struct PushJob {
    bomb: String,
    from: Position,
    direction: Direction,
    grid: Grid,
    interval: Duration,
    steps: u32,
}

async fn push(job: PushJob, obstacles: ObstacleView, publisher: Publisher, mut cancel: CancelListener) {
    let mut interval = tokio::time::interval(job.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let mut current = job.from;
    for _ in 0..job.steps {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(bomb = job.bomb, "push cancelled by detonation");
                return;
            }
            _ = interval.tick() => {}
        }

        let Some(next) = current.step(job.direction) else {
            return;
        };
        if !job.grid.contains(next) || obstacles.borrow().contains(&next) {
            trace!(bomb = job.bomb, at = %current, "push blocked");
            return;
        }
        let moved = Event::BombMoved(BombRef {
            name: job.bomb.clone(),
            position: next,
        });
        if !publisher.submit(moved) {
            return;
        }
        current = next;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bomb_names_carry_owner_and_suffix() {
        let name = bomb_name("ana");
        let (owner, suffix) = name.split_once('-').unwrap();
        assert_eq!(owner, "ana");
        assert_eq!(suffix.len(), BOMB_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_cells_are_in_bounds() {
        let grid = Grid::new(3, 2).unwrap();
        for _ in 0..200 {
            assert!(grid.contains(random_cell(&grid)));
        }
    }
}
