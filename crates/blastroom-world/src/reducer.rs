//! The event reducer.
//!
//! [`Room::apply`] is the only way room state changes. Each event kind has
//! guards that turn stale, duplicate, or out-of-range events into
//! [`Applied::Ignored`]; such events are expected under at-least-once
//! delivery and are not errors.

use std::collections::VecDeque;

use blastroom_events::{BombRef, Event, PlayerSnapshot};
use blastroom_types::Position;
use tracing::{debug, trace};

use crate::blast;
use crate::cancel::CancelSignal;
use crate::entities::{BombState, PlayerState};
use crate::room::Room;

/// Why an event left the room unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// The target cell is outside the arena.
    OutOfBounds,
    /// The player is dead and cannot move.
    PlayerDead,
    /// The named player has never been seen.
    UnknownPlayer,
    /// Another bomb already sits on the target cell.
    CellOccupied,
    /// A bomb with this name already exists elsewhere.
    DuplicateBomb,
    /// The named bomb does not exist (already exploded or never placed).
    UnknownBomb,
    /// The bomb move does not continue from where the bomb currently is.
    StaleBombMove,
    /// The target cell holds an obstacle.
    Blocked,
    /// No bomb sits on the targeted cell.
    NoBombAtTarget,
    /// No burning explosion originates at this cell.
    NotBurning,
}

/// A detonation, as reported by [`Room::apply`].
#[derive(Debug)]
pub struct Explosion {
    /// Name of the bomb that went off.
    pub bomb: String,
    /// Cell the bomb was on.
    pub origin: Position,
    /// Every cell whose counter was incremented.
    pub cells: Vec<Position>,
    /// Players killed by the blast.
    pub casualties: Vec<String>,
    /// The bomb's cancellation signal, to be offered to any push animation.
    pub cancel: CancelSignal,
}

/// What applying one event did to the room.
#[derive(Debug)]
pub enum Applied {
    /// The event was absorbed by a guard.
    Ignored(Ignored),
    /// A player record was created or updated.
    Player {
        /// Identity of the player.
        name: String,
        /// Whether the player did not exist before this event.
        new: bool,
    },
    /// A player was marked dead.
    PlayerDied {
        /// Identity of the player.
        name: String,
    },
    /// A bomb was created.
    BombPlaced {
        /// Bomb name.
        name: String,
        /// Cell it was placed on.
        position: Position,
    },
    /// A bomb slid to a neighbouring cell.
    BombMoved {
        /// Bomb name.
        name: String,
        /// Previous cell.
        from: Position,
        /// New cell.
        to: Position,
    },
    /// A bomb detonated.
    Exploded(Explosion),
    /// The flames of one explosion were retired.
    BlastDecayed {
        /// Origin of the explosion.
        origin: Position,
        /// Cells whose counter was decremented.
        cells: Vec<Position>,
    },
    /// The obstacle layout was replaced.
    ObstaclesReplaced {
        /// Number of obstacle cells in the new layout.
        count: usize,
    },
}

impl Applied {
    /// Whether the event was absorbed without effect.
    pub const fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }
}

impl Room {
    /// Apply one event.
    pub fn apply(&mut self, event: Event) -> Applied {
        let kind = event.kind();
        let applied = match event {
            Event::Move(player) => self.apply_move(player),
            Event::Join(player) => self.apply_join(player),
            Event::Dead(player) => self.apply_dead(&player.name),
            Event::Revive(player) => self.apply_revive(player),
            Event::PlaceBomb(bomb) => self.apply_place_bomb(bomb),
            Event::BombMoved(bomb) => self.apply_bomb_moved(bomb),
            Event::Explode(bomb) => self.apply_explode(bomb.position),
            Event::UndoExplode { position } => self.apply_undo_explode(position),
            Event::ObstacleSnapshot { cells } => self.apply_obstacles(&cells),
        };
        if let Applied::Ignored(reason) = &applied {
            trace!(%kind, ?reason, "event ignored");
        }
        applied
    }

    fn apply_move(&mut self, player: PlayerSnapshot) -> Applied {
        if !self.grid.contains(player.position) {
            return Applied::Ignored(Ignored::OutOfBounds);
        }
        let new = match self.players.get(&player.name) {
            Some(existing) if !existing.alive => {
                return Applied::Ignored(Ignored::PlayerDead);
            }
            Some(existing) => {
                let moved = PlayerState {
                    position: player.position,
                    attribute: player.attribute,
                    ..existing.clone()
                };
                self.upsert_player(moved);
                false
            }
            None => {
                self.upsert_player(PlayerState::from(player.clone()));
                true
            }
        };
        Applied::Player {
            name: player.name,
            new,
        }
    }

    fn apply_join(&mut self, player: PlayerSnapshot) -> Applied {
        if !self.grid.contains(player.position) {
            return Applied::Ignored(Ignored::OutOfBounds);
        }
        let name = player.name.clone();
        let new = !self.players.contains_key(&name);
        self.upsert_player(PlayerState::from(player));
        Applied::Player { name, new }
    }

    fn apply_dead(&mut self, name: &str) -> Applied {
        match self.players.get_mut(name) {
            Some(player) => {
                player.alive = false;
                Applied::PlayerDied {
                    name: name.to_owned(),
                }
            }
            None => Applied::Ignored(Ignored::UnknownPlayer),
        }
    }

    fn apply_revive(&mut self, player: PlayerSnapshot) -> Applied {
        if !self.grid.contains(player.position) {
            return Applied::Ignored(Ignored::OutOfBounds);
        }
        let name = player.name.clone();
        let new = !self.players.contains_key(&name);
        self.upsert_player(PlayerState {
            alive: true,
            ..PlayerState::from(player)
        });
        Applied::Player { name, new }
    }

    fn apply_place_bomb(&mut self, bomb: BombRef) -> Applied {
        if !self.grid.contains(bomb.position) {
            return Applied::Ignored(Ignored::OutOfBounds);
        }
        if self.bombs_at.contains_key(&bomb.position) {
            return Applied::Ignored(Ignored::CellOccupied);
        }
        if self.bombs.contains_key(&bomb.name) {
            return Applied::Ignored(Ignored::DuplicateBomb);
        }
        self.bombs_at.insert(bomb.position, bomb.name.clone());
        self.bombs.insert(
            bomb.name.clone(),
            BombState::new(bomb.name.clone(), bomb.position),
        );
        debug!(bomb = bomb.name, position = %bomb.position, "bomb placed");
        Applied::BombPlaced {
            name: bomb.name,
            position: bomb.position,
        }
    }

    fn apply_bomb_moved(&mut self, bomb: BombRef) -> Applied {
        let Some(from) = self.bombs.get(&bomb.name).map(|b| b.position) else {
            return Applied::Ignored(Ignored::UnknownBomb);
        };
        if !self.bomb_is_indexed(&bomb.name) || !from.is_adjacent(bomb.position) {
            return Applied::Ignored(Ignored::StaleBombMove);
        }
        if !self.grid.contains(bomb.position) {
            return Applied::Ignored(Ignored::OutOfBounds);
        }
        if self.obstacles.contains(&bomb.position) {
            return Applied::Ignored(Ignored::Blocked);
        }
        if self.bombs_at.contains_key(&bomb.position) {
            return Applied::Ignored(Ignored::CellOccupied);
        }

        self.bombs_at.remove(&from);
        self.bombs_at.insert(bomb.position, bomb.name.clone());
        if let Some(state) = self.bombs.get_mut(&bomb.name) {
            state.position = bomb.position;
        }
        Applied::BombMoved {
            name: bomb.name,
            from,
            to: bomb.position,
        }
    }

    fn apply_explode(&mut self, origin: Position) -> Applied {
        let Some(bomb) = self.remove_bomb_at(origin) else {
            return Applied::Ignored(Ignored::NoBombAtTarget);
        };

        let cells = blast::footprint(&self.grid, origin, self.blast_length, &self.obstacles);
        let mut casualties = Vec::new();
        for &cell in &cells {
            let level = self.blast.entry(cell).or_insert(0);
            *level = level.saturating_add(1);

            let victims: Vec<String> = self
                .players_at(cell)
                .map(|p| p.name.clone())
                .collect();
            for name in victims {
                if let Some(player) = self.players.get_mut(&name) {
                    player.alive = false;
                }
                casualties.push(name);
            }
        }
        self.burning
            .entry(origin)
            .or_insert_with(VecDeque::new)
            .push_back(cells.clone());

        debug!(
            bomb = bomb.name,
            origin = %origin,
            cells = cells.len(),
            casualties = casualties.len(),
            "bomb exploded"
        );
        Applied::Exploded(Explosion {
            bomb: bomb.name,
            origin,
            cells,
            casualties,
            cancel: bomb.cancel,
        })
    }

    fn apply_undo_explode(&mut self, origin: Position) -> Applied {
        let Some(queue) = self.burning.get_mut(&origin) else {
            return Applied::Ignored(Ignored::NotBurning);
        };
        let Some(cells) = queue.pop_front() else {
            return Applied::Ignored(Ignored::NotBurning);
        };
        if queue.is_empty() {
            self.burning.remove(&origin);
        }

        for cell in &cells {
            if let Some(level) = self.blast.get_mut(cell) {
                *level = level.saturating_sub(1);
            }
        }
        Applied::BlastDecayed { origin, cells }
    }

    fn apply_obstacles(&mut self, indices: &[i64]) -> Applied {
        self.obstacles = indices
            .iter()
            .filter_map(|&index| self.grid.position_of(index))
            .collect();
        debug!(count = self.obstacles.len(), "obstacle layout replaced");
        Applied::ObstaclesReplaced {
            count: self.obstacles.len(),
        }
    }
}
