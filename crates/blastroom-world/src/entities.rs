//! Player and bomb records held by the room.

use blastroom_events::PlayerSnapshot;
use blastroom_types::Position;

use crate::cancel::CancelSignal;

/// One player in the room. Created on first sight, never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    /// Unique identity.
    pub name: String,
    /// Display attribute.
    pub attribute: String,
    /// Current cell.
    pub position: Position,
    /// Whether the player is alive.
    pub alive: bool,
}

impl PlayerState {
    /// The wire snapshot of this player.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            name: self.name.clone(),
            attribute: self.attribute.clone(),
            position: self.position,
            alive: self.alive,
        }
    }
}

impl From<PlayerSnapshot> for PlayerState {
    fn from(snapshot: PlayerSnapshot) -> Self {
        Self {
            name: snapshot.name,
            attribute: snapshot.attribute,
            position: snapshot.position,
            alive: snapshot.alive,
        }
    }
}

/// A live bomb. Lives from its `PlaceBomb` until the first `Explode` that
/// finds it.
#[derive(Debug)]
pub struct BombState {
    /// Unique bomb name, `<owner>-<suffix>`.
    pub name: String,
    /// Current cell.
    pub position: Position,
    /// Fired when the bomb detonates.
    pub cancel: CancelSignal,
}

impl BombState {
    /// Create a bomb with a fresh cancellation signal.
    pub fn new(name: String, position: Position) -> Self {
        Self {
            name,
            position,
            cancel: CancelSignal::new(),
        }
    }

    /// Identity that placed the bomb (the name up to the first `-`).
    pub fn owner(&self) -> &str {
        self.name.split('-').next().unwrap_or_default()
    }
}
