//! The closed set of room events.

use blastroom_types::Position;
use serde::{Deserialize, Serialize};

/// Player fields carried by the player-lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Unique player identity.
    pub name: String,
    /// Display attribute chosen by the player (rendered colour/avatar).
    pub attribute: String,
    /// Cell the player occupies.
    pub position: Position,
    /// Whether the player is alive.
    pub alive: bool,
}

/// A bomb identified by name, at a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BombRef {
    /// Unique bomb name, `<owner>-<suffix>`.
    pub name: String,
    /// Cell the event targets.
    pub position: Position,
}

/// Every kind of change that can happen in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A player stepped to a new cell.
    Move(PlayerSnapshot),
    /// A player announced itself in the room.
    Join(PlayerSnapshot),
    /// A player died.
    Dead(PlayerSnapshot),
    /// A player came back to life at a cell.
    Revive(PlayerSnapshot),
    /// A bomb was placed.
    PlaceBomb(BombRef),
    /// A pushed bomb slid one cell.
    BombMoved(BombRef),
    /// The bomb at a cell detonated.
    Explode(BombRef),
    /// The flames of an earlier explosion at a cell died down.
    UndoExplode {
        /// Origin of the explosion being undone.
        position: Position,
    },
    /// A new obstacle layout, as flat row-major cell indices.
    ObstacleSnapshot {
        /// Obstacle cell indices.
        cells: Vec<i64>,
    },
}

/// Discriminant of an [`Event`], as it appears in the wire `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// [`Event::Move`].
    Move,
    /// [`Event::Join`].
    Join,
    /// [`Event::Dead`].
    Dead,
    /// [`Event::Revive`].
    Revive,
    /// [`Event::PlaceBomb`].
    PlaceBomb,
    /// [`Event::BombMoved`].
    BombMoved,
    /// [`Event::Explode`].
    Explode,
    /// [`Event::UndoExplode`].
    UndoExplode,
    /// [`Event::ObstacleSnapshot`].
    ObstacleSnapshot,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Move,
        Self::Join,
        Self::Dead,
        Self::Revive,
        Self::PlaceBomb,
        Self::BombMoved,
        Self::Explode,
        Self::UndoExplode,
        Self::ObstacleSnapshot,
    ];

    /// Wire tag for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "Move",
            Self::Join => "Join",
            Self::Dead => "Dead",
            Self::Revive => "Revive",
            Self::PlaceBomb => "PlaceBomb",
            Self::BombMoved => "BombMoved",
            Self::Explode => "Explode",
            Self::UndoExplode => "UndoExplode",
            Self::ObstacleSnapshot => "ObstacleSnapshot",
        }
    }

    /// Parse a wire tag. Returns `None` for tags this version does not know.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// The kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Move(_) => EventKind::Move,
            Self::Join(_) => EventKind::Join,
            Self::Dead(_) => EventKind::Dead,
            Self::Revive(_) => EventKind::Revive,
            Self::PlaceBomb(_) => EventKind::PlaceBomb,
            Self::BombMoved(_) => EventKind::BombMoved,
            Self::Explode(_) => EventKind::Explode,
            Self::UndoExplode { .. } => EventKind::UndoExplode,
            Self::ObstacleSnapshot { .. } => EventKind::ObstacleSnapshot,
        }
    }

    /// Player or bomb name the event refers to, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Move(p) | Self::Join(p) | Self::Dead(p) | Self::Revive(p) => Some(&p.name),
            Self::PlaceBomb(b) | Self::BombMoved(b) | Self::Explode(b) => Some(&b.name),
            Self::UndoExplode { .. } | Self::ObstacleSnapshot { .. } => None,
        }
    }

    /// Cell the event targets, if any.
    pub const fn position(&self) -> Option<Position> {
        match self {
            Self::Move(p) | Self::Join(p) | Self::Dead(p) | Self::Revive(p) => Some(p.position),
            Self::PlaceBomb(b) | Self::BombMoved(b) | Self::Explode(b) => Some(b.position),
            Self::UndoExplode { position } => Some(*position),
            Self::ObstacleSnapshot { .. } => None,
        }
    }
}
