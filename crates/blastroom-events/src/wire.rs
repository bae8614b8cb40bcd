//! Flat wire envelope shared by every event kind.
//!
//! Payloads are JSON objects of the shape
//! `{kind, name, attribute, x, y, alive, cells}`. Decoding never produces a
//! half-formed event: an unrecognised `kind` or a malformed payload comes
//! back as a [`DecodeError`] that callers drop before dispatch.

use blastroom_types::Position;
use serde::{Deserialize, Serialize};

use crate::event::{BombRef, Event, EventKind, PlayerSnapshot};

/// Reasons a payload could not be turned into an [`Event`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is well-formed but names a kind this version does not know.
    #[error("unknown event kind: {0:?}")]
    UnknownKind(String),

    /// The payload is not a valid wire record.
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The single on-the-wire shape for all events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Event kind tag (see [`EventKind::as_str`]).
    pub kind: String,
    /// Player or bomb name.
    #[serde(default)]
    pub name: String,
    /// Player display attribute.
    #[serde(default)]
    pub attribute: String,
    /// Target column.
    #[serde(default)]
    pub x: i32,
    /// Target row.
    #[serde(default)]
    pub y: i32,
    /// Player alive flag.
    #[serde(default)]
    pub alive: bool,
    /// Flat obstacle cell indices.
    #[serde(default)]
    pub cells: Vec<i64>,
}

impl WireRecord {
    fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    fn player(self) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.position(),
            name: self.name,
            attribute: self.attribute,
            alive: self.alive,
        }
    }

    fn bomb(self) -> BombRef {
        BombRef {
            position: self.position(),
            name: self.name,
        }
    }

    fn for_player(kind: EventKind, player: &PlayerSnapshot, alive: bool) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            name: player.name.clone(),
            attribute: player.attribute.clone(),
            x: player.position.x,
            y: player.position.y,
            alive,
            cells: Vec::new(),
        }
    }

    fn for_bomb(kind: EventKind, bomb: &BombRef) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            name: bomb.name.clone(),
            x: bomb.position.x,
            y: bomb.position.y,
            ..Self::default()
        }
    }
}

impl From<&Event> for WireRecord {
    fn from(event: &Event) -> Self {
        let kind = event.kind();
        match event {
            Event::Move(p) | Event::Join(p) => Self::for_player(kind, p, p.alive),
            Event::Dead(p) => Self::for_player(kind, p, false),
            Event::Revive(p) => Self::for_player(kind, p, true),
            Event::PlaceBomb(b) | Event::BombMoved(b) | Event::Explode(b) => {
                Self::for_bomb(kind, b)
            }
            Event::UndoExplode { position } => Self {
                kind: kind.as_str().to_owned(),
                x: position.x,
                y: position.y,
                ..Self::default()
            },
            Event::ObstacleSnapshot { cells } => Self {
                kind: kind.as_str().to_owned(),
                cells: cells.clone(),
                ..Self::default()
            },
        }
    }
}

impl TryFrom<WireRecord> for Event {
    type Error = DecodeError;

    fn try_from(record: WireRecord) -> Result<Self, Self::Error> {
        let Some(kind) = EventKind::from_tag(&record.kind) else {
            return Err(DecodeError::UnknownKind(record.kind));
        };
        let event = match kind {
            EventKind::Move => Self::Move(record.player()),
            EventKind::Join => Self::Join(record.player()),
            EventKind::Dead => Self::Dead(PlayerSnapshot {
                alive: false,
                ..record.player()
            }),
            EventKind::Revive => Self::Revive(PlayerSnapshot {
                alive: true,
                ..record.player()
            }),
            EventKind::PlaceBomb => Self::PlaceBomb(record.bomb()),
            EventKind::BombMoved => Self::BombMoved(record.bomb()),
            EventKind::Explode => Self::Explode(record.bomb()),
            EventKind::UndoExplode => Self::UndoExplode {
                position: record.position(),
            },
            EventKind::ObstacleSnapshot => Self::ObstacleSnapshot {
                cells: record.cells,
            },
        };
        Ok(event)
    }
}

/// Serialize an event into its JSON wire payload.
///
/// # Errors
///
/// Returns the underlying `serde_json` error if serialization fails.
pub fn encode(event: &Event) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&WireRecord::from(event))
}

/// Parse a JSON wire payload into an event.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the payload is not a wire record and
/// [`DecodeError::UnknownKind`] if its `kind` is not recognised.
pub fn decode(payload: &[u8]) -> Result<Event, DecodeError> {
    let record: WireRecord = serde_json::from_slice(payload)?;
    Event::try_from(record)
}
