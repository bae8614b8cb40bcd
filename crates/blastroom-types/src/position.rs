//! Cell coordinates and movement directions.

use serde::{Deserialize, Serialize};

/// An integer cell coordinate on the arena grid.
///
/// A position on its own carries no bounds; whether it is valid depends on
/// the [`Grid`](crate::Grid) it is checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column, growing to the right.
    pub x: i32,
    /// Row, growing downwards.
    pub y: i32,
}

impl Position {
    /// Create a position from its coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The cell `distance` steps away in `direction`.
    ///
    /// Returns `None` on coordinate overflow.
    pub fn offset(self, direction: Direction, distance: i32) -> Option<Self> {
        let (dx, dy) = direction.delta();
        let x = dx.checked_mul(distance)?.checked_add(self.x)?;
        let y = dy.checked_mul(distance)?.checked_add(self.y)?;
        Some(Self { x, y })
    }

    /// The neighbouring cell in `direction`.
    pub fn step(self, direction: Direction) -> Option<Self> {
        self.offset(direction, 1)
    }

    /// Whether `other` is one of the four axis neighbours of this cell.
    pub fn is_adjacent(self, other: Self) -> bool {
        Direction::ALL
            .iter()
            .any(|&dir| self.step(dir) == Some(other))
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the four axis directions a player or pushed bomb can travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards smaller `x`.
    Left,
    /// Towards larger `x`.
    Right,
    /// Towards smaller `y`.
    Up,
    /// Towards larger `y`.
    Down,
}

impl Direction {
    /// All four directions, in ray-casting order.
    pub const ALL: [Self; 4] = [Self::Left, Self::Right, Self::Up, Self::Down];

    /// Unit `(dx, dy)` for this direction.
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }
}
