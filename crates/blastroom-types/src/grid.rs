//! Arena dimensions.
//!
//! The grid is the only authority on whether a [`Position`] is valid. Cells
//! are also addressable by a flat row-major index, which is how obstacle
//! layouts travel on the wire.

use crate::position::{Direction, Position};

/// Errors raised when constructing a [`Grid`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GridError {
    /// Width or height is zero.
    #[error("grid dimensions must be non-zero (got {width}x{height})")]
    Empty {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A dimension does not fit the coordinate type.
    #[error("grid dimension {0} exceeds the coordinate range")]
    TooLarge(u32),
}

/// Rectangular arena of `width` x `height` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grid {
    width: i32,
    height: i32,
}

impl Grid {
    /// Build a grid from its dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Empty`] for a zero dimension and
    /// [`GridError::TooLarge`] if a dimension does not fit in `i32`.
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::Empty { width, height });
        }
        let w = i32::try_from(width).map_err(|_err| GridError::TooLarge(width))?;
        let h = i32::try_from(height).map_err(|_err| GridError::TooLarge(height))?;
        Ok(Self {
            width: w,
            height: h,
        })
    }

    /// Number of columns.
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Whether `pos` lies inside the arena.
    pub const fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        let w = usize::try_from(self.width).unwrap_or(0);
        let h = usize::try_from(self.height).unwrap_or(0);
        w.saturating_mul(h)
    }

    /// Row-major index of `pos`, or `None` when out of bounds.
    pub fn index_of(&self, pos: Position) -> Option<i64> {
        if !self.contains(pos) {
            return None;
        }
        i64::from(pos.y)
            .checked_mul(i64::from(self.width))?
            .checked_add(i64::from(pos.x))
    }

    /// Cell at row-major `index`, or `None` when the index is outside the grid.
    pub fn position_of(&self, index: i64) -> Option<Position> {
        if index < 0 {
            return None;
        }
        let width = i64::from(self.width);
        let x = i32::try_from(index.checked_rem(width)?).ok()?;
        let y = i32::try_from(index.checked_div(width)?).ok()?;
        let pos = Position::new(x, y);
        self.contains(pos).then_some(pos)
    }

    /// The neighbour of `pos` in `direction`, or `pos` itself when that
    /// neighbour would leave the arena.
    pub fn step_clamped(&self, pos: Position, direction: Direction) -> Position {
        pos.step(direction)
            .filter(|next| self.contains(*next))
            .unwrap_or(pos)
    }
}
