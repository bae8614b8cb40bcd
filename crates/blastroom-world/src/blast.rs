//! Explosion geometry.
//!
//! A blast covers its origin plus up to `length` cells along each of the four
//! axis directions. A ray ends at the arena border or at the first obstacle,
//! and the obstacle cell itself is not covered. The origin is always covered,
//! even when a newer obstacle layout has put an obstacle on it.

use std::collections::BTreeSet;

use blastroom_types::{Direction, Grid, Position};

/// Cells covered by a blast at `origin`, origin first, then each ray in
/// [`Direction::ALL`] order. Every returned cell is inside `grid`.
pub fn footprint(
    grid: &Grid,
    origin: Position,
    length: u32,
    obstacles: &BTreeSet<Position>,
) -> Vec<Position> {
    let mut cells = Vec::new();
    if !grid.contains(origin) {
        return cells;
    }
    cells.push(origin);

    let reach = i32::try_from(length).unwrap_or(i32::MAX);
    for direction in Direction::ALL {
        for distance in 1..=reach {
            let Some(cell) = origin.offset(direction, distance) else {
                break;
            };
            if !grid.contains(cell) || obstacles.contains(&cell) {
                break;
            }
            cells.push(cell);
        }
    }
    cells
}
