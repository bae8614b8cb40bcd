//! Shared grid primitives for the Blastroom world-state synchronizer.
//!
//! Every other crate in the workspace speaks in terms of these types, so they
//! stay small and dependency-free apart from `serde`.
//!
//! # Modules
//!
//! - [`position`] -- Integer cell coordinates and the four axis directions
//! - [`grid`] -- Arena dimensions, bounds checks, and flat-index conversion

pub mod grid;
pub mod position;

pub use grid::{Grid, GridError};
pub use position::{Direction, Position};
