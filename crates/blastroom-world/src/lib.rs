//! Room state and the single-writer event reducer.
//!
//! A [`Room`] holds everything peers agree on: players, bombs, blast
//! counters, and the obstacle layout. It is changed only through
//! [`Room::apply`], which is called by exactly one serializer per process.
//! Guards inside the reducer absorb stale, duplicate, and out-of-range
//! events silently, which is what lets peers tolerate at-least-once and
//! out-of-order delivery.
//!
//! # Modules
//!
//! - [`entities`] -- Player and bomb records
//! - [`cancel`] -- Per-bomb single-use cancellation signal
//! - [`blast`] -- Explosion ray-casting
//! - [`room`] -- The room state and its read accessors
//! - [`reducer`] -- [`Room::apply`] and its outcome types

pub mod blast;
pub mod cancel;
pub mod entities;
pub mod reducer;
pub mod room;

pub use cancel::{CancelListener, CancelSignal};
pub use entities::{BombState, PlayerState};
pub use reducer::{Applied, Explosion, Ignored};
pub use room::{Room, RoomSummary};
