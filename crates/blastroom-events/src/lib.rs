//! Event model and wire codec for the Blastroom world-state synchronizer.
//!
//! Every state change in a room is an immutable [`Event`]. Events are the
//! source of truth: each peer rebuilds its picture of the room by applying
//! the events it has seen, in the order it saw them.
//!
//! One broker channel carries every kind of event, so all of them share a
//! single flat envelope, the [`WireRecord`]. Fields a kind does not use stay
//! at their zero value.
//!
//! # Modules
//!
//! - [`event`] -- The closed set of event kinds and their payloads
//! - [`wire`] -- The flat wire record, encoding, and fallible decoding

pub mod event;
pub mod wire;

pub use event::{BombRef, Event, EventKind, PlayerSnapshot};
pub use wire::{DecodeError, WireRecord, decode, encode};
