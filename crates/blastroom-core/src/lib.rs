//! Peer runtime for the Blastroom world-state synchronizer.
//!
//! Ties the room reducer to the distribution client and the timers that
//! produce follow-up events. A host (the node binary, or a renderer) loads
//! a [`RoomConfig`], starts a [`Session`], and calls [`Session::tick`] once
//! per frame.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with environment overrides
//! - [`orchestrator`] -- Fuse, decay, push, and random-bomb tasks
//! - [`session`] -- The single-writer frame loop
//! - [`error`] -- [`SessionError`]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;

pub use config::{ConfigError, RoomConfig};
pub use error::SessionError;
pub use orchestrator::{Followup, Orchestrator, Timings};
pub use session::{FrameIntent, SPAWN, Session, TickReport};
