//! Distribution layer for the Blastroom world-state synchronizer.
//!
//! Peers in a room never talk to each other directly. Every event goes
//! through a message broker on one of two channels:
//!
//! - `<room>`: every player and bomb event, broadcast to all peers
//! - `<room>-obstacle`: obstacle layouts, written by one elected leader
//!
//! # Modules
//!
//! - [`broker`] -- The [`Broker`] seam: channels, acks, leases, retained values
//! - [`nats`] -- [`NatsBroker`], the production transport over NATS `JetStream`
//! - [`memory`] -- [`MemoryBroker`], an in-process transport for tests and demos
//! - [`client`] -- [`DistributionClient`], queues and background tasks for one room
//! - [`layout`] -- Random obstacle layouts
//! - [`error`] -- [`NetError`]

pub mod broker;
pub mod client;
pub mod error;
pub mod layout;
pub mod memory;
pub mod nats;

pub use broker::{Acquisition, Broker, Delivery, Subscription};
pub use client::{ClientSettings, DistributionClient, Publisher};
pub use error::NetError;
pub use layout::sample_layout;
pub use memory::MemoryBroker;
pub use nats::NatsBroker;
