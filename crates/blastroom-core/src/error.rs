//! Error types for session setup.

use blastroom_net::NetError;

use crate::config::ConfigError;

/// Errors that stop a session from starting.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Joining the room failed.
    #[error(transparent)]
    Net(#[from] NetError),
}
