//! Error types for the node binary.
//!
//! [`NodeError`] wraps every failure that can stop the node during startup,
//! so `main` can propagate with `?`.

/// Top-level error for the node binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: blastroom_core::ConfigError,
    },

    /// Broker connection failed.
    #[error("broker error: {source}")]
    Net {
        /// The underlying network error.
        #[from]
        source: blastroom_net::NetError,
    },

    /// The session could not join the room.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: blastroom_core::SessionError,
    },
}
