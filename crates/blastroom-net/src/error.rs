//! Error types for the distribution layer.

/// Errors raised while talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to connect to or communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// Another live process already holds this identity in the room.
    #[error("identity {identity} is already present in room {room}")]
    DuplicateIdentity {
        /// The contested identity.
        identity: String,
        /// The room it was contested in.
        room: String,
    },

    /// An outbound event could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The client has shut down and no more events will arrive.
    #[error("distribution client closed")]
    Closed,
}
