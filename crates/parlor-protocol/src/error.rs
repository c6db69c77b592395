//! Error types for the protocol layer.
//!
//! Each crate in Parlor defines its own error enum. A `ProtocolError` always
//! means the problem is in serialization of an envelope or notification,
//! not in the store, the bus, or a game engine.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning an envelope into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning mailbox bytes into an envelope).
    ///
    /// Common causes: a mailbox entry written by an incompatible version,
    /// or a truncated value in the store.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The envelope decoded but is missing something the coordinator needs,
    /// e.g. a `spectate` event without a room id.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}
