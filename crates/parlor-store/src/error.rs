//! Error types for the store layer.

use parlor_protocol::ProtocolError;

/// Errors returned by a [`RoomStore`](crate::RoomStore).
///
/// The coordinator treats every store error as a collaborator failure: the
/// room being processed is closed rather than left half-updated.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not complete the operation (connection lost,
    /// command rejected, injected failure in tests).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The backend answered with something the protocol never produces.
    #[error("unexpected reply for {key}: {reason}")]
    UnexpectedReply { key: String, reason: String },
}
