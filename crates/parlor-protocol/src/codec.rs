//! Codec trait and implementations for serializing envelopes.
//!
//! The mailbox stores envelopes as opaque bytes. The coordinator and the
//! store agree on a [`Codec`] for turning an [`Envelope`](crate::Envelope)
//! into those bytes and back. [`JsonCodec`] is the only implementation: the
//! stored values stay human-readable, which matters when an operator has to
//! inspect a stuck in-flight slot.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust values to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because stores hold their codec for the lifetime
/// of the process and use it from any Tokio worker thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use parlor_protocol::{Codec, Envelope, EventKind, GameId, JsonCodec, UserId};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::from_user(
///     EventKind::Ready,
///     GameId::new("chess"),
///     UserId::new("alice"),
///     serde_json::Value::Bool(true),
/// );
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, EventKind, GameId, UserId};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_kind_returns_decode_error() {
        let raw = br#"{"type":"teleport","sender":"server","game":"chess"}"#;
        let result: Result<Envelope, _> = JsonCodec.decode(raw);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_preserves_payload() {
        let env = Envelope::from_user(
            EventKind::Turn,
            GameId::new("chess"),
            UserId::new("alice"),
            serde_json::json!({"from": "e2", "to": "e4"}),
        );
        let bytes = JsonCodec.encode(&env).unwrap();
        let back: Envelope = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back.data["to"], "e4");
    }
}
