//! Error types for relay wire data.

use thiserror::Error;

/// Errors that can occur while decoding, hashing or verifying wire data.
#[derive(Debug, Error)]
pub enum TypesError {
    /// JSON (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A hex string could not be decoded
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Key material was rejected by secp256k1
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature bytes were malformed or did not verify
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The event id does not match the canonical hash of its fields
    #[error("event id mismatch: expected {expected}, got {actual}")]
    IdMismatch {
        /// Id recomputed from the event fields
        expected: String,
        /// Id carried by the event
        actual: String,
    },

    /// A relay or client message did not follow the wire protocol
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::IdMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(err.to_string(), "event id mismatch: expected aa, got bb");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
