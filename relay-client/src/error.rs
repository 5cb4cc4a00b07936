//! Error types for relay I/O and signing.

use std::time::Duration;
use thiserror::Error;
use relay_core::{RpcError, UriError};
use relay_types::TypesError;

use crate::crypto::CryptoError;
use crate::session::SessionError;
use crate::transport::TransportError;

/// Errors talking to a single relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Every connection attempt failed.
    #[error("could not connect to {url} after {attempts} attempt(s): {reason}")]
    Connect {
        /// Relay URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// The relay sent something we cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No correlated response within the deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from a [`SignerPort`](crate::signer::SignerPort).
#[derive(Debug, Error)]
pub enum SignerError {
    /// No key holder, or the signer was closed.
    #[error("signer unavailable")]
    Unavailable,

    /// The remote signer did not answer in time.
    #[error("remote signer did not respond within {0:?}")]
    RemoteTimeout(Duration),

    /// The remote signer refused the connection.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The remote signer answered a request with an error.
    #[error("remote signer error: {0}")]
    Remote(String),

    /// The signer speaks for a different user than expected.
    #[error("identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch {
        /// Pubkey we expected (hex).
        expected: String,
        /// Pubkey we got (hex).
        actual: String,
    },

    /// A returned event failed verification.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Malformed remote signer traffic.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Payload encryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Bad bunker:// or nostrconnect:// URI.
    #[error("uri error: {0}")]
    Uri(#[from] UriError),

    /// The relay channel could not be used.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// Caller cancelled the handshake.
    #[error("cancelled")]
    Cancelled,

    /// Session persistence failed.
    #[error("session store error: {0}")]
    Store(#[from] SessionError),
}

impl From<TypesError> for SignerError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::InvalidSignature(msg) => SignerError::InvalidSignature(msg),
            TypesError::IdMismatch { expected, actual } => SignerError::InvalidSignature(format!(
                "id mismatch: expected {expected}, got {actual}"
            )),
            other => SignerError::Protocol(other.to_string()),
        }
    }
}

impl From<RpcError> for SignerError {
    fn from(e: RpcError) -> Self {
        SignerError::Protocol(e.to_string())
    }
}
