//! NIP-46 request/response payloads.
//!
//! These are the plaintexts carried (NIP-44 encrypted) in the content of
//! kind-24133 events:
//!
//! ```json
//! {"id": "<random>", "method": "sign_event", "params": ["<draft json>"]}
//! {"id": "<same>", "result": "<signed event json>", "error": null}
//! ```

use relay_types::{PublicKey, UnsignedEvent};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::uri::ConnectSecret;

/// Result value a remote signer sends for a successful `connect`.
pub const ACK: &str = "ack";

/// Result value a remote signer sends for `ping`.
pub const PONG: &str = "pong";

/// Result marker for an authentication challenge; the URL is in `error`.
pub const AUTH_URL: &str = "auth_url";

/// Error type for NIP-46 payload handling.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Payload is not valid JSON of the expected shape.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Response carries neither result nor error.
    #[error("empty response for request {0}")]
    Empty(String),
}

/// Remote signer methods used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Establish the session.
    Connect,
    /// Sign a draft as the user.
    SignEvent,
    /// Fetch the user's public key.
    GetPublicKey,
    /// Liveness check.
    Ping,
}

impl Method {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "connect",
            Method::SignEvent => "sign_event",
            Method::GetPublicKey => "get_public_key",
            Method::Ping => "ping",
        }
    }
}

/// A request sent to the remote signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRequest {
    /// Random id, echoed in the response.
    pub id: String,
    /// Method name.
    pub method: Method,
    /// Positional string parameters.
    #[serde(default)]
    pub params: Vec<String>,
}

impl RemoteRequest {
    /// Build a request with a fresh random id.
    pub fn new(method: Method, params: Vec<String>) -> Self {
        Self {
            id: request_id(),
            method,
            params,
        }
    }

    /// `connect [remote_pubkey, secret?, perms?]`.
    pub fn connect(
        remote: &PublicKey,
        secret: Option<&ConnectSecret>,
        perms: Option<&str>,
    ) -> Self {
        let mut params = vec![remote.to_hex()];
        match (secret, perms) {
            (Some(s), Some(p)) => params.extend([s.as_str().to_string(), p.to_string()]),
            (Some(s), None) => params.push(s.as_str().to_string()),
            (None, Some(p)) => params.extend([String::new(), p.to_string()]),
            (None, None) => {}
        }
        Self::new(Method::Connect, params)
    }

    /// `sign_event [draft json]`.
    pub fn sign_event(draft: &UnsignedEvent) -> Result<Self, RpcError> {
        let json = serde_json::to_string(draft)?;
        Ok(Self::new(Method::SignEvent, vec![json]))
    }

    /// `get_public_key []`.
    pub fn get_public_key() -> Self {
        Self::new(Method::GetPublicKey, Vec::new())
    }

    /// `ping []`.
    pub fn ping() -> Self {
        Self::new(Method::Ping, Vec::new())
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, RpcError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, RpcError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A response from the remote signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// Id of the request being answered.
    pub id: String,
    /// Result string, method-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error message, or the URL for `auth_url` challenges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a response means to the waiting caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Successful result.
    Result(String),
    /// The remote signer refused or failed.
    Error(String),
    /// The user must visit a URL; the real answer comes later.
    AuthUrl(String),
}

impl RemoteResponse {
    /// Successful response.
    pub fn ok(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Some(result.into()),
            error: None,
        }
    }

    /// Error response.
    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    /// Authentication challenge.
    pub fn auth_url(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Some(AUTH_URL.into()),
            error: Some(url.into()),
        }
    }

    /// Classify the response. An error wins over a result.
    pub fn outcome(&self) -> Result<ResponseOutcome, RpcError> {
        match (self.result.as_deref(), self.error.as_deref()) {
            (Some(AUTH_URL), Some(url)) => Ok(ResponseOutcome::AuthUrl(url.to_string())),
            (_, Some(err)) if !err.is_empty() => Ok(ResponseOutcome::Error(err.to_string())),
            (Some(result), _) => Ok(ResponseOutcome::Result(result.to_string())),
            _ => Err(RpcError::Empty(self.id.clone())),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, RpcError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, RpcError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn request_id() -> String {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    hex::encode(bytes)
}
