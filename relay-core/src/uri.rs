//! Remote signer connection URIs.
//!
//! This module provides:
//! - [`BunkerPointer`]: `bunker://<remote-pubkey>?relay=..&secret=..`, handed
//!   out by a remote signer and persisted for silent reconnects
//! - [`NostrConnectUri`]: `nostrconnect://<client-pubkey>?relay=..&secret=..`,
//!   generated by this client and shown to the user (text or QR)
//! - [`ConnectSecret`]: the one-time secret both flows carry
//!
//! The client-initiated flow:
//! 1. Client generates ephemeral keys and a secret, builds a `nostrconnect://` URI
//! 2. URI is displayed as text or QR code
//! 3. The remote signer replies on the listed relays with the secret as result
//! 4. The reply's author is the remote signer's pubkey

use relay_types::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Scheme of remote-signer-issued pointers.
pub const BUNKER_SCHEME: &str = "bunker";

/// Scheme of client-issued connection URIs.
pub const NOSTRCONNECT_SCHEME: &str = "nostrconnect";

/// Error type for URI parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    /// The string is not a URI at all.
    #[error("invalid uri: {0}")]
    Invalid(String),
    /// The scheme is not the one expected.
    #[error("expected {expected}:// uri, got {found}://")]
    WrongScheme {
        /// Expected scheme.
        expected: &'static str,
        /// Scheme found.
        found: String,
    },
    /// The host part is not a valid public key.
    #[error("invalid public key in uri: {0}")]
    InvalidPubkey(String),
    /// No `relay` parameter present.
    #[error("uri lists no relays")]
    MissingRelays,
    /// A relay is not a ws:// or wss:// URL.
    #[error("invalid relay url: {0}")]
    InvalidRelay(String),
    /// A nostrconnect URI without `secret`.
    #[error("uri has no secret")]
    MissingSecret,
}

/// A one-time secret exchanged during the remote signer handshake.
///
/// Redacted in `Debug`, zeroed on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ConnectSecret(String);

impl ConnectSecret {
    /// Generate a random secret (16 bytes, hex).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        let secret = Self(hex::encode(bytes));
        bytes.zeroize();
        secret
    }

    /// Wrap an existing secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the secret string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConnectSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectSecret([REDACTED])")
    }
}

/// Pointer to a remote signer: `{remote_pubkey, relays, secret}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BunkerPointer {
    /// The remote signer's public key (not necessarily the user's).
    pub remote_pubkey: PublicKey,
    /// Relays the remote signer listens on.
    pub relays: Vec<String>,
    /// Optional one-time secret for the first connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<ConnectSecret>,
}

impl BunkerPointer {
    /// Parse a `bunker://` URI.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let (remote_pubkey, params) = split_uri(uri, BUNKER_SCHEME)?;
        let relays = params.relays()?;
        Ok(Self {
            remote_pubkey,
            relays,
            secret: params.secret.map(ConnectSecret::new),
        })
    }

    /// Render as a `bunker://` URI.
    pub fn to_uri(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for relay in &self.relays {
            query.append_pair("relay", relay);
        }
        if let Some(secret) = &self.secret {
            query.append_pair("secret", secret.as_str());
        }
        format!("{BUNKER_SCHEME}://{}?{}", self.remote_pubkey, query.finish())
    }
}

impl fmt::Display for BunkerPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Client-issued connection URI for the client-initiated handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NostrConnectUri {
    /// Ephemeral client public key.
    pub client_pubkey: PublicKey,
    /// Relays the client listens on.
    pub relays: Vec<String>,
    /// Secret the remote signer must echo back.
    pub secret: ConnectSecret,
    /// Requested permissions, e.g. `sign_event:30078,sign_event:5`.
    pub perms: Option<String>,
    /// Application name shown by the remote signer.
    pub name: Option<String>,
}

impl NostrConnectUri {
    /// Parse a `nostrconnect://` URI.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let (client_pubkey, params) = split_uri(uri, NOSTRCONNECT_SCHEME)?;
        let relays = params.relays()?;
        let secret = params.secret.ok_or(UriError::MissingSecret)?;
        Ok(Self {
            client_pubkey,
            relays,
            secret: ConnectSecret::new(secret),
            perms: params.perms,
            name: params.name,
        })
    }

    /// Render as a `nostrconnect://` URI.
    pub fn to_uri(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for relay in &self.relays {
            query.append_pair("relay", relay);
        }
        query.append_pair("secret", self.secret.as_str());
        if let Some(perms) = &self.perms {
            query.append_pair("perms", perms);
        }
        if let Some(name) = &self.name {
            query.append_pair("name", name);
        }
        format!(
            "{NOSTRCONNECT_SCHEME}://{}?{}",
            self.client_pubkey,
            query.finish()
        )
    }
}

impl fmt::Display for NostrConnectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

#[derive(Default)]
struct Params {
    relays: Vec<String>,
    secret: Option<String>,
    perms: Option<String>,
    name: Option<String>,
}

impl Params {
    fn relays(&self) -> Result<Vec<String>, UriError> {
        if self.relays.is_empty() {
            return Err(UriError::MissingRelays);
        }
        for relay in &self.relays {
            validate_relay_url(relay)?;
        }
        Ok(self.relays.clone())
    }
}

fn split_uri(uri: &str, scheme: &'static str) -> Result<(PublicKey, Params), UriError> {
    let parsed = Url::parse(uri.trim()).map_err(|e| UriError::Invalid(e.to_string()))?;
    if parsed.scheme() != scheme {
        return Err(UriError::WrongScheme {
            expected: scheme,
            found: parsed.scheme().to_string(),
        });
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| UriError::InvalidPubkey("missing".into()))?;
    let pubkey = PublicKey::from_hex(&host.to_ascii_lowercase())
        .map_err(|e| UriError::InvalidPubkey(e.to_string()))?;

    let mut params = Params::default();
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "relay" => {
                let value = value.into_owned();
                if !params.relays.contains(&value) {
                    params.relays.push(value);
                }
            }
            "secret" if !value.is_empty() => params.secret = Some(value.into_owned()),
            "perms" if !value.is_empty() => params.perms = Some(value.into_owned()),
            "name" if !value.is_empty() => params.name = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok((pubkey, params))
}

/// Check that `relay` is a ws:// or wss:// URL.
pub fn validate_relay_url(relay: &str) -> Result<(), UriError> {
    let url = Url::parse(relay).map_err(|_| UriError::InvalidRelay(relay.to_string()))?;
    match url.scheme() {
        "ws" | "wss" if url.host_str().is_some() => Ok(()),
        _ => Err(UriError::InvalidRelay(relay.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::Keys;

    fn pubkey() -> PublicKey {
        Keys::generate().public_key()
    }

    #[test]
    fn bunker_roundtrip() {
        let pointer = BunkerPointer {
            remote_pubkey: pubkey(),
            relays: vec!["wss://relay.one".into(), "wss://relay.two/path".into()],
            secret: Some(ConnectSecret::new("s3cret")),
        };
        let uri = pointer.to_uri();
        assert!(uri.starts_with("bunker://"));
        assert_eq!(BunkerPointer::parse(&uri).unwrap(), pointer);
    }

    #[test]
    fn bunker_parses_percent_encoded_relays() {
        let pk = pubkey();
        let uri = format!("bunker://{pk}?relay=wss%3A%2F%2Frelay.example.com&relay=wss://r2.example");
        let pointer = BunkerPointer::parse(&uri).unwrap();
        assert_eq!(pointer.remote_pubkey, pk);
        assert_eq!(
            pointer.relays,
            vec!["wss://relay.example.com", "wss://r2.example"]
        );
        assert!(pointer.secret.is_none());
    }

    #[test]
    fn bunker_dedupes_relays() {
        let uri = format!("bunker://{}?relay=wss://a&relay=wss://a", pubkey());
        assert_eq!(BunkerPointer::parse(&uri).unwrap().relays.len(), 1);
    }

    #[test]
    fn bunker_rejects_bad_input() {
        let pk = pubkey();
        assert!(matches!(
            BunkerPointer::parse("not a uri"),
            Err(UriError::Invalid(_))
        ));
        assert!(matches!(
            BunkerPointer::parse(&format!("nostrconnect://{pk}?relay=wss://a")),
            Err(UriError::WrongScheme { .. })
        ));
        assert!(matches!(
            BunkerPointer::parse("bunker://deadbeef?relay=wss://a"),
            Err(UriError::InvalidPubkey(_))
        ));
        assert!(matches!(
            BunkerPointer::parse(&format!("bunker://{pk}")),
            Err(UriError::MissingRelays)
        ));
        assert!(matches!(
            BunkerPointer::parse(&format!("bunker://{pk}?relay=https://a")),
            Err(UriError::InvalidRelay(_))
        ));
    }

    #[test]
    fn bunker_pointer_persists_as_json() {
        let pointer = BunkerPointer {
            remote_pubkey: pubkey(),
            relays: vec!["wss://relay.one".into()],
            secret: None,
        };
        let json = serde_json::to_string(&pointer).unwrap();
        assert!(!json.contains("secret"));
        let back: BunkerPointer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pointer);
    }

    #[test]
    fn nostrconnect_roundtrip() {
        let uri = NostrConnectUri {
            client_pubkey: pubkey(),
            relays: vec!["wss://relay.one".into()],
            secret: ConnectSecret::generate(),
            perms: Some("sign_event:30078,sign_event:5".into()),
            name: Some("Tunecast Studio".into()),
        };
        let rendered = uri.to_uri();
        assert!(rendered.starts_with("nostrconnect://"));
        assert!(rendered.contains("name=Tunecast+Studio"));
        assert_eq!(NostrConnectUri::parse(&rendered).unwrap(), uri);
    }

    #[test]
    fn nostrconnect_requires_secret() {
        let uri = format!("nostrconnect://{}?relay=wss://a", pubkey());
        assert_eq!(NostrConnectUri::parse(&uri), Err(UriError::MissingSecret));
    }

    #[test]
    fn generated_secrets_differ() {
        let a = ConnectSecret::generate();
        let b = ConnectSecret::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = ConnectSecret::new("hunter2");
        let debug = format!("{:?}", secret);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn relay_validation() {
        assert!(validate_relay_url("wss://relay.damus.io").is_ok());
        assert!(validate_relay_url("ws://127.0.0.1:7777").is_ok());
        assert!(validate_relay_url("http://relay").is_err());
        assert!(validate_relay_url("relay").is_err());
    }
}
