//! Identity types for relay traffic.

use secp256k1::XOnlyPublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// An x-only secp256k1 public key identifying an author or signer.
///
/// 32 bytes, displayed as lowercase hex (the Nostr wire form).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(XOnlyPublicKey);

impl PublicKey {
    /// Create a PublicKey from raw bytes, checking that it is a valid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        XOnlyPublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| TypesError::InvalidKey(e.to_string()))
    }

    /// Parse a PublicKey from its 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes of this PublicKey.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.serialize()
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The secp256k1 x-only key, for verification and ECDH.
    pub fn as_xonly(&self) -> &XOnlyPublicKey {
        &self.0
    }
}

impl From<XOnlyPublicKey> for PublicKey {
    fn from(key: XOnlyPublicKey) -> Self {
        Self(key)
    }
}

impl FromStr for PublicKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..8])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A per-call subscription identifier for `REQ`/`CLOSE`.
///
/// 8 random bytes rendered as 16 hex characters, well under the 64-character
/// limit relays enforce.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a fresh random subscription id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(hex::encode(bytes))
    }

    /// Wrap an existing id (e.g. one echoed back by a relay).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keys;

    #[test]
    fn public_key_hex_roundtrip() {
        let keys = Keys::generate();
        let pk = keys.public_key();
        let restored = PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, restored);
        assert_eq!(pk.to_string().len(), 64);
    }

    #[test]
    fn public_key_rejects_bad_input() {
        assert!(PublicKey::from_hex("zz").is_err());
        assert!(PublicKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn public_key_serializes_as_hex_string() {
        let pk = Keys::generate().public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn public_key_debug_is_short() {
        let pk = Keys::generate().public_key();
        let debug = format!("{:?}", pk);
        assert_eq!(debug, format!("PublicKey({})", &pk.to_hex()[..8]));
    }

    #[test]
    fn subscription_ids_are_fresh() {
        let a = SubscriptionId::generate();
        let b = SubscriptionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }
}
