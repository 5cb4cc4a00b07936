//! Signing keys.
//!
//! [`Keys`] holds a secp256k1 keypair. It signs drafts into [`Event`]s and
//! provides the secret key for NIP-44 ECDH. `Debug` never prints the secret.

use secp256k1::{Keypair, Message, Secp256k1, SecretKey};
use std::fmt;
use zeroize::Zeroize;

use crate::{Event, PublicKey, TypesError, UnsignedEvent};

/// A secp256k1 keypair used for Schnorr signing.
#[derive(Clone)]
pub struct Keys {
    keypair: Keypair,
    public_key: PublicKey,
}

impl Keys {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut rand::thread_rng());
        Self::from_keypair(keypair)
    }

    /// Load keys from a 32-byte secret key.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, TypesError> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, bytes)
            .map_err(|e| TypesError::InvalidKey(e.to_string()))?;
        Ok(Self::from_keypair(keypair))
    }

    /// Load keys from a 64-character hex secret key.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, TypesError> {
        let mut bytes = hex::decode(hex_str.trim())?;
        let keys = Self::from_secret_bytes(&bytes);
        bytes.zeroize();
        keys
    }

    fn from_keypair(keypair: Keypair) -> Self {
        let (xonly, _parity) = keypair.x_only_public_key();
        Self {
            keypair,
            public_key: PublicKey::from(xonly),
        }
    }

    /// The x-only public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// The secret key, for ECDH.
    pub fn secret_key(&self) -> SecretKey {
        self.keypair.secret_key()
    }

    /// Hex-encoded secret key. Handle with care: this is the only way the
    /// secret leaves this type.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    /// Sign a draft, producing an immutable event authored by these keys.
    ///
    /// The draft's `created_at`, `kind`, `tags` and `content` are carried over
    /// unchanged.
    pub fn sign(&self, draft: UnsignedEvent) -> Result<Event, TypesError> {
        let id = draft.id_for(&self.public_key);
        let secp = Secp256k1::signing_only();
        let sig = secp.sign_schnorr_no_aux_rand(&Message::from_digest(id), &self.keypair);
        let event = Event::from_parts(id, self.public_key, draft, sig.serialize());
        Ok(event)
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("public_key", &self.public_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
