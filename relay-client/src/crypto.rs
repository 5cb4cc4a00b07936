//! NIP-44 v2 payload encryption for remote signer traffic.
//!
//! This module provides:
//! - [`ConversationKey`]: ECDH between our secret key and a peer's x-only key,
//!   run through HKDF-extract with salt `nip44-v2`
//! - [`encrypt`] / [`decrypt`]: ChaCha20 over a length-prefixed, padded
//!   plaintext, authenticated with HMAC-SHA256
//!
//! Payload layout (base64): `0x02 || nonce(32) || ciphertext || mac(32)`.
//!
//! # Security Notes
//!
//! - Per-message keys come from HKDF-expand with the random 32-byte nonce
//! - The MAC covers nonce and ciphertext and is checked before decryption
//! - Padding hides plaintext length to within a power-of-two bucket

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use relay_types::PublicKey;
use secp256k1::{ecdh, Parity, SecretKey};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Payload version byte.
pub const VERSION: u8 = 2;

/// Nonce size (256 bits).
pub const NONCE_SIZE: usize = 32;

/// Smallest plaintext accepted.
pub const MIN_PLAINTEXT_SIZE: usize = 1;

/// Largest plaintext accepted.
pub const MAX_PLAINTEXT_SIZE: usize = 65535;

const SALT: &[u8] = b"nip44-v2";
const MAC_SIZE: usize = 32;

/// Crypto errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The peer key could not be used for ECDH.
    #[error("invalid peer key: {0}")]
    InvalidKey(String),

    /// Plaintext is empty or too long.
    #[error("invalid plaintext length: {0}")]
    InvalidPlaintextLength(usize),

    /// Payload is not valid base64 or has the wrong size.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Unknown version byte.
    #[error("unsupported encryption version: {0}")]
    UnsupportedVersion(u8),

    /// MAC check failed.
    #[error("decryption failed: authentication error")]
    InvalidMac,

    /// Padding or length prefix is inconsistent.
    #[error("invalid padding")]
    InvalidPadding,
}

/// Shared key between two parties, symmetric in who computes it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    /// Derive from our secret key and the peer's public key.
    pub fn derive(secret: &SecretKey, peer: &PublicKey) -> Result<Self, CryptoError> {
        let full = secp256k1::PublicKey::from_x_only_public_key(*peer.as_xonly(), Parity::Even);
        let mut point = ecdh::shared_secret_point(&full, secret);
        let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), &point[..32]);
        point.zeroize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&prk);
        Ok(Self(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn message_keys(&self, nonce: &[u8; NONCE_SIZE]) -> Result<MessageKeys, CryptoError> {
        let hkdf = Hkdf::<Sha256>::from_prk(&self.0)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let mut okm = [0u8; 76];
        hkdf.expand(nonce, &mut okm)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let mut keys = MessageKeys {
            chacha_key: [0u8; 32],
            chacha_nonce: [0u8; 12],
            hmac_key: [0u8; 32],
        };
        keys.chacha_key.copy_from_slice(&okm[0..32]);
        keys.chacha_nonce.copy_from_slice(&okm[32..44]);
        keys.hmac_key.copy_from_slice(&okm[44..76]);
        okm.zeroize();
        Ok(keys)
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConversationKey([REDACTED])")
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

/// Padded length for a plaintext of `len` bytes.
pub fn calc_padded_len(len: usize) -> usize {
    if len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT_SIZE..=MAX_PLAINTEXT_SIZE).contains(&len) {
        return Err(CryptoError::InvalidPlaintextLength(len));
    }
    let mut padded = Vec::with_capacity(2 + calc_padded_len(len));
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(2 + calc_padded_len(len), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if padded.len() < 2 {
        return Err(CryptoError::InvalidPadding);
    }
    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if len < MIN_PLAINTEXT_SIZE || padded.len() != 2 + calc_padded_len(len) {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(padded[2..2 + len].to_vec())
}

fn mac(hmac_key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Hmac<Sha256> {
    // HMAC accepts keys of any length
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(hmac_key)
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(nonce);
    mac.update(ciphertext);
    mac
}

/// Encrypt `plaintext` with a fresh random nonce.
pub fn encrypt(key: &ConversationKey, plaintext: &str) -> Result<String, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).expect("getrandom failed");
    encrypt_with_nonce(key, plaintext, &nonce)
}

/// Encrypt with a caller-chosen nonce. Only for test vectors.
pub fn encrypt_with_nonce(
    key: &ConversationKey,
    plaintext: &str,
    nonce: &[u8; NONCE_SIZE],
) -> Result<String, CryptoError> {
    let keys = key.message_keys(nonce)?;
    let mut buf = pad(plaintext.as_bytes())?;
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut buf);
    let tag = mac(&keys.hmac_key, nonce, &buf).finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + NONCE_SIZE + buf.len() + MAC_SIZE);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&buf);
    payload.extend_from_slice(&tag);
    Ok(STANDARD.encode(payload))
}

/// Decrypt a base64 payload.
pub fn decrypt(key: &ConversationKey, payload: &str) -> Result<String, CryptoError> {
    if payload.starts_with('#') {
        return Err(CryptoError::UnsupportedVersion(0));
    }
    if !(132..=87_472).contains(&payload.len()) {
        return Err(CryptoError::InvalidPayload(format!(
            "payload length {}",
            payload.len()
        )));
    }
    let data = STANDARD
        .decode(payload)
        .map_err(|e| CryptoError::InvalidPayload(e.to_string()))?;
    if !(99..=65_603).contains(&data.len()) {
        return Err(CryptoError::InvalidPayload(format!(
            "decoded length {}",
            data.len()
        )));
    }
    if data[0] != VERSION {
        return Err(CryptoError::UnsupportedVersion(data[0]));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&data[1..1 + NONCE_SIZE]);
    let ciphertext = &data[1 + NONCE_SIZE..data.len() - MAC_SIZE];
    let tag = &data[data.len() - MAC_SIZE..];

    let keys = key.message_keys(&nonce)?;
    mac(&keys.hmac_key, &nonce, ciphertext)
        .verify_slice(tag)
        .map_err(|_| CryptoError::InvalidMac)?;

    let mut buf = ciphertext.to_vec();
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut buf);
    let plaintext = unpad(&buf)?;
    buf.zeroize();
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidPadding)
}
