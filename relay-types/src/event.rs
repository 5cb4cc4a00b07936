//! Nostr event model.
//!
//! An [`UnsignedEvent`] is a draft built by collaborator code. Signing it (see
//! [`Keys::sign`](crate::Keys::sign)) yields an immutable [`Event`] whose id is
//! the SHA-256 of the canonical serialization
//! `[0, pubkey, created_at, kind, tags, content]`.

use secp256k1::{schnorr::Signature, Message, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{PublicKey, TypesError};

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// The first element names the tag and the following elements hold data:
///
/// - `p` – references another author's public key
/// - `e` – links to another event ID
/// - `a` – links to a replaceable event coordinate (`kind:pubkey:d`)
/// - `d` – unique identifier for parameterized replaceable events
///
/// Tags are stored verbatim so custom tags survive signing unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from any list of string-like parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Tag name (first element), if any.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First value after the name, if any.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// An unsigned event draft: everything except author, id and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Kind number, e.g. `0`, `5` or `30078`.
    pub kind: u32,
    /// Ordered tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
}

impl UnsignedEvent {
    /// Create a draft stamped with the current time.
    pub fn new(kind: u32, content: impl Into<String>) -> Self {
        Self {
            created_at: unix_now(),
            kind,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    /// Append a tag.
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Override the creation timestamp.
    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Compute the event id this draft gets when signed by `pubkey`.
    pub fn id_for(&self, pubkey: &PublicKey) -> [u8; 32] {
        canonical_hash(pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// JSON form sent to remote signers (`sign_event` parameter).
    pub fn to_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Hash the canonical serialization of an event's fields.
fn canonical_hash(
    pubkey: &PublicKey,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> [u8; 32] {
    let canonical = serde_json::json!([0, pubkey.to_hex(), created_at, kind, tags, content]);
    // Serializing a `Value` built from strings and integers cannot fail.
    let data = serde_json::to_vec(&canonical).unwrap_or_default();
    Sha256::digest(&data).into()
}

/// A signed, immutable Nostr event.
///
/// ```json
/// {
///   "id": "4376c65d...",
///   "pubkey": "6e468422...",
///   "created_at": 1700000000,
///   "kind": 30078,
///   "tags": [["d", "podcast:feed:1234"]],
///   "content": "<rss ...>",
///   "sig": "908a15e4..."
/// }
/// ```
///
/// Fields are read-only; a new version of a record is a new event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    id: String,
    pubkey: PublicKey,
    created_at: u64,
    kind: u32,
    tags: Vec<Tag>,
    content: String,
    sig: String,
}

impl Event {
    pub(crate) fn from_parts(
        id: [u8; 32],
        pubkey: PublicKey,
        draft: UnsignedEvent,
        sig: [u8; 64],
    ) -> Self {
        Self {
            id: hex::encode(id),
            pubkey,
            created_at: draft.created_at,
            kind: draft.kind,
            tags: draft.tags,
            content: draft.content,
            sig: hex::encode(sig),
        }
    }

    /// Parse an event from its JSON form without verifying it.
    pub fn from_json(json: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, TypesError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Event identifier (hex of SHA-256 hash).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Author public key.
    pub fn pubkey(&self) -> &PublicKey {
        &self.pubkey
    }

    /// Unix timestamp of creation.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Kind number.
    pub fn kind(&self) -> u32 {
        self.kind
    }

    /// Ordered tags.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Content body.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Schnorr signature (hex).
    pub fn sig(&self) -> &str {
        &self.sig
    }

    /// Recompute the canonical hash of this event's fields.
    pub fn compute_id(&self) -> String {
        hex::encode(canonical_hash(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
    }

    /// Check that the id matches the fields and the signature matches the id.
    pub fn verify(&self) -> Result<(), TypesError> {
        let hash = canonical_hash(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        let calc_id = hex::encode(hash);
        if calc_id != self.id {
            return Err(TypesError::IdMismatch {
                expected: calc_id,
                actual: self.id.clone(),
            });
        }
        let sig = Signature::from_slice(&hex::decode(&self.sig)?)
            .map_err(|e| TypesError::InvalidSignature(e.to_string()))?;
        let secp = Secp256k1::verification_only();
        let msg = Message::from_digest(hash);
        secp.verify_schnorr(&sig, &msg, self.pubkey.as_xonly())
            .map_err(|e| TypesError::InvalidSignature(e.to_string()))
    }

    /// True when this event carries exactly the draft's fields.
    pub fn matches_draft(&self, draft: &UnsignedEvent) -> bool {
        self.created_at == draft.created_at
            && self.kind == draft.kind
            && self.tags == draft.tags
            && self.content == draft.content
    }

    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name() == Some(name))
            .and_then(Tag::value)
    }

    /// The `d` tag identifier of a parameterized replaceable event.
    pub fn identifier(&self) -> Option<&str> {
        self.tag_value("d")
    }

    /// Kinds 0, 3 and 10000–19999: one live version per author and kind.
    pub fn is_replaceable(&self) -> bool {
        self.kind == 0 || self.kind == 3 || (10_000..20_000).contains(&self.kind)
    }

    /// Kinds 30000–39999: one live version per author, kind and `d` tag.
    pub fn is_parameterized_replaceable(&self) -> bool {
        (30_000..40_000).contains(&self.kind)
    }

    /// `kind:pubkey:d` coordinate used by `a` tags.
    pub fn coordinate(&self) -> Option<String> {
        if self.is_parameterized_replaceable() {
            Some(format!(
                "{}:{}:{}",
                self.kind,
                self.pubkey,
                self.identifier().unwrap_or_default()
            ))
        } else if self.is_replaceable() {
            Some(format!("{}:{}:", self.kind, self.pubkey))
        } else {
            None
        }
    }
}
