//! Draft constructors for the records Tunecast publishes.
//!
//! Every function here is pure: it returns an [`UnsignedEvent`] (or a
//! [`Filter`]) and never touches keys or sockets. Signing preserves the draft's
//! `created_at`, `kind`, `tags` and `content` byte-for-byte.

use relay_types::{Event, Filter, PublicKey, Tag, TypesError, UnsignedEvent};
use serde::{Deserialize, Serialize};

/// Event kinds used by this crate.
pub mod kind {
    /// User metadata (NIP-01).
    pub const METADATA: u32 = 0;
    /// Short text note.
    pub const TEXT_NOTE: u32 = 1;
    /// Deletion request (NIP-09).
    pub const DELETION: u32 = 5;
    /// File metadata (NIP-94).
    pub const FILE_METADATA: u32 = 1063;
    /// Remote signer request/response (NIP-46).
    pub const NOSTR_CONNECT: u32 = 24133;
    /// Application-specific data (NIP-78), used for feed drafts.
    pub const APP_DATA: u32 = 30078;
}

/// `d` tag prefix of feed records.
pub const FEED_PREFIX: &str = "podcast:feed:";

/// Kind-0 profile metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Short handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Bio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    /// NIP-05 identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
}

impl Profile {
    /// Parse a kind-0 event's content.
    pub fn from_event(event: &Event) -> Result<Self, TypesError> {
        if event.kind() != kind::METADATA {
            return Err(TypesError::MalformedMessage(format!(
                "expected kind 0, got {}",
                event.kind()
            )));
        }
        Ok(serde_json::from_str(event.content())?)
    }

    /// Best name to show: display name, then name.
    pub fn best_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.name.as_deref().filter(|s| !s.is_empty()))
    }
}

/// NIP-94 file description for uploaded media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Where the file can be downloaded.
    pub url: String,
    /// MIME type, e.g. `audio/mpeg`.
    pub mime: String,
    /// Hex SHA-256 of the file.
    pub sha256: String,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Accessibility description; also the content.
    pub alt: Option<String>,
    /// `<width>x<height>` for images.
    pub dim: Option<String>,
}

/// Pure draft constructors.
pub struct EventBuilder;

impl EventBuilder {
    /// Filter for an author's latest profile.
    pub fn profile_filter(pubkey: PublicKey) -> Filter {
        Filter::new()
            .author(pubkey)
            .kind(kind::METADATA)
            .limit(1)
    }

    /// Kind-0 profile draft.
    pub fn metadata(profile: &Profile) -> Result<UnsignedEvent, TypesError> {
        Ok(UnsignedEvent::new(
            kind::METADATA,
            serde_json::to_string(profile)?,
        ))
    }

    /// Parameterized-replaceable feed draft, one live version per guid.
    pub fn feed(guid: &str, title: &str, feed_xml: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent::new(kind::APP_DATA, feed_xml)
            .tag(Tag::new(["d", format!("{FEED_PREFIX}{guid}").as_str()]))
            .tag(Tag::new(["title", title]))
            .tag(Tag::new(["client", "tunecast"]))
    }

    /// Filter for all feed drafts of `author`.
    ///
    /// Kind 30078 is shared with other applications; pair with
    /// [`EventBuilder::is_feed`].
    pub fn feed_filter(author: PublicKey) -> Filter {
        Filter::new().author(author).kind(kind::APP_DATA)
    }

    /// Filter for one feed by guid.
    pub fn feed_by_guid(author: PublicKey, guid: &str) -> Filter {
        Self::feed_filter(author).identifier(format!("{FEED_PREFIX}{guid}"))
    }

    /// True if `event` is a feed draft.
    pub fn is_feed(event: &Event) -> bool {
        event.kind() == kind::APP_DATA
            && event
                .identifier()
                .is_some_and(|d| d.starts_with(FEED_PREFIX))
    }

    /// Feed guid of a feed draft.
    pub fn feed_guid(event: &Event) -> Option<&str> {
        event.identifier()?.strip_prefix(FEED_PREFIX)
    }

    /// NIP-94 file metadata draft.
    pub fn file_metadata(meta: &FileMetadata) -> UnsignedEvent {
        let mut draft = UnsignedEvent::new(
            kind::FILE_METADATA,
            meta.alt.clone().unwrap_or_default(),
        )
        .tag(Tag::new(["url", meta.url.as_str()]))
        .tag(Tag::new(["m", meta.mime.as_str()]))
        .tag(Tag::new(["x", meta.sha256.as_str()]));
        if let Some(size) = meta.size {
            draft = draft.tag(Tag::new(["size".to_string(), size.to_string()]));
        }
        if let Some(alt) = &meta.alt {
            draft = draft.tag(Tag::new(["alt", alt.as_str()]));
        }
        if let Some(dim) = &meta.dim {
            draft = draft.tag(Tag::new(["dim", dim.as_str()]));
        }
        draft
    }

    /// NIP-09 deletion draft for events (`e`) and coordinates (`a`).
    pub fn deletion<I, C>(event_ids: I, coordinates: C, reason: Option<&str>) -> UnsignedEvent
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut draft = UnsignedEvent::new(kind::DELETION, reason.unwrap_or_default());
        for id in event_ids {
            draft = draft.tag(Tag::new(["e", id.as_ref()]));
        }
        for coordinate in coordinates {
            draft = draft.tag(Tag::new(["a", coordinate.as_ref()]));
            if let Some(k) = coordinate.as_ref().split(':').next() {
                let k_tag = Tag::new(["k", k]);
                if !draft.tags.contains(&k_tag) {
                    draft = draft.tag(k_tag);
                }
            }
        }
        draft
    }

    /// Plain text note.
    pub fn text_note(content: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent::new(kind::TEXT_NOTE, content)
    }

    /// Arbitrary draft.
    pub fn custom(kind: u32, content: impl Into<String>, tags: Vec<Tag>) -> UnsignedEvent {
        let mut draft = UnsignedEvent::new(kind, content);
        draft.tags = tags;
        draft
    }

    /// NIP-46 envelope: encrypted payload addressed to `recipient`.
    pub fn nostr_connect(recipient: &PublicKey, encrypted: impl Into<String>) -> UnsignedEvent {
        UnsignedEvent::new(kind::NOSTR_CONNECT, encrypted)
            .tag(Tag::new(["p".to_string(), recipient.to_hex()]))
    }

    /// Filter for NIP-46 envelopes addressed to `recipient`.
    pub fn nostr_connect_filter(recipient: &PublicKey, since: u64) -> Filter {
        Filter::new()
            .kind(kind::NOSTR_CONNECT)
            .pubkey_ref(recipient)
            .since(since)
    }
}
