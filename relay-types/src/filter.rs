//! Subscription filters (NIP-01).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Event, PublicKey};

/// A NIP-01 filter object.
///
/// All present fields must match for an event to pass; within a field any
/// listed value matches. Tag filters are stored under their wire key
/// (`"#d"`, `"#p"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Author public keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<PublicKey>>,
    /// Event kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    /// Lower bound on `created_at` (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    /// Upper bound on `created_at` (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    /// Maximum number of stored events a relay should return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Single-letter tag filters keyed by `#<letter>`.
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    /// An empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one event id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.get_or_insert_with(Vec::new).push(id.into());
        self
    }

    /// Restrict to one author.
    pub fn author(mut self, author: PublicKey) -> Self {
        self.authors.get_or_insert_with(Vec::new).push(author);
        self
    }

    /// Restrict to one kind.
    pub fn kind(mut self, kind: u32) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Only events at or after `since`.
    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    /// Only events at or before `until`.
    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    /// Cap the number of stored events.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Require a tag `letter` whose first value is `value`.
    pub fn tag(mut self, letter: char, value: impl Into<String>) -> Self {
        self.tags
            .entry(format!("#{letter}"))
            .or_default()
            .push(value.into());
        self
    }

    /// Shorthand for `tag('p', ..)`.
    pub fn pubkey_ref(self, pubkey: &PublicKey) -> Self {
        self.tag('p', pubkey.to_hex())
    }

    /// Shorthand for `tag('d', ..)`.
    pub fn identifier(self, d: impl Into<String>) -> Self {
        self.tag('d', d)
    }

    /// NIP-01 matching.
    ///
    /// `limit` only applies to stored-event replay and is ignored here.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == event.id()) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(event.pubkey()) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at() < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at() > until {
                return false;
            }
        }
        for (key, values) in &self.tags {
            let Some(name) = key.strip_prefix('#') else {
                continue;
            };
            let hit = event.tags().iter().any(|t| {
                t.name() == Some(name) && t.value().is_some_and(|v| values.iter().any(|x| x == v))
            });
            if !hit {
                return false;
            }
        }
        true
    }
}
