//! Merging query results from many relays.
//!
//! Two layers:
//! - [`merge_events`]: id-level dedup. Ids are content hashes, so two copies
//!   with the same id are the same event.
//! - [`latest_by_identity`]: for replaceable kinds, keep only the newest
//!   version per (pubkey, kind, d-tag). Callers opt in to this.

use relay_types::{Event, PublicKey};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Application-level identity of a replaceable event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplaceableKey {
    /// Author.
    pub pubkey: PublicKey,
    /// Kind.
    pub kind: u32,
    /// `d` tag (empty for plain replaceable kinds).
    pub identifier: String,
}

impl ReplaceableKey {
    /// Identity of `event`, or `None` for regular kinds.
    pub fn of(event: &Event) -> Option<Self> {
        let identifier = if event.is_parameterized_replaceable() {
            event.identifier().unwrap_or_default().to_string()
        } else if event.is_replaceable() {
            String::new()
        } else {
            return None;
        };
        Some(Self {
            pubkey: *event.pubkey(),
            kind: event.kind(),
            identifier,
        })
    }
}

/// Newest first; ties broken by id so the order is deterministic.
pub fn newest_first(a: &Event, b: &Event) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| a.id().cmp(b.id()))
}

/// Union of per-relay batches, deduplicated by id (first copy wins), sorted
/// newest first.
pub fn merge_events<I>(batches: I) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<Event>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for batch in batches {
        for event in batch {
            if seen.insert(event.id().to_string()) {
                merged.push(event);
            }
        }
    }
    merged.sort_by(newest_first);
    merged
}

/// Keep the newest event per replaceable identity.
///
/// On equal `created_at` the lowest id wins. Regular events pass through.
/// The result is sorted newest first.
pub fn latest_by_identity(events: Vec<Event>) -> Vec<Event> {
    let mut latest: HashMap<ReplaceableKey, Event> = HashMap::new();
    let mut out = Vec::new();
    for event in events {
        match ReplaceableKey::of(&event) {
            Some(key) => {
                let replace = latest
                    .get(&key)
                    .map_or(true, |current| newest_first(&event, current) == Ordering::Less);
                if replace {
                    latest.insert(key, event);
                }
            }
            None => out.push(event),
        }
    }
    out.extend(latest.into_values());
    out.sort_by(newest_first);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::{Keys, Tag, UnsignedEvent};

    fn feed(keys: &Keys, d: &str, at: u64) -> Event {
        keys.sign(
            UnsignedEvent::new(30078, format!("v{at}"))
                .created_at(at)
                .tag(Tag::new(["d", d])),
        )
        .unwrap()
    }

    fn note(keys: &Keys, at: u64) -> Event {
        keys.sign(UnsignedEvent::new(1, "n").created_at(at)).unwrap()
    }

    #[test]
    fn identical_events_from_two_relays_merge_to_one() {
        let keys = Keys::generate();
        let ev = note(&keys, 10);
        let merged = merge_events(vec![vec![ev.clone()], vec![ev.clone()]]);
        assert_eq!(merged, vec![ev]);
    }

    #[test]
    fn merge_orders_newest_first() {
        let keys = Keys::generate();
        let a = note(&keys, 10);
        let b = note(&keys, 30);
        let c = note(&keys, 20);
        let merged = merge_events(vec![vec![a.clone(), b.clone()], vec![c.clone(), a.clone()]]);
        let times: Vec<u64> = merged.iter().map(Event::created_at).collect();
        assert_eq!(times, vec![30, 20, 10]);
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(merge_events(Vec::<Vec<Event>>::new()).is_empty());
        assert!(merge_events(vec![vec![], vec![]]).is_empty());
    }

    #[test]
    fn latest_keeps_newest_per_identity() {
        let keys = Keys::generate();
        let old = feed(&keys, "podcast:feed:a", 10);
        let new = feed(&keys, "podcast:feed:a", 20);
        let other = feed(&keys, "podcast:feed:b", 5);
        let result = latest_by_identity(vec![old, new.clone(), other.clone()]);
        assert_eq!(result, vec![new, other]);
    }

    #[test]
    fn latest_separates_authors() {
        let a = Keys::generate();
        let b = Keys::generate();
        let result = latest_by_identity(vec![
            feed(&a, "podcast:feed:x", 10),
            feed(&b, "podcast:feed:x", 5),
        ]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn latest_passes_regular_events_through() {
        let keys = Keys::generate();
        let notes = vec![note(&keys, 1), note(&keys, 2)];
        assert_eq!(latest_by_identity(notes).len(), 2);
    }

    #[test]
    fn latest_profile_is_replaceable_without_d_tag() {
        let keys = Keys::generate();
        let p1 = keys
            .sign(UnsignedEvent::new(0, r#"{"name":"a"}"#).created_at(1))
            .unwrap();
        let p2 = keys
            .sign(UnsignedEvent::new(0, r#"{"name":"b"}"#).created_at(2))
            .unwrap();
        assert_eq!(latest_by_identity(vec![p2.clone(), p1]), vec![p2]);
    }

    #[test]
    fn latest_tie_breaks_on_lowest_id() {
        let keys = Keys::generate();
        let x = keys
            .sign(
                UnsignedEvent::new(30078, "x")
                    .created_at(7)
                    .tag(Tag::new(["d", "k"])),
            )
            .unwrap();
        let y = keys
            .sign(
                UnsignedEvent::new(30078, "y")
                    .created_at(7)
                    .tag(Tag::new(["d", "k"])),
            )
            .unwrap();
        let expected = if x.id() < y.id() { x.clone() } else { y.clone() };
        assert_eq!(latest_by_identity(vec![x.clone(), y.clone()]), vec![expected.clone()]);
        assert_eq!(latest_by_identity(vec![y, x]), vec![expected]);
    }

    #[test]
    fn replaceable_key_for_regular_kind_is_none() {
        let keys = Keys::generate();
        assert!(ReplaceableKey::of(&note(&keys, 1)).is_none());
        let key = ReplaceableKey::of(&feed(&keys, "d1", 1)).unwrap();
        assert_eq!(key.identifier, "d1");
        assert_eq!(key.kind, 30078);
    }
}
