//! # relay-types
//!
//! Wire format types for the Tunecast Nostr relay engine.
//!
//! This crate provides the foundational types used across all relay crates:
//! - [`Event`], [`UnsignedEvent`], [`Tag`] - Signed records and drafts
//! - [`Keys`], [`PublicKey`] - Schnorr identities
//! - [`Filter`], [`SubscriptionId`] - Subscription requests
//! - [`ClientMessage`], [`RelayMessage`] - NIP-01 protocol frames
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod filter;
mod ids;
mod keys;
mod messages;

pub use error::TypesError;
pub use event::{unix_now, Event, Tag, UnsignedEvent};
pub use filter::Filter;
pub use ids::{PublicKey, SubscriptionId};
pub use keys::Keys;
pub use messages::{ClientMessage, RelayMessage};
