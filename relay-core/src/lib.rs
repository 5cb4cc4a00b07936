//! # relay-core
//!
//! Pure logic for the Tunecast relay engine (no I/O, instant tests).
//!
//! This crate implements the policies and state machines behind relay
//! publishing, querying and remote signing without any network or disk I/O,
//! enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`RetryPolicy`] says how often and how long to back off; it never sleeps
//! - [`RemoteSignerState`] returns actions; it never sends a request
//! - [`merge_events`] and [`latest_by_identity`] reshape results already fetched
//!
//! The actual I/O (sockets, timers, files) is performed by `relay-client`,
//! which interprets the values produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod merge;
pub mod remote;
pub mod retry;
pub mod rpc;
pub mod uri;

pub use builder::{kind, EventBuilder, FileMetadata, Profile, FEED_PREFIX};
pub use merge::{latest_by_identity, merge_events, newest_first, ReplaceableKey};
pub use remote::{CloseReason, Flow, RemoteAction, RemoteEvent, RemoteSignerState};
pub use retry::RetryPolicy;
pub use rpc::{Method, RemoteRequest, RemoteResponse, ResponseOutcome, RpcError, ACK, AUTH_URL, PONG};
pub use uri::{validate_relay_url, BunkerPointer, ConnectSecret, NostrConnectUri, UriError};
