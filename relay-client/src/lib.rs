//! # relay-client
//!
//! Multi-relay Nostr publish/query engine with pluggable signing.
//!
//! This is the library applications use to put signed events on relays and
//! read them back.
//!
//! ## Features
//!
//! - **Fan-out publish**: every relay in parallel, per-relay results, no
//!   short-circuiting on the first failure
//! - **Merged queries**: per-relay subscriptions, EOSE or timeout, results
//!   deduplicated by id and ordered newest first
//! - **Pluggable signers**: a local key holder or a NIP-46 remote signer
//!   behind one [`SignerPort`] trait
//! - **Sessions**: one active signer at a time, persisted for silent
//!   reconnect, cleared on any mismatch
//! - **Transport Abstraction**: WebSocket for real relays, mock for tests
//!
//! ## Example
//!
//! ```ignore
//! use relay_client::{ClientConfig, FileSessionStore, RelayClient, SessionManager, WsConnector};
//!
//! let config = ClientConfig::load(&data_dir.join("config.toml"))?;
//! let client = RelayClient::from_config(&config);
//! let sessions = SessionManager::new(
//!     FileSessionStore::new(&data_dir),
//!     Arc::new(WsConnector),
//!     config.remote_options(),
//! );
//!
//! sessions.login_with_bunker("bunker://...").await?;
//! let event = sessions.sign_event(EventBuilder::text_note("hello")).await?;
//! let outcome = client.publish(&event).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast;
pub mod client;
pub mod collect;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod retry;
pub mod session;
pub mod signer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{Broadcaster, PublishOutcome, PublishStatus, RelayResult, DEFAULT_ACK_TIMEOUT};
pub use client::RelayClient;
pub use collect::{CollectReport, Collector, DEFAULT_COLLECT_TIMEOUT};
pub use config::{ClientConfig, ConfigError, RemoteConfig, RetryConfig};
pub use connection::{ConnectOptions, Connection, DEFAULT_CONNECT_TIMEOUT};
pub use crypto::{ConversationKey, CryptoError};
pub use error::{RelayError, SignerError};
pub use session::{
    FileSessionStore, MemorySessionStore, PersistedSession, SessionError, SessionManager,
    SessionStore, SignerMethod,
};
pub use signer::{
    AuthHandler, CancelHandle, KeyHolder, LocalSigner, RemoteOptions, RemoteSignerClient,
    SignerPort,
};
pub use transport::{Connector, MockConnector, MockTransport, Transport, TransportError, WsConnector};
