//! RelayClient - the main interface for publishing and querying.
//!
//! [`RelayClient`] bundles a [`Broadcaster`] and a [`Collector`] over one
//! configured relay set. It never holds sockets between calls.
//!
//! ```text
//! Application → RelayClient → Broadcaster / Collector → Connection → Transport
//!                                   ↓
//!                  relay-core (merge policy, draft builders)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use relay_client::{ClientConfig, LocalSigner, RelayClient};
//!
//! let client = RelayClient::from_config(&ClientConfig::default());
//! let signer = LocalSigner::new(Arc::new(Keys::generate()));
//! let (event, outcome) = client
//!     .sign_and_publish(&signer, EventBuilder::text_note("hello"))
//!     .await?;
//! let feeds = client.query_latest(&EventBuilder::feed_filter(*event.pubkey())).await;
//! ```

use relay_core::{latest_by_identity, EventBuilder, Profile};
use relay_types::{Event, Filter, PublicKey, UnsignedEvent};
use std::sync::Arc;

use crate::broadcast::{Broadcaster, PublishOutcome};
use crate::collect::{CollectReport, Collector};
use crate::config::ClientConfig;
use crate::error::SignerError;
use crate::signer::SignerPort;
use crate::transport::{Connector, WsConnector};

/// Publishes to and queries a fixed set of relays.
#[derive(Debug)]
pub struct RelayClient<C: Connector> {
    relays: Vec<String>,
    broadcaster: Broadcaster<C>,
    collector: Collector<C>,
}

impl<C: Connector> Clone for RelayClient<C> {
    fn clone(&self) -> Self {
        Self {
            relays: self.relays.clone(),
            broadcaster: self.broadcaster.clone(),
            collector: self.collector.clone(),
        }
    }
}

impl RelayClient<WsConnector> {
    /// WebSocket client for the configured relays.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(Arc::new(WsConnector), config)
    }
}

impl<C: Connector> RelayClient<C> {
    /// Client over `connector` with timeouts and relays from `config`.
    pub fn new(connector: Arc<C>, config: &ClientConfig) -> Self {
        let connect = config.connect_options();
        Self {
            relays: config.relays.clone(),
            broadcaster: Broadcaster::new(Arc::clone(&connector), connect, config.ack_timeout()),
            collector: Collector::new(
                connector,
                connect,
                config.collect_timeout(),
                config.verify_events,
            ),
        }
    }

    /// Configured relays.
    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// Publish to the configured relays.
    pub async fn publish(&self, event: &Event) -> PublishOutcome {
        self.broadcaster.publish(event, &self.relays).await
    }

    /// Publish to `relays` instead of the configured set.
    pub async fn publish_to(&self, event: &Event, relays: &[String]) -> PublishOutcome {
        self.broadcaster.publish(event, relays).await
    }

    /// Sign `draft` with `signer`, then publish it.
    ///
    /// Only signing can fail; relay failures are reported in the outcome.
    pub async fn sign_and_publish(
        &self,
        signer: &dyn SignerPort,
        draft: UnsignedEvent,
    ) -> Result<(Event, PublishOutcome), SignerError> {
        let event = signer.sign_event(draft).await?;
        let outcome = self.publish(&event).await;
        Ok((event, outcome))
    }

    /// Events matching `filter` from the configured relays, newest first.
    pub async fn query(&self, filter: &Filter) -> Vec<Event> {
        self.collector.query(filter, &self.relays).await
    }

    /// Events matching `filter` from `relays`.
    pub async fn query_from(&self, filter: &Filter, relays: &[String]) -> Vec<Event> {
        self.collector.query(filter, relays).await
    }

    /// Like [`query`](Self::query), keeping only the newest version of each
    /// replaceable record.
    pub async fn query_latest(&self, filter: &Filter) -> Vec<Event> {
        latest_by_identity(self.query(filter).await)
    }

    /// Events plus per-relay diagnostics.
    pub async fn query_detailed(&self, filter: &Filter) -> (Vec<Event>, Vec<CollectReport>) {
        self.collector.query_detailed(filter, &self.relays).await
    }

    /// The newest kind-0 profile of `pubkey`, if any relay has one that
    /// parses.
    pub async fn fetch_profile(&self, pubkey: PublicKey) -> Option<Profile> {
        let events = self.query_latest(&EventBuilder::profile_filter(pubkey)).await;
        events.iter().find_map(|event| match Profile::from_event(event) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::debug!("Ignoring unparseable profile {}: {}", event.id(), e);
                None
            }
        })
    }
}
