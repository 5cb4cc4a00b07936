//! Querying many relays and merging what they return.
//!
//! Each relay gets its own connection and a fresh subscription id. Events
//! are gathered until the relay signals EOSE, closes the subscription, drops
//! the socket, or the collect timeout runs out. Whatever arrived by then is
//! kept.

use futures_util::future::join_all;
use relay_core::merge_events;
use relay_types::{ClientMessage, Event, Filter, RelayMessage, SubscriptionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::connection::{ConnectOptions, Connection};
use crate::transport::{Connector, Transport};

/// Default bound on gathering events from one relay.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Diagnostics for one relay's part in a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    /// Relay URL.
    pub url: String,
    /// Events kept from this relay, before cross-relay dedup.
    pub events: usize,
    /// The relay sent EOSE.
    pub completed: bool,
    /// Why collection stopped early, if it did.
    pub error: Option<String>,
}

/// Gathers events matching a filter from relays.
#[derive(Debug)]
pub struct Collector<C: Connector> {
    connector: Arc<C>,
    connect: ConnectOptions,
    collect_timeout: Duration,
    verify_events: bool,
}

impl<C: Connector> Clone for Collector<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            connect: self.connect,
            collect_timeout: self.collect_timeout,
            verify_events: self.verify_events,
        }
    }
}

impl<C: Connector> Collector<C> {
    /// Create a collector.
    ///
    /// With `verify_events` set, events whose id or signature does not
    /// check out are dropped.
    pub fn new(
        connector: Arc<C>,
        connect: ConnectOptions,
        collect_timeout: Duration,
        verify_events: bool,
    ) -> Self {
        Self {
            connector,
            connect,
            collect_timeout,
            verify_events,
        }
    }

    /// Merged, deduplicated events from every relay, newest first.
    pub async fn query(&self, filter: &Filter, relays: &[String]) -> Vec<Event> {
        self.query_detailed(filter, relays).await.0
    }

    /// [`query`](Self::query) with explicit timeouts.
    pub async fn query_with(
        &self,
        filter: &Filter,
        relays: &[String],
        connect_timeout: Duration,
        collect_timeout: Duration,
    ) -> Vec<Event> {
        let connect = ConnectOptions {
            connect_timeout,
            ..self.connect
        };
        self.run(filter, relays, &connect, collect_timeout).await.0
    }

    /// Merged events plus one report per relay, in relay order.
    pub async fn query_detailed(
        &self,
        filter: &Filter,
        relays: &[String],
    ) -> (Vec<Event>, Vec<CollectReport>) {
        self.run(filter, relays, &self.connect, self.collect_timeout)
            .await
    }

    async fn run(
        &self,
        filter: &Filter,
        relays: &[String],
        connect: &ConnectOptions,
        collect_timeout: Duration,
    ) -> (Vec<Event>, Vec<CollectReport>) {
        let per_relay = join_all(
            relays
                .iter()
                .map(|url| self.collect_one(filter, url, connect, collect_timeout)),
        )
        .await;

        let mut batches = Vec::with_capacity(per_relay.len());
        let mut reports = Vec::with_capacity(per_relay.len());
        for (events, report) in per_relay {
            batches.push(events);
            reports.push(report);
        }
        let merged = merge_events(batches);
        tracing::debug!(
            "Query over {} relay(s) returned {} event(s)",
            relays.len(),
            merged.len()
        );
        (merged, reports)
    }

    async fn collect_one(
        &self,
        filter: &Filter,
        url: &str,
        connect: &ConnectOptions,
        collect_timeout: Duration,
    ) -> (Vec<Event>, CollectReport) {
        let mut report = CollectReport {
            url: url.to_string(),
            events: 0,
            completed: false,
            error: None,
        };

        let conn = match Connection::open(self.connector.as_ref(), url, connect).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Query on {} failed: {}", url, e);
                report.error = Some(e.to_string());
                return (Vec::new(), report);
            }
        };

        let sub_id = SubscriptionId::generate();
        let req = ClientMessage::Req {
            sub_id: sub_id.clone(),
            filters: vec![filter.clone()],
        };
        let mut events = Vec::new();

        match conn.send(&req).await {
            Ok(()) => {
                self.gather(&conn, filter, &sub_id, collect_timeout, &mut events, &mut report)
                    .await;
                if conn.transport().is_connected() {
                    if let Err(e) = conn.send(&ClientMessage::Close(sub_id)).await {
                        tracing::debug!("CLOSE to {} failed: {}", url, e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("REQ to {} failed: {}", url, e);
                report.error = Some(e.to_string());
            }
        }

        conn.close().await;
        report.events = events.len();
        (events, report)
    }

    async fn gather(
        &self,
        conn: &Connection<C::Transport>,
        filter: &Filter,
        sub_id: &SubscriptionId,
        collect_timeout: Duration,
        events: &mut Vec<Event>,
        report: &mut CollectReport,
    ) {
        let url = conn.url();
        let deadline = Instant::now() + collect_timeout;
        loop {
            match conn.recv_until(deadline).await {
                Ok(Some(RelayMessage::Event { sub_id: s, event })) if &s == sub_id => {
                    if !filter.matches(&event) {
                        tracing::debug!("{} sent {} outside the filter", url, event.id());
                        continue;
                    }
                    if self.verify_events {
                        if let Err(e) = event.verify() {
                            tracing::warn!("Dropping invalid event from {}: {}", url, e);
                            continue;
                        }
                    }
                    events.push(*event);
                }
                Ok(Some(RelayMessage::Eose(s))) if &s == sub_id => {
                    report.completed = true;
                    return;
                }
                Ok(Some(RelayMessage::Closed { sub_id: s, message })) if &s == sub_id => {
                    tracing::warn!("{} closed subscription: {}", url, message);
                    report.error = Some(format!("subscription closed: {message}"));
                    return;
                }
                Ok(Some(_)) => {
                    tracing::debug!("Skipping uncorrelated message from {}", url);
                }
                Ok(None) => {
                    tracing::debug!("{} gave no EOSE within {:?}", url, collect_timeout);
                    report.error = Some(format!("timed out after {:?}", collect_timeout));
                    return;
                }
                Err(e) => {
                    tracing::debug!("{} dropped the subscription: {}", url, e);
                    report.error = Some(e.to_string());
                    return;
                }
            }
        }
    }
}
