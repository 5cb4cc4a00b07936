//! Publishing one signed event to many relays.
//!
//! Every relay is tried independently and concurrently. A relay failing is
//! a per-relay result, never an error for the whole call.

use futures_util::future::join_all;
use relay_types::{ClientMessage, Event, RelayMessage};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{ConnectOptions, Connection};
use crate::error::RelayError;
use crate::transport::Connector;

/// Default wait for a relay's `OK`.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// What one relay said about a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResult {
    /// Relay URL.
    pub url: String,
    /// The relay acknowledged the event with `OK true`.
    pub accepted: bool,
    /// The relay's message, or why we never got one.
    pub message: String,
}

/// Overall publish status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Every relay accepted.
    Accepted,
    /// Some relays accepted.
    PartialFailure,
    /// No relay accepted.
    Failed,
}

/// Result of [`Broadcaster::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Number of relays that accepted.
    pub success_count: usize,
    /// One entry per relay, in the order the relays were given.
    pub results: Vec<RelayResult>,
}

impl PublishOutcome {
    fn from_results(results: Vec<RelayResult>) -> Self {
        let success_count = results.iter().filter(|r| r.accepted).count();
        Self {
            success_count,
            results,
        }
    }

    /// Accepted, partial or failed.
    pub fn status(&self) -> PublishStatus {
        if self.success_count == 0 {
            PublishStatus::Failed
        } else if self.success_count == self.results.len() {
            PublishStatus::Accepted
        } else {
            PublishStatus::PartialFailure
        }
    }

    /// At least one relay accepted.
    pub fn is_success(&self) -> bool {
        self.success_count > 0
    }

    /// Relays that did not accept.
    pub fn failures(&self) -> impl Iterator<Item = &RelayResult> {
        self.results.iter().filter(|r| !r.accepted)
    }
}

/// Fans a signed event out to relays.
#[derive(Debug)]
pub struct Broadcaster<C: Connector> {
    connector: Arc<C>,
    connect: ConnectOptions,
    ack_timeout: Duration,
}

impl<C: Connector> Clone for Broadcaster<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            connect: self.connect,
            ack_timeout: self.ack_timeout,
        }
    }
}

impl<C: Connector> Broadcaster<C> {
    /// Create a broadcaster.
    pub fn new(connector: Arc<C>, connect: ConnectOptions, ack_timeout: Duration) -> Self {
        Self {
            connector,
            connect,
            ack_timeout,
        }
    }

    /// Send `event` to every relay and wait for all of them to settle.
    pub async fn publish(&self, event: &Event, relays: &[String]) -> PublishOutcome {
        tracing::debug!("Publishing {} to {} relay(s)", event.id(), relays.len());
        let attempts = relays.iter().map(|url| self.publish_one(event, url));
        let outcome = PublishOutcome::from_results(join_all(attempts).await);

        match outcome.status() {
            PublishStatus::Accepted => {}
            status => tracing::warn!(
                "Publish of {} {:?}: {}/{} relays accepted",
                event.id(),
                status,
                outcome.success_count,
                relays.len()
            ),
        }
        outcome
    }

    async fn publish_one(&self, event: &Event, url: &str) -> RelayResult {
        let (accepted, message) = match self.try_publish(event, url).await {
            Ok((accepted, message)) => {
                if !accepted {
                    tracing::warn!("{} rejected {}: {}", url, event.id(), message);
                }
                (accepted, message)
            }
            Err(e) => {
                tracing::warn!("Publish to {} failed: {}", url, e);
                (false, e.to_string())
            }
        };
        RelayResult {
            url: url.to_string(),
            accepted,
            message,
        }
    }

    async fn try_publish(&self, event: &Event, url: &str) -> Result<(bool, String), RelayError> {
        let conn = Connection::open(self.connector.as_ref(), url, &self.connect).await?;
        let event_id = event.id().to_string();
        let result = conn
            .send_and_await(
                &ClientMessage::Event(event.clone()),
                self.ack_timeout,
                |msg| match msg {
                    RelayMessage::Ok {
                        event_id: acked,
                        accepted,
                        message,
                    } if acked == event_id => Some((accepted, message)),
                    _ => None,
                },
            )
            .await;
        conn.close().await;
        result
    }
}
