//! Relay channel to a remote signer.
//!
//! One task per relay keeps a subscription for kind-24133 events addressed
//! to our ephemeral key and forwards them to a single dispatcher. The
//! dispatcher drops duplicates (the same envelope arrives from every relay),
//! decrypts, and routes each response by request id. Responses nobody is
//! waiting for go to the unsolicited queue, which is where a
//! `nostrconnect://` approval shows up. Both the duplicate filter and the
//! queue are bounded, so a chatty signer cannot grow them without limit.

use futures_util::future::join_all;
use relay_core::{EventBuilder, RemoteRequest, RemoteResponse};
use relay_types::{unix_now, ClientMessage, Event, Keys, PublicKey, RelayMessage, SubscriptionId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{ConnectOptions, Connection};
use crate::crypto::{self, ConversationKey};
use crate::error::{RelayError, SignerError};
use crate::transport::{Connector, Transport};

/// Look-back on the subscription, for clocks that run slightly behind.
const SINCE_SLACK_SECS: u64 = 10;

/// How long shutdown waits for relay tasks to close their sockets.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Envelope ids remembered for duplicate suppression.
const SEEN_CAPACITY: usize = 1024;

/// Unread unsolicited responses kept before new ones are dropped.
const UNSOLICITED_CAPACITY: usize = 16;

/// A decrypted response and who sent it.
#[derive(Debug, Clone)]
pub(crate) struct Incoming {
    pub author: PublicKey,
    pub response: RemoteResponse,
}

type Pending = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Incoming>>>>;

enum Outbound {
    Publish(Event),
    Shutdown,
}

/// Responses to one request. Unregisters itself when dropped.
pub(crate) struct PendingReply {
    id: String,
    rx: mpsc::UnboundedReceiver<Incoming>,
    pending: Pending,
}

impl PendingReply {
    /// Next response carrying our request id; `None` once the channel is
    /// gone.
    pub async fn next(&mut self) -> Option<Incoming> {
        self.rx.recv().await
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

/// Subscriptions on the remote signer's relays.
pub(crate) struct RelayChannel {
    client_keys: Keys,
    outbound: Vec<mpsc::UnboundedSender<Outbound>>,
    pending: Pending,
    unsolicited: tokio::sync::Mutex<mpsc::Receiver<Incoming>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RelayChannel {
    /// Connect to `relays` and subscribe for envelopes addressed to
    /// `client_keys`. Succeeds if at least one relay is up.
    pub async fn open<C: Connector>(
        connector: Arc<C>,
        relays: &[String],
        client_keys: Keys,
        connect: &ConnectOptions,
    ) -> Result<Self, RelayError> {
        let opened = join_all(
            relays
                .iter()
                .map(|url| Connection::open(connector.as_ref(), url, connect)),
        )
        .await;

        let filter = EventBuilder::nostr_connect_filter(
            &client_keys.public_key(),
            unix_now().saturating_sub(SINCE_SLACK_SECS),
        );
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut outbound = Vec::new();
        let mut tasks = Vec::new();
        let mut last_error = None;

        for result in opened {
            let conn = match result {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Remote signer relay unavailable: {}", e);
                    last_error = Some(e);
                    continue;
                }
            };
            let sub_id = SubscriptionId::generate();
            let req = ClientMessage::Req {
                sub_id: sub_id.clone(),
                filters: vec![filter.clone()],
            };
            if let Err(e) = conn.send(&req).await {
                tracing::warn!("Subscribing on {} failed: {}", conn.url(), e);
                conn.close().await;
                last_error = Some(e);
                continue;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            tasks.push(tokio::spawn(relay_task(conn, sub_id, rx, event_tx.clone())));
            outbound.push(tx);
        }
        drop(event_tx);

        if outbound.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| RelayError::Protocol("no relays to reach the remote signer".into())));
        }
        tracing::debug!(
            "Remote signer channel up on {}/{} relay(s)",
            outbound.len(),
            relays.len()
        );

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (unsolicited_tx, unsolicited_rx) = mpsc::channel(UNSOLICITED_CAPACITY);
        tasks.push(tokio::spawn(dispatch(
            event_rx,
            client_keys.clone(),
            Arc::clone(&pending),
            unsolicited_tx,
        )));

        Ok(Self {
            client_keys,
            outbound,
            pending,
            unsolicited: tokio::sync::Mutex::new(unsolicited_rx),
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    /// Our ephemeral keys.
    pub fn client_keys(&self) -> &Keys {
        &self.client_keys
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Encrypt `request` to `recipient` and publish it on every relay.
    ///
    /// The reply slot is registered before anything is sent.
    pub fn send_request(
        &self,
        recipient: &PublicKey,
        request: &RemoteRequest,
    ) -> Result<PendingReply, SignerError> {
        if self.is_closed() {
            return Err(SignerError::Unavailable);
        }
        let key = ConversationKey::derive(&self.client_keys.secret_key(), recipient)?;
        let content = crypto::encrypt(&key, &request.to_json()?)?;
        let envelope = self
            .client_keys
            .sign(EventBuilder::nostr_connect(recipient, content))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.pending
            .lock()
            .map_err(|_| SignerError::Protocol("pending request table poisoned".into()))?
            .insert(request.id.clone(), tx);
        let reply = PendingReply {
            id: request.id.clone(),
            rx,
            pending: Arc::clone(&self.pending),
        };

        let delivered = self
            .outbound
            .iter()
            .filter(|relay| relay.send(Outbound::Publish(envelope.clone())).is_ok())
            .count();
        if delivered == 0 {
            return Err(SignerError::Relay(RelayError::Protocol(
                "every relay to the remote signer is gone".into(),
            )));
        }
        tracing::debug!(
            "Sent {} request {} via {} relay(s)",
            request.method.as_str(),
            request.id,
            delivered
        );
        Ok(reply)
    }

    /// Next response no request was waiting for.
    pub async fn next_unsolicited(&self) -> Option<Incoming> {
        self.unsolicited.lock().await.recv().await
    }

    /// Close subscriptions and sockets, and fail every pending request.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for relay in &self.outbound {
            let _ = relay.send(Outbound::Shutdown);
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                abort.abort();
            }
        }
        tracing::debug!("Remote signer channel closed");
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

async fn relay_task<T: Transport>(
    conn: Connection<T>,
    sub_id: SubscriptionId,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<Event>,
) {
    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Publish(event)) => {
                    if let Err(e) = conn.send(&ClientMessage::Event(event)).await {
                        tracing::warn!("Sending to remote signer via {} failed: {}", conn.url(), e);
                    }
                }
                Some(Outbound::Shutdown) | None => break,
            },
            message = conn.recv() => match message {
                Ok(RelayMessage::Event { sub_id: s, event }) if s == sub_id => {
                    if events.send(*event).is_err() {
                        break;
                    }
                }
                Ok(RelayMessage::Ok { accepted: false, message, .. }) => {
                    tracing::warn!("{} refused a remote signer envelope: {}", conn.url(), message);
                }
                Ok(RelayMessage::Closed { sub_id: s, message }) if s == sub_id => {
                    tracing::warn!("{} closed the remote signer subscription: {}", conn.url(), message);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Remote signer relay {} dropped: {}", conn.url(), e);
                    break;
                }
            },
        }
    }

    if conn.transport().is_connected() {
        let _ = conn.send(&ClientMessage::Close(sub_id)).await;
    }
    conn.close().await;
}

/// Most recent envelope ids, oldest evicted first.
struct SeenIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenIds {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`. Returns false if it is already remembered.
    fn insert(&mut self, id: String) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

async fn dispatch(
    mut events: mpsc::UnboundedReceiver<Event>,
    client_keys: Keys,
    pending: Pending,
    unsolicited: mpsc::Sender<Incoming>,
) {
    let mut seen = SeenIds::with_capacity(SEEN_CAPACITY);
    while let Some(event) = events.recv().await {
        if !seen.insert(event.id().to_string()) {
            continue;
        }
        let response = match open_envelope(&client_keys, &event) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Ignoring envelope {} from {}: {}", event.id(), event.pubkey(), e);
                continue;
            }
        };
        let incoming = Incoming {
            author: *event.pubkey(),
            response,
        };
        let waiter = pending
            .lock()
            .ok()
            .and_then(|p| p.get(&incoming.response.id).cloned());
        match waiter {
            Some(tx) => {
                let _ = tx.send(incoming);
            }
            None => {
                if let Err(mpsc::error::TrySendError::Full(dropped)) = unsolicited.try_send(incoming) {
                    tracing::debug!(
                        "Dropping unsolicited response {} from {}: queue full",
                        dropped.response.id,
                        dropped.author
                    );
                }
            }
        }
    }
}

fn open_envelope(client_keys: &Keys, event: &Event) -> Result<RemoteResponse, SignerError> {
    event.verify()?;
    let key = ConversationKey::derive(&client_keys.secret_key(), event.pubkey())?;
    let json = crypto::decrypt(&key, event.content())?;
    Ok(RemoteResponse::from_json(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deliver, FakeBunker};
    use crate::transport::{MockConnector, MockTransport};
    use relay_core::{RetryPolicy, ACK};

    fn quick() -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(100),
            retry: RetryPolicy::no_retry(),
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn request_is_routed_back_by_id() {
        let bunker = FakeBunker::new();
        let connector = MockConnector::new();
        connector.register("wss://bunker.one", bunker.relay());
        let channel = RelayChannel::open(
            Arc::new(connector),
            &urls(&["wss://bunker.one"]),
            Keys::generate(),
            &quick(),
        )
        .await
        .unwrap();

        let request = RemoteRequest::ping();
        let mut reply = channel
            .send_request(&bunker.signer_pubkey(), &request)
            .unwrap();
        let incoming = tokio::time::timeout(Duration::from_secs(1), reply.next())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(incoming.author, bunker.signer_pubkey());
        assert_eq!(incoming.response.id, request.id);
        assert_eq!(incoming.response.result.as_deref(), Some("pong"));
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_envelopes_from_two_relays_arrive_once() {
        let bunker = FakeBunker::new();
        let connector = MockConnector::new();
        let a = connector.register("wss://a.example", bunker.relay());
        let b = connector.register("wss://b.example", MockTransport::silent());
        let keys = Keys::generate();
        let channel = RelayChannel::open(
            Arc::new(connector),
            &urls(&["wss://a.example", "wss://b.example"]),
            keys.clone(),
            &quick(),
        )
        .await
        .unwrap();

        // The same approval envelope, delivered by both relays.
        let envelope = bunker.envelope(&keys.public_key(), &RemoteResponse::ok("r1", "s3cret"));
        a.queue_response(deliver(&a, &envelope));
        b.queue_response(deliver(&b, &envelope));

        let first = tokio::time::timeout(Duration::from_secs(1), channel.next_unsolicited())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.response.result.as_deref(), Some("s3cret"));

        let second =
            tokio::time::timeout(Duration::from_millis(50), channel.next_unsolicited()).await;
        assert!(second.is_err(), "duplicate envelope was delivered twice");
        channel.shutdown().await;
    }

    #[test]
    fn seen_ids_forget_oldest_past_capacity() {
        let mut seen = SeenIds::with_capacity(2);
        assert!(seen.insert("a".into()));
        assert!(seen.insert("b".into()));
        assert!(!seen.insert("a".into()));

        assert!(seen.insert("c".into()));

        assert_eq!(seen.len(), 2);
        assert!(!seen.insert("c".into()));
        assert!(!seen.insert("b".into()));
        // Evicted, so it counts as new again
        assert!(seen.insert("a".into()));
    }

    #[tokio::test]
    async fn unread_unsolicited_responses_are_capped() {
        let bunker = FakeBunker::new();
        let connector = MockConnector::new();
        let relay = connector.register("wss://bunker.one", bunker.relay());
        let keys = Keys::generate();
        let channel = RelayChannel::open(
            Arc::new(connector),
            &urls(&["wss://bunker.one"]),
            keys.clone(),
            &quick(),
        )
        .await
        .unwrap();

        for i in 0..UNSOLICITED_CAPACITY + 4 {
            let response = RemoteResponse::ok(format!("r{i}"), ACK);
            let envelope = bunker.envelope(&keys.public_key(), &response);
            relay.queue_response(deliver(&relay, &envelope));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut received = Vec::new();
        while let Ok(Some(incoming)) =
            tokio::time::timeout(Duration::from_millis(50), channel.next_unsolicited()).await
        {
            received.push(incoming.response.id);
        }

        assert_eq!(received.len(), UNSOLICITED_CAPACITY);
        assert_eq!(received[0], "r0");
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn undecryptable_envelopes_are_ignored() {
        let bunker = FakeBunker::new();
        let connector = MockConnector::new();
        let relay = connector.register("wss://bunker.one", bunker.relay());
        let channel = RelayChannel::open(
            Arc::new(connector),
            &urls(&["wss://bunker.one"]),
            Keys::generate(),
            &quick(),
        )
        .await
        .unwrap();

        // Encrypted for someone else's key, so we cannot open it.
        let stranger = Keys::generate();
        let envelope = bunker.envelope(&stranger.public_key(), &RemoteResponse::ok("r1", ACK));
        relay.queue_response(deliver(&relay, &envelope));

        let got = tokio::time::timeout(Duration::from_millis(50), channel.next_unsolicited()).await;
        assert!(got.is_err());
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn open_fails_when_no_relay_is_reachable() {
        let result = RelayChannel::open(
            Arc::new(MockConnector::new()),
            &urls(&["wss://down.example"]),
            Keys::generate(),
            &quick(),
        )
        .await;
        assert!(matches!(result, Err(RelayError::Connect { .. })));
    }

    #[tokio::test]
    async fn shutdown_closes_sockets_and_refuses_requests() {
        let bunker = FakeBunker::new();
        let connector = MockConnector::new();
        let relay = connector.register("wss://bunker.one", bunker.relay());
        let channel = RelayChannel::open(
            Arc::new(connector),
            &urls(&["wss://bunker.one"]),
            Keys::generate(),
            &quick(),
        )
        .await
        .unwrap();

        bunker.go_silent();
        let mut waiting = channel
            .send_request(&bunker.signer_pubkey(), &RemoteRequest::ping())
            .unwrap();
        channel.shutdown().await;

        assert!(!relay.is_connected());
        assert!(waiting.next().await.is_none());
        assert!(matches!(
            channel.send_request(&bunker.signer_pubkey(), &RemoteRequest::ping()),
            Err(SignerError::Unavailable)
        ));
        let sent = relay.sent_messages();
        assert!(sent.last().unwrap().starts_with("[\"CLOSE\""));
    }

    #[tokio::test]
    async fn subscription_targets_our_key() {
        let bunker = FakeBunker::new();
        let connector = MockConnector::new();
        let relay = connector.register("wss://bunker.one", bunker.relay());
        let keys = Keys::generate();
        let channel = RelayChannel::open(
            Arc::new(connector),
            &urls(&["wss://bunker.one"]),
            keys.clone(),
            &quick(),
        )
        .await
        .unwrap();

        let ClientMessage::Req { filters, .. } =
            ClientMessage::parse(&relay.sent_messages()[0]).unwrap()
        else {
            panic!("expected REQ");
        };
        assert_eq!(filters[0].kinds, Some(vec![24133]));
        assert_eq!(
            filters[0].tags.get("#p"),
            Some(&vec![keys.public_key().to_hex()])
        );
        channel.shutdown().await;
    }
}
