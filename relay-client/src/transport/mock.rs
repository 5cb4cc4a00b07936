//! Mock transport for testing.
//!
//! Allows queueing responses and capturing sent frames for verification.
//! A [`Responder`] turns the mock into a scripted relay: every sent frame is
//! handed to it and whatever it returns is queued for `recv()`.

use super::{Connector, Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Scripted relay behaviour: sent frame in, frames to deliver out.
pub type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Mock transport for testing.
///
/// Clones share state, so a test can keep a handle while the code under test
/// owns another.
#[derive(Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    wake: Arc<Notify>,
}

#[derive(Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    connect_count: usize,
    sent_messages: Vec<String>,
    receive_queue: VecDeque<String>,
    fail_next_connect: Option<String>,
    fail_every_connect: Option<String>,
    stall_connect: bool,
    hold_open: bool,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
    responder: Option<Responder>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay that answers every sent frame through `responder` and keeps
    /// the socket open while idle.
    pub fn scripted<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        let transport = Self::new();
        transport.set_responder(responder);
        transport.hold_open();
        transport
    }

    /// A relay that accepts the connection and then never says anything.
    pub fn silent() -> Self {
        let transport = Self::new();
        transport.hold_open();
        transport
    }

    /// A relay that refuses every connection attempt.
    pub fn unreachable(reason: &str) -> Self {
        let transport = Self::new();
        transport.fail_every_connect(reason);
        transport
    }

    /// Queue a frame to be returned by the next `recv()` call.
    pub fn queue_response(&self, frame: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.receive_queue.push_back(frame.into());
        drop(inner);
        self.wake.notify_one();
    }

    /// Answer sent frames with `responder`.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.responder = Some(Arc::new(responder));
    }

    /// Make `recv()` wait for new frames instead of reporting a closed
    /// connection when the queue is empty.
    pub fn hold_open(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.hold_open = true;
    }

    /// Get all frames that were sent.
    pub fn sent_messages(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the last frame that was sent.
    pub fn last_sent(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.connected_address.clone()
    }

    /// Number of connect() calls seen, failed ones included.
    pub fn connect_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_count
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause every connect() to fail with the given error.
    pub fn fail_every_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_every_connect = Some(error.to_string());
    }

    /// Cause connect() to hang forever.
    pub fn stall_connect(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stall_connect = true;
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_recv = Some(error.to_string());
    }

    /// Clear all state (frames, queue, connection, script).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
        drop(inner);
        self.wake.notify_one();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            wake: Arc::clone(&self.wake),
        }
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MockTransport")
            .field("connected", &inner.connected)
            .field("connected_address", &inner.connected_address)
            .field("sent", &inner.sent_messages.len())
            .field("queued", &inner.receive_queue.len())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let stall = {
            let mut inner = self.inner.lock().unwrap();
            inner.connect_count += 1;

            // Check for forced failure
            if let Some(error) = inner.fail_next_connect.take() {
                return Err(TransportError::ConnectionFailed(error));
            }
            if let Some(error) = &inner.fail_every_connect {
                return Err(TransportError::ConnectionFailed(error.clone()));
            }
            inner.stall_connect
        };

        if stall {
            std::future::pending::<()>().await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let responder = {
            let mut inner = self.inner.lock().unwrap();

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            inner.sent_messages.push(text.to_string());
            inner.responder.clone()
        };

        if let Some(responder) = responder {
            let replies = responder(text);
            if !replies.is_empty() {
                let mut inner = self.inner.lock().unwrap();
                inner.receive_queue.extend(replies);
                drop(inner);
                self.wake.notify_one();
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();

                if !inner.connected {
                    return Err(TransportError::NotConnected);
                }

                // Check for forced failure
                if let Some(error) = inner.fail_next_recv.take() {
                    return Err(TransportError::ReceiveFailed(error));
                }

                if let Some(frame) = inner.receive_queue.pop_front() {
                    return Ok(frame);
                }
                if !inner.hold_open {
                    return Err(TransportError::ConnectionClosed);
                }
            }
            // A notify_one issued before we park leaves a permit behind.
            self.wake.notified().await;
        }
    }

    fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        drop(inner);
        self.wake.notify_one();
        Ok(())
    }
}

/// Hands out registered [`MockTransport`]s by relay URL.
///
/// Unknown URLs get a transport that refuses to connect.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    relays: Arc<Mutex<HashMap<String, MockTransport>>>,
}

impl MockConnector {
    /// Create an empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transport` as the relay at `url`.
    pub fn register(&self, url: impl Into<String>, transport: MockTransport) -> MockTransport {
        let mut relays = self.relays.lock().unwrap();
        relays.insert(url.into(), transport.clone());
        transport
    }

    /// Shared handle to the relay at `url`, if registered.
    pub fn relay(&self, url: &str) -> Option<MockTransport> {
        let relays = self.relays.lock().unwrap();
        relays.get(url).cloned()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn transport_for(&self, url: &str) -> MockTransport {
        self.relay(url)
            .unwrap_or_else(|| MockTransport::unreachable(&format!("no relay at {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect("wss://relay.one").await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(
            transport.connected_address(),
            Some("wss://relay.one".to_string())
        );
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_sends_frames() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();

        transport.send(r#"["CLOSE","a"]"#).await.unwrap();
        transport.send(r#"["CLOSE","b"]"#).await.unwrap();

        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], r#"["CLOSE","a"]"#);
        assert_eq!(sent[1], r#"["CLOSE","b"]"#);
    }

    #[tokio::test]
    async fn mock_transport_receives_queued_frames() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();

        transport.queue_response(r#"["EOSE","a"]"#);
        transport.queue_response(r#"["NOTICE","hi"]"#);

        assert_eq!(transport.recv().await.unwrap(), r#"["EOSE","a"]"#);
        assert_eq!(transport.recv().await.unwrap(), r#"["NOTICE","hi"]"#);
    }

    #[tokio::test]
    async fn mock_transport_recv_empty_returns_closed() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn mock_transport_closes() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    // ===========================================
    // Scripted Relay Tests
    // ===========================================

    #[tokio::test]
    async fn responder_replies_are_delivered() {
        let transport = MockTransport::scripted(|frame| vec![format!("echo:{frame}")]);
        transport.connect("relay").await.unwrap();

        transport.send("ping").await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), "echo:ping");
    }

    #[tokio::test]
    async fn held_open_recv_waits_for_a_frame() {
        let transport = MockTransport::silent();
        transport.connect("relay").await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(30), transport.recv()).await;
        assert!(waiting.is_err());

        let feeder = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            feeder.queue_response("late");
        });
        let frame = tokio::time::timeout(Duration::from_secs(1), transport.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, "late");
    }

    #[tokio::test]
    async fn close_wakes_a_held_open_recv() {
        let transport = MockTransport::silent();
        transport.connect("relay").await.unwrap();

        let closer = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close().await.unwrap();
        });
        let result = tokio::time::timeout(Duration::from_secs(1), transport.recv())
            .await
            .unwrap();
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn stalled_connect_never_completes() {
        let transport = MockTransport::new();
        transport.stall_connect();

        let result = tokio::time::timeout(Duration::from_millis(20), transport.connect("relay")).await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn send_without_connect_fails() {
        let transport = MockTransport::new();

        let result = transport.send("data").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn recv_without_connect_fails() {
        let transport = MockTransport::new();

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn forced_connect_failure() {
        let transport = MockTransport::new();
        transport.fail_next_connect("network unreachable");

        let result = transport.connect("relay").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());

        // Next connect should work
        transport.connect("relay").await.unwrap();
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn unreachable_relay_always_refuses() {
        let transport = MockTransport::unreachable("refused");
        for _ in 0..3 {
            assert!(transport.connect("relay").await.is_err());
        }
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn forced_send_failure() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();
        transport.fail_next_send("buffer full");

        let result = transport.send("data").await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        // Next send should work
        transport.send("data").await.unwrap();
    }

    #[tokio::test]
    async fn forced_recv_failure() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();
        transport.queue_response("data");
        transport.fail_next_recv("timeout");

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));

        // Next recv should work (and get the queued frame)
        assert_eq!(transport.recv().await.unwrap(), "data");
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.connect("relay").await.unwrap();
        assert!(transport2.is_connected());

        transport1.send("from t1").await.unwrap();
        transport2.send("from t2").await.unwrap();

        assert_eq!(transport1.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn mock_transport_reset_clears_all() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();
        transport.send("data").await.unwrap();
        transport.queue_response("response");

        transport.reset();

        assert!(!transport.is_connected());
        assert!(transport.sent_messages().is_empty());
        assert!(transport.connected_address().is_none());
    }

    #[tokio::test]
    async fn last_sent_returns_most_recent() {
        let transport = MockTransport::new();
        transport.connect("relay").await.unwrap();

        assert!(transport.last_sent().is_none());

        transport.send("first").await.unwrap();
        assert_eq!(transport.last_sent(), Some("first".to_string()));

        transport.send("second").await.unwrap();
        assert_eq!(transport.last_sent(), Some("second".to_string()));
    }

    // ===========================================
    // MockConnector Tests
    // ===========================================

    #[tokio::test]
    async fn connector_hands_out_registered_relay() {
        let connector = MockConnector::new();
        let handle = connector.register("wss://a", MockTransport::new());

        let transport = connector.transport_for("wss://a");
        transport.connect("wss://a").await.unwrap();
        transport.send("hello").await.unwrap();

        assert_eq!(handle.last_sent(), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn connector_unknown_relay_refuses() {
        let connector = MockConnector::new();
        let transport = connector.transport_for("wss://nowhere");

        let result = transport.connect("wss://nowhere").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(msg)) if msg.contains("nowhere")));
    }
}
