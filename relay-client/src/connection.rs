//! One short-lived connection to one relay.
//!
//! A [`Connection`] is opened per publish or query and closed when that
//! call is done. Opening retries with backoff; nothing after that is retried.

use relay_core::RetryPolicy;
use relay_types::{ClientMessage, RelayMessage};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::RelayError;
use crate::retry::retry_with_backoff;
use crate::transport::{Connector, Transport};

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How to establish a relay socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Bound on each attempt.
    pub connect_timeout: Duration,
    /// Attempts and backoff between them.
    pub retry: RetryPolicy,
}

impl ConnectOptions {
    /// Longest `Connection::open` can take before giving up.
    pub fn worst_case(&self) -> Duration {
        self.retry.worst_case(self.connect_timeout)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// An open socket to one relay.
#[derive(Debug)]
pub struct Connection<T: Transport> {
    url: String,
    transport: T,
}

impl<T: Transport> Connection<T> {
    /// Open a connection to `url`, retrying failed attempts per `opts.retry`.
    pub async fn open<C>(connector: &C, url: &str, opts: &ConnectOptions) -> Result<Self, RelayError>
    where
        C: Connector<Transport = T>,
    {
        let transport = connector.transport_for(url);
        let transport_ref = &transport;
        let timeout = opts.connect_timeout;
        tracing::trace!("Opening {} (at most {:?})", url, opts.worst_case());

        retry_with_backoff(&opts.retry, move |attempt| async move {
            tracing::debug!("Connecting to {} (attempt {})", url, attempt);
            match tokio::time::timeout(timeout, transport_ref.connect(url)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("connect timed out after {:?}", timeout)),
            }
        })
        .await
        .map_err(|e| {
            tracing::warn!(
                "Giving up on {} after {} attempt(s): {}",
                url,
                e.attempts,
                e.last
            );
            RelayError::Connect {
                url: url.to_string(),
                attempts: e.attempts,
                reason: e.last,
            }
        })?;

        Ok(Self {
            url: url.to_string(),
            transport,
        })
    }

    /// Relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one client message.
    pub async fn send(&self, message: &ClientMessage) -> Result<(), RelayError> {
        let json = message
            .to_json()
            .map_err(|e| RelayError::Protocol(e.to_string()))?;
        self.transport.send(&json).await?;
        Ok(())
    }

    /// Send `message`, then wait for the first relay message `matcher`
    /// accepts.
    ///
    /// Messages the matcher returns `None` for are skipped. The whole wait,
    /// send excluded, is bounded by `timeout`.
    pub async fn send_and_await<R, F>(
        &self,
        message: &ClientMessage,
        timeout: Duration,
        mut matcher: F,
    ) -> Result<R, RelayError>
    where
        F: FnMut(RelayMessage) -> Option<R>,
    {
        self.send(message).await?;
        match tokio::time::timeout(timeout, self.await_matching(&mut matcher)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(timeout)),
        }
    }

    /// Next relay message, or `None` once `deadline` passes.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Option<RelayMessage>, RelayError> {
        match tokio::time::timeout_at(deadline, self.recv()).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Release the socket. Errors are logged, never returned.
    pub async fn close(&self) {
        if let Err(e) = self.transport.close().await {
            tracing::debug!("Error closing {}: {}", self.url, e);
        }
    }

    async fn await_matching<R, F>(&self, matcher: &mut F) -> Result<R, RelayError>
    where
        F: FnMut(RelayMessage) -> Option<R>,
    {
        loop {
            let message = self.recv().await?;
            if let Some(result) = matcher(message) {
                return Ok(result);
            }
            tracing::debug!("Skipping uncorrelated message from {}", self.url);
        }
    }

    /// Next parseable relay message, waiting as long as it takes.
    ///
    /// NOTICE frames and unparseable frames are logged and skipped.
    pub async fn recv(&self) -> Result<RelayMessage, RelayError> {
        loop {
            let frame = self.transport.recv().await?;
            match RelayMessage::parse(&frame) {
                Ok(RelayMessage::Notice(notice)) => {
                    tracing::debug!("NOTICE from {}: {}", self.url, notice);
                }
                Ok(message) => return Ok(message),
                Err(e) => {
                    tracing::debug!("Skipping unparseable frame from {}: {}", self.url, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockConnector, MockTransport};
    use relay_types::{Keys, SubscriptionId, UnsignedEvent};

    fn quick() -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(50),
            retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4)),
        }
    }

    fn ok_frame(id: &str) -> String {
        format!(r#"["OK","{id}",true,""]"#)
    }

    // ===========================================
    // Open / Retry Tests
    // ===========================================

    #[tokio::test]
    async fn open_connects_on_first_try() {
        let connector = MockConnector::new();
        let relay = connector.register("wss://a", MockTransport::new());

        let conn = Connection::open(&connector, "wss://a", &quick()).await.unwrap();

        assert_eq!(conn.url(), "wss://a");
        assert_eq!(relay.connect_count(), 1);
        assert_eq!(relay.connected_address().as_deref(), Some("wss://a"));
    }

    #[tokio::test]
    async fn open_retries_transient_failure() {
        let connector = MockConnector::new();
        let relay = connector.register("wss://a", MockTransport::new());
        relay.fail_next_connect("connection reset");

        Connection::open(&connector, "wss://a", &quick()).await.unwrap();

        assert_eq!(relay.connect_count(), 2);
        assert!(relay.is_connected());
    }

    #[tokio::test]
    async fn open_gives_up_after_policy_attempts() {
        let connector = MockConnector::new();
        let relay = connector.register("wss://a", MockTransport::unreachable("refused"));

        let err = Connection::open(&connector, "wss://a", &quick())
            .await
            .unwrap_err();

        match err {
            RelayError::Connect { url, attempts, reason } => {
                assert_eq!(url, "wss://a");
                assert_eq!(attempts, 3);
                assert!(reason.contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(relay.connect_count(), 3);
    }

    #[tokio::test]
    async fn stalled_connect_attempts_time_out() {
        let connector = MockConnector::new();
        let relay = MockTransport::new();
        relay.stall_connect();
        connector.register("wss://slow", relay);
        let opts = quick();

        let started = std::time::Instant::now();
        let err = Connection::open(&connector, "wss://slow", &opts)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, RelayError::Connect { reason, .. } if reason.contains("timed out")));
        // Three 50ms attempts plus 1ms and 2ms of backoff
        assert_eq!(opts.worst_case(), Duration::from_millis(153));
        assert!(elapsed >= opts.connect_timeout * 3);
        assert!(elapsed < opts.worst_case() + Duration::from_millis(500));
    }

    // ===========================================
    // Correlation Tests
    // ===========================================

    #[tokio::test]
    async fn send_and_await_skips_noise_until_match() {
        let keys = Keys::generate();
        let event = keys.sign(UnsignedEvent::new(1, "hi")).unwrap();
        let id = event.id().to_string();

        let connector = MockConnector::new();
        let wanted = ok_frame(&id);
        connector.register(
            "wss://a",
            MockTransport::scripted(move |_| {
                vec![
                    "not json".to_string(),
                    r#"["NOTICE","slow down"]"#.to_string(),
                    ok_frame(&"0".repeat(64)),
                    wanted.clone(),
                ]
            }),
        );

        let conn = Connection::open(&connector, "wss://a", &quick()).await.unwrap();
        let accepted = conn
            .send_and_await(
                &ClientMessage::Event(event),
                Duration::from_secs(1),
                |msg| match msg {
                    RelayMessage::Ok { event_id, accepted, .. } if event_id == id => Some(accepted),
                    _ => None,
                },
            )
            .await
            .unwrap();

        assert!(accepted);
    }

    #[tokio::test]
    async fn send_and_await_times_out_on_silent_relay() {
        let connector = MockConnector::new();
        connector.register("wss://quiet", MockTransport::silent());

        let conn = Connection::open(&connector, "wss://quiet", &quick())
            .await
            .unwrap();
        let sub = SubscriptionId::new("s");
        let err = conn
            .send_and_await(
                &ClientMessage::Close(sub),
                Duration::from_millis(30),
                |_| Some(()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Timeout(d) if d == Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn send_and_await_reports_closed_socket() {
        let connector = MockConnector::new();
        connector.register("wss://a", MockTransport::new());

        let conn = Connection::open(&connector, "wss://a", &quick()).await.unwrap();
        let err = conn
            .send_and_await(
                &ClientMessage::Close(SubscriptionId::new("s")),
                Duration::from_secs(1),
                |_| Some(()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[tokio::test]
    async fn recv_until_returns_none_at_deadline() {
        let connector = MockConnector::new();
        connector.register("wss://quiet", MockTransport::silent());

        let conn = Connection::open(&connector, "wss://quiet", &quick())
            .await
            .unwrap();
        let deadline = Instant::now() + Duration::from_millis(20);

        assert!(conn.recv_until(deadline).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_releases_socket() {
        let connector = MockConnector::new();
        let relay = connector.register("wss://a", MockTransport::new());

        let conn = Connection::open(&connector, "wss://a", &quick()).await.unwrap();
        conn.close().await;

        assert!(!relay.is_connected());
    }
}
