//! Transport abstraction for relay sockets.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one text frame (a NIP-01 JSON array)
//! - `recv()` receives one text frame
//! - `close()` gracefully terminates
//!
//! A [`Connector`] hands out a fresh, unconnected transport per relay URL.
//! Relay connections are never pooled: every publish or query opens its own.
//!
//! # Example
//!
//! ```ignore
//! let transport = WsConnector.transport_for("wss://relay.example");
//! transport.connect("wss://relay.example").await?;
//! transport.send(r#"["REQ","sub",{"kinds":[0]}]"#).await?;
//! let frame = transport.recv().await?;
//! ```

mod mock;
mod ws;

pub use mock::{MockConnector, MockTransport, Responder};
pub use ws::{WsConnector, WsTransport};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// Transport trait for exchanging NIP-01 frames with one relay.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc). `send` and `recv` may be called concurrently
/// from different tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the relay at `url`.
    async fn connect(&self, url: &str) -> Result<(), TransportError>;

    /// Send one text frame.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receive one text frame.
    ///
    /// Blocks until a frame is available or the connection closes.
    /// Control frames are handled internally and never returned.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Factory for per-relay transports.
pub trait Connector: Send + Sync + 'static {
    /// Transport type produced.
    type Transport: Transport + 'static;

    /// A fresh, unconnected transport for `url`.
    fn transport_for(&self, url: &str) -> Self::Transport;
}
