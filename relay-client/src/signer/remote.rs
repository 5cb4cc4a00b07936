//! NIP-46 remote signing.
//!
//! A [`RemoteSignerClient`] talks to a signer app (a "bunker") through
//! relays. Every handshake runs the pure [`RemoteSignerState`] machine from
//! relay-core and executes the actions it returns; after approval, requests
//! are multiplexed over one [`RelayChannel`] by request id.
//!
//! Three ways in:
//! - [`connect_bunker`](RemoteSignerClient::connect_bunker): the user pasted
//!   a `bunker://` URI; we send `connect`.
//! - [`connect_client_initiated`](RemoteSignerClient::connect_client_initiated):
//!   we show a `nostrconnect://` URI and wait for the signer to echo its
//!   secret.
//! - [`reconnect`](RemoteSignerClient::reconnect): a persisted pointer and
//!   client key; we check the signer still speaks for the same user.

use async_trait::async_trait;
use relay_core::{
    BunkerPointer, ConnectSecret, Flow, NostrConnectUri, RemoteAction, RemoteEvent, RemoteRequest,
    RemoteSignerState, ResponseOutcome, ACK, PONG,
};
use relay_types::{Event, Keys, PublicKey, UnsignedEvent};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::channel::{Incoming, PendingReply, RelayChannel};
use super::{check_signed, SignerPort};
use crate::connection::ConnectOptions;
use crate::error::{RelayError, SignerError};
use crate::transport::Connector;

/// Default wait for the user to approve a connection.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Default bound on each request once connected.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Called with the URL of an `auth_url` challenge.
pub type AuthHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Remote signer settings.
#[derive(Clone)]
pub struct RemoteOptions {
    /// Wait for the user to approve a new connection.
    pub approval_timeout: Duration,
    /// Bound on each request after the handshake, and on reconnects.
    pub request_timeout: Duration,
    /// Permissions asked for in `connect` and `nostrconnect://` URIs.
    pub perms: Option<String>,
    /// Name the signer shows the user.
    pub app_name: Option<String>,
    /// How to reach the signer's relays.
    pub connect: ConnectOptions,
    /// Receives `auth_url` challenges in addition to the log.
    pub auth_handler: Option<AuthHandler>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            perms: None,
            app_name: None,
            connect: ConnectOptions::default(),
            auth_handler: None,
        }
    }
}

impl RemoteOptions {
    /// Forward `auth_url` challenges to `handler`.
    pub fn on_auth_url<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.auth_handler = Some(Arc::new(handler));
        self
    }

    fn surface_auth_url(&self, url: &str) {
        tracing::warn!("Remote signer asks you to authorize at {}", url);
        if let Some(handler) = &self.auth_handler {
            handler(url);
        }
    }
}

impl fmt::Debug for RemoteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteOptions")
            .field("approval_timeout", &self.approval_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("perms", &self.perms)
            .field("app_name", &self.app_name)
            .field("connect", &self.connect)
            .field("auth_handler", &self.auth_handler.is_some())
            .finish()
    }
}

/// Aborts an in-flight handshake.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    /// A handle that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

async fn cancelled(cancel: Option<&CancelHandle>) {
    match cancel {
        Some(cancel) => cancel.cancelled().await,
        None => std::future::pending().await,
    }
}

/// A NIP-46 session in the Ready state.
pub struct RemoteSignerClient {
    channel: RelayChannel,
    state: Mutex<RemoteSignerState>,
    remote_signer: PublicKey,
    user_pubkey: PublicKey,
    pointer: BunkerPointer,
    opts: RemoteOptions,
}

impl RemoteSignerClient {
    /// Log in with a `bunker://` URI.
    ///
    /// Sends `connect` (with the URI's secret, if any) and waits up to
    /// `approval_timeout` for the signer to accept, then asks for the user's
    /// public key.
    pub async fn connect_bunker<C: Connector>(
        connector: Arc<C>,
        uri: &str,
        opts: RemoteOptions,
        cancel: Option<&CancelHandle>,
    ) -> Result<Self, SignerError> {
        let pointer = BunkerPointer::parse(uri)?;
        tracing::info!("Connecting to remote signer {}", pointer.remote_pubkey);
        let plan = Plan {
            flow: Flow::PointerInitiated,
            relays: &pointer.relays,
            client_keys: Keys::generate(),
            remote: Some(pointer.remote_pubkey),
            secret: pointer.secret.clone(),
            uri: None,
            window: opts.approval_timeout,
        };
        let approved = handshake(connector, plan, &opts, cancel, None::<fn(&NostrConnectUri)>).await?;
        Self::finish_login(approved, pointer.relays, opts).await
    }

    /// Log in by showing the user a `nostrconnect://` URI.
    ///
    /// `on_uri` receives the URI once the relays are subscribed. The signer
    /// has `approval_timeout` to answer with the URI's secret.
    pub async fn connect_client_initiated<C, F>(
        connector: Arc<C>,
        relays: &[String],
        opts: RemoteOptions,
        on_uri: F,
        cancel: Option<&CancelHandle>,
    ) -> Result<Self, SignerError>
    where
        C: Connector,
        F: FnOnce(&NostrConnectUri) + Send,
    {
        for relay in relays {
            relay_core::validate_relay_url(relay)?;
        }
        let client_keys = Keys::generate();
        let secret = ConnectSecret::generate();
        let uri = NostrConnectUri {
            client_pubkey: client_keys.public_key(),
            relays: relays.to_vec(),
            secret: secret.clone(),
            perms: opts.perms.clone(),
            name: opts.app_name.clone(),
        };
        let plan = Plan {
            flow: Flow::ClientInitiated,
            relays,
            client_keys,
            remote: None,
            secret: Some(secret),
            uri: Some(uri),
            window: opts.approval_timeout,
        };
        let approved = handshake(connector, plan, &opts, cancel, Some(on_uri)).await?;
        Self::finish_login(approved, relays.to_vec(), opts).await
    }

    /// Resume a persisted session without user interaction.
    ///
    /// Sends `get_public_key` under the old client key and fails with
    /// [`SignerError::IdentityMismatch`] if the signer now answers for a
    /// different user. Bounded by `request_timeout`.
    pub async fn reconnect<C: Connector>(
        connector: Arc<C>,
        pointer: &BunkerPointer,
        client_keys: Keys,
        expected: PublicKey,
        opts: RemoteOptions,
    ) -> Result<Self, SignerError> {
        tracing::info!("Reconnecting to remote signer {}", pointer.remote_pubkey);
        let plan = Plan {
            flow: Flow::Reconnect,
            relays: &pointer.relays,
            client_keys,
            remote: Some(pointer.remote_pubkey),
            secret: None,
            uri: None,
            window: opts.request_timeout,
        };
        let approved = handshake(connector, plan, &opts, None, None::<fn(&NostrConnectUri)>).await?;

        let reported = PublicKey::from_hex(&approved.result);
        if reported.as_ref().ok() != Some(&expected) {
            approved.channel.shutdown().await;
            let actual = reported
                .map(|pk| pk.to_hex())
                .unwrap_or_else(|_| approved.result.clone());
            tracing::warn!(
                "Remote signer now answers for {} instead of {}",
                actual,
                expected
            );
            return Err(SignerError::IdentityMismatch {
                expected: expected.to_hex(),
                actual,
            });
        }

        Ok(Self::ready(approved.channel, approved.remote_signer, expected, pointer.relays.clone(), opts))
    }

    async fn finish_login(
        approved: Approved,
        relays: Vec<String>,
        opts: RemoteOptions,
    ) -> Result<Self, SignerError> {
        let remote = approved.remote_signer;
        let mut client = Self::ready(approved.channel, remote, remote, relays, opts);
        match client.call(RemoteRequest::get_public_key()).await {
            Ok(hex) => match PublicKey::from_hex(&hex) {
                Ok(user) => {
                    client.user_pubkey = user;
                    tracing::info!("Remote signer ready for {}", user);
                    Ok(client)
                }
                Err(e) => {
                    client.close().await;
                    Err(SignerError::Protocol(format!("bad get_public_key result: {e}")))
                }
            },
            Err(e) => {
                client.close().await;
                Err(e)
            }
        }
    }

    fn ready(
        channel: RelayChannel,
        remote_signer: PublicKey,
        user_pubkey: PublicKey,
        relays: Vec<String>,
        opts: RemoteOptions,
    ) -> Self {
        Self {
            channel,
            state: Mutex::new(RemoteSignerState::Ready { remote_signer }),
            remote_signer,
            user_pubkey,
            pointer: BunkerPointer {
                remote_pubkey: remote_signer,
                relays,
                secret: None,
            },
            opts,
        }
    }

    /// Where to find the signer again. The one-time secret is never kept.
    pub fn pointer(&self) -> &BunkerPointer {
        &self.pointer
    }

    /// Ephemeral key this client signs its envelopes with.
    pub fn client_keys(&self) -> &Keys {
        self.channel.client_keys()
    }

    /// The user's key, as reported at login.
    pub fn user_public_key(&self) -> PublicKey {
        self.user_pubkey
    }

    /// The signer app's own key.
    pub fn remote_signer(&self) -> PublicKey {
        self.remote_signer
    }

    /// Whether requests may still be sent.
    pub fn is_ready(&self) -> bool {
        self.state.lock().map(|s| s.is_ready()).unwrap_or(false)
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<(), SignerError> {
        let result = self.call(RemoteRequest::ping()).await?;
        if result == PONG {
            Ok(())
        } else {
            Err(SignerError::Protocol(format!("unexpected ping reply: {result}")))
        }
    }

    /// Send one request and wait for its result, up to `request_timeout`.
    async fn call(&self, request: RemoteRequest) -> Result<String, SignerError> {
        let remote = self
            .state
            .lock()
            .map_err(|_| SignerError::Unavailable)?
            .remote_signer()
            .copied()
            .ok_or(SignerError::Unavailable)?;

        let method = request.method;
        let mut reply = self.channel.send_request(&remote, &request)?;
        let deadline = Instant::now() + self.opts.request_timeout;

        loop {
            let incoming = match tokio::time::timeout_at(deadline, reply.next()).await {
                Ok(Some(incoming)) => incoming,
                Ok(None) => {
                    self.transition(RemoteEvent::ChannelFailed {
                        error: "relay channel closed".into(),
                    })
                    .await;
                    return Err(SignerError::Unavailable);
                }
                Err(_) => {
                    tracing::warn!(
                        "Remote signer did not answer {} within {:?}",
                        method.as_str(),
                        self.opts.request_timeout
                    );
                    self.transition(RemoteEvent::TimedOut).await;
                    return Err(SignerError::RemoteTimeout(self.opts.request_timeout));
                }
            };
            if incoming.author != remote {
                tracing::debug!("Ignoring reply from {} (not the signer)", incoming.author);
                continue;
            }
            match incoming.response.outcome()? {
                ResponseOutcome::Result(result) => return Ok(result),
                ResponseOutcome::Error(error) => return Err(SignerError::Remote(error)),
                ResponseOutcome::AuthUrl(url) => {
                    self.transition(RemoteEvent::AuthChallenge { url }).await;
                }
            }
        }
    }

    async fn transition(&self, event: RemoteEvent) {
        let actions = match self.state.lock() {
            Ok(mut state) => {
                let (next, actions) = state.clone().on_event(event);
                *state = next;
                actions
            }
            Err(_) => vec![RemoteAction::CloseChannel],
        };
        for action in actions {
            match action {
                RemoteAction::SurfaceAuthUrl { url } => self.opts.surface_auth_url(&url),
                RemoteAction::CloseChannel => self.channel.shutdown().await,
                other => tracing::debug!("Ignoring {:?} on a ready session", other),
            }
        }
    }
}

impl fmt::Debug for RemoteSignerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSignerClient")
            .field("user", &self.user_pubkey)
            .field("remote_signer", &self.remote_signer)
            .field("relays", &self.pointer.relays)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[async_trait]
impl SignerPort for RemoteSignerClient {
    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        let hex = self.call(RemoteRequest::get_public_key()).await?;
        let reported =
            PublicKey::from_hex(&hex).map_err(|e| SignerError::Protocol(e.to_string()))?;
        if reported != self.user_pubkey {
            return Err(SignerError::IdentityMismatch {
                expected: self.user_pubkey.to_hex(),
                actual: reported.to_hex(),
            });
        }
        Ok(reported)
    }

    async fn sign_event(&self, draft: UnsignedEvent) -> Result<Event, SignerError> {
        let json = self.call(RemoteRequest::sign_event(&draft)?).await?;
        let event = Event::from_json(&json)?;
        check_signed(&event, &self.user_pubkey, &draft)?;
        Ok(event)
    }

    async fn close(&self) {
        self.transition(RemoteEvent::Logout).await;
        self.channel.shutdown().await;
    }
}

// ===========================================
// Handshake
// ===========================================

struct Plan<'a> {
    flow: Flow,
    relays: &'a [String],
    client_keys: Keys,
    /// Known signer key (pointer flows).
    remote: Option<PublicKey>,
    secret: Option<ConnectSecret>,
    uri: Option<NostrConnectUri>,
    window: Duration,
}

struct Approved {
    channel: RelayChannel,
    remote_signer: PublicKey,
    result: String,
}

/// What counts as approval.
enum Awaiting {
    /// Anyone echoing the secret (client-initiated).
    Secret(ConnectSecret),
    /// An answer from `from` to our request.
    Reply {
        from: PublicKey,
        reply: PendingReply,
        connect: bool,
        secret: Option<ConnectSecret>,
    },
}

enum Wake {
    Deadline,
    Cancelled,
    ChannelClosed,
    Response(Incoming),
}

async fn next_response(channel: &RelayChannel, awaiting: &mut Awaiting) -> Option<Incoming> {
    match awaiting {
        Awaiting::Secret(_) => channel.next_unsolicited().await,
        Awaiting::Reply { reply, .. } => reply.next().await,
    }
}

/// Map a response to a state machine event, or `None` to keep waiting.
fn judge(awaiting: &Awaiting, incoming: &Incoming) -> Option<(RemoteEvent, Option<String>)> {
    match awaiting {
        Awaiting::Secret(secret) => {
            if incoming.response.result.as_deref() == Some(secret.as_str()) {
                let approved = RemoteEvent::Approved {
                    remote_signer: incoming.author,
                };
                Some((approved, Some(secret.as_str().to_string())))
            } else {
                tracing::debug!("Ignoring unsolicited response from {}", incoming.author);
                None
            }
        }
        Awaiting::Reply {
            from,
            connect,
            secret,
            ..
        } => {
            if incoming.author != *from {
                tracing::debug!("Ignoring reply from {} (not the signer)", incoming.author);
                return None;
            }
            match incoming.response.outcome() {
                Ok(ResponseOutcome::Result(result)) => {
                    let acked = result == ACK
                        || secret.as_ref().map(|s| s.as_str()) == Some(result.as_str());
                    if *connect && !acked {
                        let error = format!("unexpected connect reply: {result}");
                        return Some((RemoteEvent::Rejected { error }, None));
                    }
                    Some((RemoteEvent::Approved { remote_signer: *from }, Some(result)))
                }
                Ok(ResponseOutcome::Error(error)) => Some((RemoteEvent::Rejected { error }, None)),
                Ok(ResponseOutcome::AuthUrl(url)) => Some((RemoteEvent::AuthChallenge { url }, None)),
                Err(e) => {
                    tracing::debug!("Ignoring malformed reply: {}", e);
                    None
                }
            }
        }
    }
}

fn step(state: &mut RemoteSignerState, event: RemoteEvent) -> VecDeque<RemoteAction> {
    let (next, actions) = state.clone().on_event(event);
    *state = next;
    VecDeque::from(actions)
}

/// Drive the state machine from Idle to Ready (or Closed).
async fn handshake<C, F>(
    connector: Arc<C>,
    mut plan: Plan<'_>,
    opts: &RemoteOptions,
    cancel: Option<&CancelHandle>,
    mut on_uri: Option<F>,
) -> Result<Approved, SignerError>
where
    C: Connector,
    F: FnOnce(&NostrConnectUri) + Send,
{
    let mut state = RemoteSignerState::new();
    let mut channel: Option<RelayChannel> = None;
    let mut awaiting: Option<Awaiting> = None;
    let mut deadline = Instant::now() + plan.window;
    let mut failure: Option<SignerError> = None;
    let mut result: Option<String> = None;

    let mut actions = step(&mut state, RemoteEvent::Start(plan.flow));

    loop {
        while let Some(action) = actions.pop_front() {
            let follow_up = match action {
                RemoteAction::OpenChannel => {
                    match RelayChannel::open(
                        Arc::clone(&connector),
                        plan.relays,
                        plan.client_keys.clone(),
                        &opts.connect,
                    )
                    .await
                    {
                        Ok(opened) => {
                            channel = Some(opened);
                            Some(RemoteEvent::ChannelOpened)
                        }
                        Err(e) => {
                            let error = e.to_string();
                            failure = Some(e.into());
                            Some(RemoteEvent::ChannelFailed { error })
                        }
                    }
                }
                RemoteAction::PresentUri => {
                    if let (Some(uri), Some(on_uri)) = (plan.uri.take(), on_uri.take()) {
                        on_uri(&uri);
                    }
                    awaiting = plan.secret.clone().map(Awaiting::Secret);
                    tracing::info!("Waiting up to {:?} for remote signer approval", plan.window);
                    None
                }
                RemoteAction::SendConnect | RemoteAction::SendGetPublicKey => {
                    let connect = action == RemoteAction::SendConnect;
                    match (&channel, plan.remote) {
                        (Some(open), Some(remote)) => {
                            let request = if connect {
                                RemoteRequest::connect(
                                    &remote,
                                    plan.secret.as_ref(),
                                    opts.perms.as_deref(),
                                )
                            } else {
                                RemoteRequest::get_public_key()
                            };
                            match open.send_request(&remote, &request) {
                                Ok(reply) => {
                                    awaiting = Some(Awaiting::Reply {
                                        from: remote,
                                        reply,
                                        connect,
                                        secret: plan.secret.clone(),
                                    });
                                    None
                                }
                                Err(e) => {
                                    let error = e.to_string();
                                    failure = Some(e);
                                    Some(RemoteEvent::ChannelFailed { error })
                                }
                            }
                        }
                        _ => {
                            failure = Some(SignerError::Protocol("no remote signer to address".into()));
                            Some(RemoteEvent::ChannelFailed {
                                error: "no remote signer to address".into(),
                            })
                        }
                    }
                }
                RemoteAction::StartApprovalTimer => {
                    deadline = Instant::now() + plan.window;
                    None
                }
                RemoteAction::SurfaceAuthUrl { url } => {
                    opts.surface_auth_url(&url);
                    None
                }
                RemoteAction::CloseChannel => {
                    if let Some(open) = &channel {
                        open.shutdown().await;
                    }
                    None
                }
            };
            if let Some(event) = follow_up {
                actions.extend(step(&mut state, event));
            }
        }

        match &state {
            RemoteSignerState::Ready { remote_signer } => {
                let (Some(channel), Some(result)) = (channel, result) else {
                    return Err(SignerError::Protocol("approved without a channel".into()));
                };
                return Ok(Approved {
                    channel,
                    remote_signer: *remote_signer,
                    result,
                });
            }
            RemoteSignerState::Closed { reason } => {
                tracing::warn!("Remote signer handshake ended: {:?}", reason);
                return Err(failure
                    .unwrap_or_else(|| SignerError::Protocol(format!("handshake closed: {reason:?}"))));
            }
            _ => {}
        }

        let (Some(open), Some(waiting)) = (&channel, awaiting.as_mut()) else {
            return Err(SignerError::Protocol("handshake stalled".into()));
        };
        let wake = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
            _ = cancelled(cancel) => Wake::Cancelled,
            incoming = next_response(open, waiting) => match incoming {
                Some(incoming) => Wake::Response(incoming),
                None => Wake::ChannelClosed,
            },
        };

        let event = match wake {
            Wake::Deadline => {
                failure = Some(SignerError::RemoteTimeout(plan.window));
                RemoteEvent::TimedOut
            }
            Wake::Cancelled => {
                failure = Some(SignerError::Cancelled);
                RemoteEvent::Cancel
            }
            Wake::ChannelClosed => {
                failure = Some(SignerError::Relay(RelayError::Protocol(
                    "remote signer channel closed".into(),
                )));
                RemoteEvent::ChannelFailed {
                    error: "remote signer channel closed".into(),
                }
            }
            Wake::Response(incoming) => {
                let Some(judged) = awaiting.as_ref().and_then(|a| judge(a, &incoming)) else {
                    continue;
                };
                match judged {
                    (RemoteEvent::Rejected { error }, _) => {
                        failure = Some(SignerError::HandshakeRejected(error.clone()));
                        RemoteEvent::Rejected { error }
                    }
                    (event, approved) => {
                        if approved.is_some() {
                            result = approved;
                        }
                        event
                    }
                }
            }
        };
        actions.extend(step(&mut state, event));
    }
}
