//! Remote signer handshake state machine.
//!
//! Pure and side-effect free: [`RemoteSignerState::on_event`] takes an event
//! and returns the next state plus a list of [`RemoteAction`]s. The relay
//! channel, timers and user prompts live in relay-client, which executes the
//! actions.
//!
//! ```text
//! Idle ──Start──▶ Connecting ──ChannelOpened──▶ AwaitingApproval ──Approved──▶ Ready
//!   │                 │                               │                         │
//!   └─────────────────┴──── TimedOut / Failed / Cancel ┴──────▶ Closed ◀─ Logout ┘
//! ```

use relay_types::PublicKey;

/// How the handshake was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// We generated a `nostrconnect://` URI and wait for the signer.
    ClientInitiated,
    /// The user gave us a `bunker://` pointer; we send `connect`.
    PointerInitiated,
    /// Silent reconnect from a persisted pointer; we send `get_public_key`.
    Reconnect,
}

/// Why a handshake or session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// No approval within the handshake window.
    TimedOut,
    /// The remote signer answered `connect` with an error.
    Rejected(String),
    /// The relay channel could not be opened or broke.
    ChannelFailed(String),
    /// The user aborted the handshake.
    Cancelled,
    /// The session was ended normally.
    LoggedOut,
}

/// Handshake state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemoteSignerState {
    /// Nothing started.
    #[default]
    Idle,
    /// Opening relay subscriptions.
    Connecting {
        /// Handshake flavor.
        flow: Flow,
    },
    /// Waiting for the remote signer to approve.
    AwaitingApproval {
        /// Handshake flavor.
        flow: Flow,
    },
    /// Requests may be sent.
    Ready {
        /// The remote signer's own public key (request recipient).
        remote_signer: PublicKey,
    },
    /// Terminal.
    Closed {
        /// Why the state machine stopped.
        reason: CloseReason,
    },
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// Begin a handshake.
    Start(Flow),
    /// Relay subscriptions are up.
    ChannelOpened,
    /// The relay channel failed.
    ChannelFailed {
        /// Error description.
        error: String,
    },
    /// The remote signer approved.
    Approved {
        /// The remote signer's public key.
        remote_signer: PublicKey,
    },
    /// The remote signer refused.
    Rejected {
        /// Error returned by the signer.
        error: String,
    },
    /// The remote signer asked the user to visit a URL.
    AuthChallenge {
        /// URL to present.
        url: String,
    },
    /// A deadline elapsed.
    TimedOut,
    /// User aborted.
    Cancel,
    /// Session ended.
    Logout,
}

/// Instructions for relay-client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    /// Subscribe on the relays for kind-24133 events addressed to us.
    OpenChannel,
    /// Hand the `nostrconnect://` URI to the user.
    PresentUri,
    /// Send `connect` to the remote signer.
    SendConnect,
    /// Send `get_public_key` to verify a resumed session.
    SendGetPublicKey,
    /// Start the approval deadline.
    StartApprovalTimer,
    /// Show an `auth_url` to the user and keep waiting.
    SurfaceAuthUrl {
        /// URL to present.
        url: String,
    },
    /// Tear down relay sockets and fail pending requests.
    CloseChannel,
}

impl RemoteSignerState {
    /// Create a state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: RemoteEvent) -> (Self, Vec<RemoteAction>) {
        match (self, event) {
            // From Idle
            (Self::Idle, RemoteEvent::Start(flow)) => {
                (Self::Connecting { flow }, vec![RemoteAction::OpenChannel])
            }

            // From Connecting
            (Self::Connecting { flow }, RemoteEvent::ChannelOpened) => {
                let first = match flow {
                    Flow::ClientInitiated => RemoteAction::PresentUri,
                    Flow::PointerInitiated => RemoteAction::SendConnect,
                    Flow::Reconnect => RemoteAction::SendGetPublicKey,
                };
                (
                    Self::AwaitingApproval { flow },
                    vec![first, RemoteAction::StartApprovalTimer],
                )
            }

            // From AwaitingApproval
            (Self::AwaitingApproval { .. }, RemoteEvent::Approved { remote_signer }) => {
                (Self::Ready { remote_signer }, vec![])
            }
            (Self::AwaitingApproval { .. }, RemoteEvent::Rejected { error }) => (
                Self::Closed {
                    reason: CloseReason::Rejected(error),
                },
                vec![RemoteAction::CloseChannel],
            ),
            (state @ Self::AwaitingApproval { .. }, RemoteEvent::AuthChallenge { url })
            | (state @ Self::Ready { .. }, RemoteEvent::AuthChallenge { url }) => {
                (state, vec![RemoteAction::SurfaceAuthUrl { url }])
            }

            // A single request timing out does not end a ready session.
            (state @ Self::Ready { .. }, RemoteEvent::TimedOut) => (state, vec![]),
            (Self::Ready { .. }, RemoteEvent::Logout) => (
                Self::Closed {
                    reason: CloseReason::LoggedOut,
                },
                vec![RemoteAction::CloseChannel],
            ),

            // From any live state
            (state, RemoteEvent::TimedOut) if state.is_handshaking() => (
                Self::Closed {
                    reason: CloseReason::TimedOut,
                },
                vec![RemoteAction::CloseChannel],
            ),
            (state, RemoteEvent::ChannelFailed { error }) if state.is_live() => (
                Self::Closed {
                    reason: CloseReason::ChannelFailed(error),
                },
                vec![RemoteAction::CloseChannel],
            ),
            (state, RemoteEvent::Cancel) if state.is_live() => (
                Self::Closed {
                    reason: CloseReason::Cancelled,
                },
                vec![RemoteAction::CloseChannel],
            ),
            (state, RemoteEvent::Logout) if state.is_live() => (
                Self::Closed {
                    reason: CloseReason::LoggedOut,
                },
                vec![RemoteAction::CloseChannel],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if requests may be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Check if a handshake is in progress.
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            Self::Connecting { .. } | Self::AwaitingApproval { .. }
        )
    }

    /// Check if the machine has started and not yet closed.
    pub fn is_live(&self) -> bool {
        self.is_handshaking() || self.is_ready()
    }

    /// The remote signer key once ready.
    pub fn remote_signer(&self) -> Option<&PublicKey> {
        match self {
            Self::Ready { remote_signer } => Some(remote_signer),
            _ => None,
        }
    }
}
