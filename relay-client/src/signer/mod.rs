//! Signer abstraction.
//!
//! A [`SignerPort`] turns drafts into signed events. Two implementations:
//! - [`LocalSigner`]: a key held by the host process, signing synchronously
//! - [`RemoteSignerClient`]: a NIP-46 remote signer reached over relays
//!
//! The session layer picks one at login and hands out `Arc<dyn SignerPort>`.

mod channel;
mod local;
mod remote;

pub use local::{KeyHolder, LocalSigner};
pub use remote::{AuthHandler, CancelHandle, RemoteOptions, RemoteSignerClient};

use async_trait::async_trait;
use relay_types::{Event, PublicKey, UnsignedEvent};

use crate::error::SignerError;

/// Something that can sign events for a user.
#[async_trait]
pub trait SignerPort: Send + Sync {
    /// The user's public key.
    async fn get_public_key(&self) -> Result<PublicKey, SignerError>;

    /// Sign `draft` as the user.
    ///
    /// The returned event carries the draft's `created_at`, `kind`, `tags`
    /// and `content` unchanged.
    async fn sign_event(&self, draft: UnsignedEvent) -> Result<Event, SignerError>;

    /// Release keys and sockets. Later calls fail with
    /// [`SignerError::Unavailable`].
    async fn close(&self);
}

/// Check an event a signer handed back.
///
/// Id and signature must verify, the author must be `expected`, and the
/// draft fields must be untouched.
pub(crate) fn check_signed(
    event: &Event,
    expected: &PublicKey,
    draft: &UnsignedEvent,
) -> Result<(), SignerError> {
    event.verify()?;
    if event.pubkey() != expected {
        return Err(SignerError::IdentityMismatch {
            expected: expected.to_hex(),
            actual: event.pubkey().to_hex(),
        });
    }
    if !event.matches_draft(draft) {
        return Err(SignerError::InvalidSignature(
            "signed event does not match the draft".into(),
        ));
    }
    Ok(())
}
