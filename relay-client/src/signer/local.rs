//! Signing with a key held in-process.

use async_trait::async_trait;
use relay_types::{Event, Keys, PublicKey, TypesError, UnsignedEvent};
use std::sync::{Arc, RwLock};

use super::{check_signed, SignerPort};
use crate::error::SignerError;

/// A host-provided signing capability.
///
/// [`Keys`] implements it; hosts with their own key storage (an OS keychain,
/// a hardware token) implement it themselves.
pub trait KeyHolder: Send + Sync {
    /// The key's public half.
    fn public_key(&self) -> PublicKey;

    /// Sign a draft.
    fn sign(&self, draft: UnsignedEvent) -> Result<Event, TypesError>;
}

impl KeyHolder for Keys {
    fn public_key(&self) -> PublicKey {
        Keys::public_key(self)
    }

    fn sign(&self, draft: UnsignedEvent) -> Result<Event, TypesError> {
        Keys::sign(self, draft)
    }
}

/// [`SignerPort`] over a [`KeyHolder`].
pub struct LocalSigner {
    holder: RwLock<Option<Arc<dyn KeyHolder>>>,
}

impl LocalSigner {
    /// Sign with `holder`.
    pub fn new(holder: Arc<dyn KeyHolder>) -> Self {
        Self {
            holder: RwLock::new(Some(holder)),
        }
    }

    /// A signer without a key; every call fails with
    /// [`SignerError::Unavailable`].
    pub fn unavailable() -> Self {
        Self {
            holder: RwLock::new(None),
        }
    }

    fn holder(&self) -> Result<Arc<dyn KeyHolder>, SignerError> {
        self.holder
            .read()
            .map_err(|_| SignerError::Unavailable)?
            .clone()
            .ok_or(SignerError::Unavailable)
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pubkey = self.holder().ok().map(|h| h.public_key());
        f.debug_struct("LocalSigner").field("pubkey", &pubkey).finish()
    }
}

#[async_trait]
impl SignerPort for LocalSigner {
    async fn get_public_key(&self) -> Result<PublicKey, SignerError> {
        Ok(self.holder()?.public_key())
    }

    async fn sign_event(&self, draft: UnsignedEvent) -> Result<Event, SignerError> {
        let holder = self.holder()?;
        let expected = holder.public_key();
        let event = holder.sign(draft.clone())?;
        check_signed(&event, &expected, &draft)?;
        Ok(event)
    }

    async fn close(&self) {
        if let Ok(mut holder) = self.holder.write() {
            holder.take();
        }
    }
}
