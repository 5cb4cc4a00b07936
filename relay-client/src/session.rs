//! The active signing session.
//!
//! [`SessionManager`] owns at most one signer at a time. Logging in tears
//! the previous session down first (sockets closed, ephemeral key dropped),
//! and the persisted record is only written once the new signer is proven.
//! On restart, [`SessionManager::restore`] resumes from that record or
//! clears it.

use async_trait::async_trait;
use relay_core::{BunkerPointer, NostrConnectUri};
use relay_types::{Event, Keys, PublicKey, UnsignedEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::error::SignerError;
use crate::signer::{CancelHandle, KeyHolder, LocalSigner, RemoteOptions, RemoteSignerClient, SignerPort};
use crate::transport::Connector;

/// File name used by [`FileSessionStore`].
pub const SESSION_FILE: &str = "session.json";

/// How the user signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerMethod {
    /// Key held by this process.
    Local,
    /// NIP-46 remote signer.
    Remote,
}

/// What survives a restart.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// The user's public key.
    pub pubkey: PublicKey,
    /// Name to greet the user with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Login method.
    pub method: SignerMethod,
    /// Remote signer location (remote sessions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bunker: Option<BunkerPointer>,
    /// Hex secret of the ephemeral client key (remote sessions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_key: Option<String>,
}

impl fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedSession")
            .field("pubkey", &self.pubkey)
            .field("display_name", &self.display_name)
            .field("method", &self.method)
            .field("bunker", &self.bunker)
            .field(
                "client_secret_key",
                &self.client_secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Session persistence errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the record failed.
    #[error("session file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The stored record is not valid JSON.
    #[error("invalid session record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the session record lives.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The stored record, if any.
    async fn load(&self) -> Result<Option<PersistedSession>, SessionError>;

    /// Replace the stored record.
    async fn save(&self, session: &PersistedSession) -> Result<(), SessionError>;

    /// Remove the stored record. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), SessionError>;
}

/// `session.json` in a data directory, owner-readable only.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store in `<data_dir>/session.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    /// Location of the record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<PersistedSession>, SessionError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), SessionError> {
        let contents = serde_json::to_string_pretty(session)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|e| self.io_error(e))?;
        set_file_permissions_0600(&self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// In-memory store for tests and embedding. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    record: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemorySessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `session` already stored.
    pub fn with(session: PersistedSession) -> Self {
        Self {
            record: Arc::new(Mutex::new(Some(session))),
        }
    }

    fn record(&self) -> std::sync::MutexGuard<'_, Option<PersistedSession>> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<PersistedSession>, SessionError> {
        Ok(self.record().clone())
    }

    async fn save(&self, session: &PersistedSession) -> Result<(), SessionError> {
        *self.record() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.record().take();
        Ok(())
    }
}

struct Active {
    signer: Arc<dyn SignerPort>,
    method: SignerMethod,
    pubkey: PublicKey,
    display_name: Option<String>,
}

/// Owner of the one active signer.
pub struct SessionManager<S: SessionStore, C: Connector> {
    store: S,
    connector: Arc<C>,
    remote: RemoteOptions,
    active: tokio::sync::Mutex<Option<Active>>,
}

impl<S: SessionStore, C: Connector> SessionManager<S, C> {
    /// A manager with no active session.
    pub fn new(store: S, connector: Arc<C>, remote: RemoteOptions) -> Self {
        Self {
            store,
            connector,
            remote,
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sign in with a key held by the host.
    pub async fn login_local(
        &self,
        holder: Arc<dyn KeyHolder>,
        display_name: Option<String>,
    ) -> Result<PublicKey, SignerError> {
        let mut active = self.active.lock().await;
        self.end_session(&mut active).await?;

        let signer = LocalSigner::new(holder);
        let pubkey = signer.get_public_key().await?;
        let record = PersistedSession {
            pubkey,
            display_name: display_name.clone(),
            method: SignerMethod::Local,
            bunker: None,
            client_secret_key: None,
        };
        self.store.save(&record).await?;

        tracing::info!("Logged in locally as {}", pubkey);
        *active = Some(Active {
            signer: Arc::new(signer),
            method: SignerMethod::Local,
            pubkey,
            display_name,
        });
        Ok(pubkey)
    }

    /// Sign in through a `bunker://` URI.
    pub async fn login_with_bunker(&self, uri: &str) -> Result<PublicKey, SignerError> {
        let mut active = self.active.lock().await;
        self.end_session(&mut active).await?;

        let client = RemoteSignerClient::connect_bunker(
            Arc::clone(&self.connector),
            uri,
            self.remote.clone(),
            None,
        )
        .await?;
        self.activate_remote(&mut active, client).await
    }

    /// Sign in by showing a `nostrconnect://` URI (see
    /// [`RemoteSignerClient::connect_client_initiated`]).
    pub async fn login_with_nostrconnect<F>(
        &self,
        relays: &[String],
        on_uri: F,
        cancel: Option<&CancelHandle>,
    ) -> Result<PublicKey, SignerError>
    where
        F: FnOnce(&NostrConnectUri) + Send,
    {
        let mut active = self.active.lock().await;
        self.end_session(&mut active).await?;

        let client = RemoteSignerClient::connect_client_initiated(
            Arc::clone(&self.connector),
            relays,
            self.remote.clone(),
            on_uri,
            cancel,
        )
        .await?;
        self.activate_remote(&mut active, client).await
    }

    async fn activate_remote(
        &self,
        active: &mut Option<Active>,
        client: RemoteSignerClient,
    ) -> Result<PublicKey, SignerError> {
        let pubkey = client.user_public_key();
        let record = PersistedSession {
            pubkey,
            display_name: None,
            method: SignerMethod::Remote,
            bunker: Some(client.pointer().clone()),
            client_secret_key: Some(client.client_keys().secret_hex()),
        };
        if let Err(e) = self.store.save(&record).await {
            client.close().await;
            return Err(e.into());
        }

        tracing::info!("Logged in via remote signer as {}", pubkey);
        *active = Some(Active {
            signer: Arc::new(client),
            method: SignerMethod::Remote,
            pubkey,
            display_name: None,
        });
        Ok(pubkey)
    }

    /// Resume the persisted session.
    ///
    /// Remote sessions reconnect silently; local sessions need `local`, the
    /// holder of the same key. Returns `Ok(None)` when nothing is stored.
    /// Any failure clears the stored record before the error is returned.
    pub async fn restore(
        &self,
        local: Option<Arc<dyn KeyHolder>>,
    ) -> Result<Option<PublicKey>, SignerError> {
        let mut active = self.active.lock().await;
        teardown(&mut active).await;

        let record = match self.store.load().await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(SessionError::Json(e)) => {
                tracing::warn!("Discarding unreadable session record: {}", e);
                self.store.clear().await?;
                return Err(SessionError::Json(e).into());
            }
            Err(e) => return Err(e.into()),
        };

        match self.resume(&record, local).await {
            Ok(signer) => {
                tracing::info!("Restored {:?} session for {}", record.method, record.pubkey);
                *active = Some(Active {
                    signer,
                    method: record.method,
                    pubkey: record.pubkey,
                    display_name: record.display_name,
                });
                Ok(Some(record.pubkey))
            }
            Err(e) => {
                tracing::warn!("Could not restore session for {}: {}", record.pubkey, e);
                self.store.clear().await?;
                Err(e)
            }
        }
    }

    async fn resume(
        &self,
        record: &PersistedSession,
        local: Option<Arc<dyn KeyHolder>>,
    ) -> Result<Arc<dyn SignerPort>, SignerError> {
        match record.method {
            SignerMethod::Local => {
                let holder = local.ok_or(SignerError::Unavailable)?;
                let actual = holder.public_key();
                if actual != record.pubkey {
                    return Err(SignerError::IdentityMismatch {
                        expected: record.pubkey.to_hex(),
                        actual: actual.to_hex(),
                    });
                }
                Ok(Arc::new(LocalSigner::new(holder)))
            }
            SignerMethod::Remote => {
                let (Some(pointer), Some(secret)) = (&record.bunker, &record.client_secret_key)
                else {
                    return Err(SignerError::Protocol(
                        "remote session record lacks pointer or client key".into(),
                    ));
                };
                let client_keys = Keys::from_secret_hex(secret)?;
                let client = RemoteSignerClient::reconnect(
                    Arc::clone(&self.connector),
                    pointer,
                    client_keys,
                    record.pubkey,
                    self.remote.clone(),
                )
                .await?;
                Ok(Arc::new(client))
            }
        }
    }

    /// End the session and forget it.
    pub async fn logout(&self) -> Result<(), SignerError> {
        let mut active = self.active.lock().await;
        self.end_session(&mut active).await?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Remember a display name for the current user.
    pub async fn set_display_name(&self, name: Option<String>) -> Result<(), SignerError> {
        let mut active = self.active.lock().await;
        let Some(current) = active.as_mut() else {
            return Err(SignerError::Unavailable);
        };
        if let Some(mut record) = self.store.load().await? {
            record.display_name = name.clone();
            self.store.save(&record).await?;
        }
        current.display_name = name;
        Ok(())
    }

    /// The signed-in user, if any.
    pub async fn public_key(&self) -> Option<PublicKey> {
        self.active.lock().await.as_ref().map(|a| a.pubkey)
    }

    /// How the active session signs.
    pub async fn method(&self) -> Option<SignerMethod> {
        self.active.lock().await.as_ref().map(|a| a.method)
    }

    /// Name remembered for the active user.
    pub async fn display_name(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .and_then(|a| a.display_name.clone())
    }

    /// Whether anyone is signed in.
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// The active signer, for handing to code that signs on its own.
    pub async fn signer(&self) -> Option<Arc<dyn SignerPort>> {
        self.active.lock().await.as_ref().map(|a| Arc::clone(&a.signer))
    }

    /// Close the active signer and forget its record. A login that fails
    /// after this leaves nothing to restore.
    async fn end_session(&self, active: &mut Option<Active>) -> Result<(), SignerError> {
        teardown(active).await;
        self.store.clear().await?;
        Ok(())
    }

    /// Sign `draft` with the active signer.
    pub async fn sign_event(&self, draft: UnsignedEvent) -> Result<Event, SignerError> {
        let signer = self.signer().await.ok_or(SignerError::Unavailable)?;
        signer.sign_event(draft).await
    }
}

async fn teardown(active: &mut Option<Active>) {
    if let Some(previous) = active.take() {
        tracing::debug!("Closing {:?} session for {}", previous.method, previous.pubkey);
        previous.signer.close().await;
    }
}
