//! Session plumbing shared by the commands.

use anyhow::{Context, Result};
use relay_client::{
    ClientConfig, FileSessionStore, KeyHolder, SessionManager, SessionStore, SignerError,
    WsConnector,
};
use relay_types::PublicKey;
use std::path::Path;
use std::sync::Arc;

use crate::config;

/// Session manager over the data directory and real relays.
pub type Manager = SessionManager<FileSessionStore, WsConnector>;

/// A session manager for `data_dir`. Remote signer options come from
/// `config`; `auth_url` challenges are printed for the user to open.
pub fn manager(data_dir: &Path, config: &ClientConfig) -> Manager {
    let remote = config.remote_options().on_auth_url(|url| {
        eprintln!();
        eprintln!("The remote signer asks you to approve this request at:");
        eprintln!("  {}", url);
        eprintln!();
    });
    SessionManager::new(
        FileSessionStore::new(data_dir),
        Arc::new(WsConnector),
        remote,
    )
}

/// Resume the stored session or fail with a hint to log in.
pub async fn restore(data_dir: &Path, manager: &Manager) -> Result<PublicKey> {
    let local = config::load_key(data_dir)
        .await?
        .map(|keys| Arc::new(keys) as Arc<dyn KeyHolder>);

    match manager.restore(local).await {
        Ok(Some(pubkey)) => Ok(pubkey),
        Ok(None) => anyhow::bail!("Not logged in. Run 'tunecast login' first."),
        Err(SignerError::IdentityMismatch { expected, actual }) => anyhow::bail!(
            "Signer now reports {} instead of {}. Session cleared; log in again.",
            actual,
            expected
        ),
        Err(e) => Err(e).context("Could not resume session. Log in again."),
    }
}

/// The stored session's user without connecting anywhere.
pub async fn stored_user(data_dir: &Path) -> Result<Option<PublicKey>> {
    let record = FileSessionStore::new(data_dir)
        .load()
        .await
        .context("Failed to read session")?;
    Ok(record.map(|r| r.pubkey))
}
