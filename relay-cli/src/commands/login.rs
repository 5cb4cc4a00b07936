//! Sign in.
//!
//! A local login stores the secret key in the data directory so later
//! commands can resume. Remote logins store only the ephemeral client key
//! and the signer's location (in `session.json`).

use anyhow::{Context, Result};
use relay_client::{CancelHandle, ClientConfig, KeyHolder};
use relay_core::NostrConnectUri;
use relay_types::{Keys, PublicKey};
use std::path::Path;
use std::sync::Arc;

use crate::config;
use crate::qr;
use crate::session::{self, Manager};

/// Log in with a secret key read from `path`.
pub async fn with_key_file(
    data_dir: &Path,
    config: &ClientConfig,
    path: &Path,
    name: Option<String>,
) -> Result<()> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let keys = config::parse_secret(&contents)?;
    with_keys(data_dir, config, keys, name).await
}

/// Log in with a secret key typed at a prompt.
pub async fn with_prompt(data_dir: &Path, config: &ClientConfig, name: Option<String>) -> Result<()> {
    let secret = tokio::task::spawn_blocking(|| rpassword::prompt_password("Secret key (hex): "))
        .await
        .context("Prompt task failed")?
        .context("Failed to read secret key")?;
    let keys = config::parse_secret(&secret)?;
    with_keys(data_dir, config, keys, name).await
}

async fn with_keys(
    data_dir: &Path,
    config: &ClientConfig,
    keys: Keys,
    name: Option<String>,
) -> Result<()> {
    let manager = session::manager(data_dir, config);
    let holder: Arc<dyn KeyHolder> = Arc::new(keys.clone());
    let pubkey = manager.login_local(holder, name).await?;
    config::save_key(data_dir, &keys).await?;
    print_logged_in(&pubkey, "local key");
    Ok(())
}

/// Log in through a `bunker://` URI.
pub async fn with_bunker(
    data_dir: &Path,
    config: &ClientConfig,
    uri: &str,
    name: Option<String>,
) -> Result<()> {
    let manager = session::manager(data_dir, config);

    println!("Connecting to remote signer...");
    let pubkey = manager
        .login_with_bunker(uri)
        .await
        .context("Remote signer login failed")?;
    finish_remote(data_dir, &manager, pubkey, name).await
}

/// Log in by showing a `nostrconnect://` URI and waiting for approval.
///
/// Ctrl-C cancels the wait.
pub async fn with_nostrconnect(
    data_dir: &Path,
    config: &ClientConfig,
    name: Option<String>,
) -> Result<()> {
    let manager = session::manager(data_dir, config);

    let cancel = CancelHandle::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let approval_secs = config.remote.approval_timeout_secs;
    let result = manager
        .login_with_nostrconnect(
            &config.relays,
            |uri| present_uri(uri, approval_secs),
            Some(&cancel),
        )
        .await;
    watcher.abort();

    let pubkey = result.context("Remote signer login failed")?;
    finish_remote(data_dir, &manager, pubkey, name).await
}

fn present_uri(uri: &NostrConnectUri, approval_secs: u64) {
    let text = uri.to_uri();
    println!("Scan with your signer app, or paste the URI into it:");
    println!();
    if let Some(lines) = qr::render(&text) {
        for line in lines {
            println!("{}", line);
        }
        println!();
    }
    println!("{}", text);
    println!();
    println!(
        "Waiting up to {}s for approval (Ctrl-C to cancel)...",
        approval_secs
    );
}

async fn finish_remote(
    data_dir: &Path,
    manager: &Manager,
    pubkey: PublicKey,
    name: Option<String>,
) -> Result<()> {
    // A key from an earlier local login no longer belongs to this session
    config::remove_key(data_dir).await?;
    if name.is_some() {
        manager.set_display_name(name).await?;
    }
    print_logged_in(&pubkey, "remote signer");
    // The session is persisted; release the sockets until the next command
    if let Some(signer) = manager.signer().await {
        signer.close().await;
    }
    Ok(())
}

fn print_logged_in(pubkey: &PublicKey, method: &str) {
    println!("Logged in with {}", method);
    println!("  Public key: {}", pubkey);
}
