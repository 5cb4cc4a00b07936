//! Files tunecast keeps in its data directory.
//!
//! - `config.toml`: relay list and timeouts ([`ClientConfig`])
//! - `session.json`: the persisted session (written by the client library)
//! - `identity.key`: hex secret key for local logins

use anyhow::{Context, Result};
use relay_client::ClientConfig;
use relay_core::validate_relay_url;
use relay_types::Keys;
use std::path::{Path, PathBuf};

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Local secret key file name inside the data directory.
pub const KEY_FILE: &str = "identity.key";

/// Path of `config.toml`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load `config.toml`, with `relays` (if any) replacing the configured set.
pub fn load(data_dir: &Path, relays: &[String]) -> Result<ClientConfig> {
    let mut config = ClientConfig::load(&config_path(data_dir))?;
    if !relays.is_empty() {
        for relay in relays {
            validate_relay_url(relay).with_context(|| format!("Invalid relay {}", relay))?;
        }
        config.relays = relays.to_vec();
    }
    if config.relays.is_empty() {
        anyhow::bail!("No relays configured. Pass --relay or edit {}", CONFIG_FILE);
    }
    Ok(config)
}

/// Parse a hex secret key, tolerating surrounding whitespace.
pub fn parse_secret(text: &str) -> Result<Keys> {
    Keys::from_secret_hex(text.trim()).context("Invalid secret key (expected 64 hex characters)")
}

/// Store the local secret key.
pub async fn save_key(data_dir: &Path, keys: &Keys) -> Result<()> {
    write_secret(&data_dir.join(KEY_FILE), keys).await
}

/// The stored local secret key, if any.
pub async fn load_key(data_dir: &Path) -> Result<Option<Keys>> {
    let path = data_dir.join(KEY_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => parse_secret(&contents).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("Failed to read local key"),
    }
}

/// Delete the stored local secret key. Missing is fine.
pub async fn remove_key(data_dir: &Path) -> Result<()> {
    match tokio::fs::remove_file(data_dir.join(KEY_FILE)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context("Failed to remove local key"),
    }
}

/// Write `keys`' secret as hex to `path`, owner-readable only.
pub async fn write_secret(path: &Path, keys: &Keys) -> Result<()> {
    tokio::fs::write(path, format!("{}\n", keys.secret_hex()))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    set_file_permissions_0600(path).await
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
