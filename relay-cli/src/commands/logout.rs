//! Sign out.

use anyhow::Result;
use relay_client::ClientConfig;
use std::path::Path;

use crate::config;
use crate::session;

/// Run the logout command: clear `session.json` and the local key.
pub async fn run(data_dir: &Path, config: &ClientConfig) -> Result<()> {
    let who = session::stored_user(data_dir).await.ok().flatten();

    session::manager(data_dir, config).logout().await?;
    config::remove_key(data_dir).await?;

    match who {
        Some(pubkey) => println!("Logged out {}", pubkey),
        None => println!("Not logged in."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_client::{FileSessionStore, SessionStore};
    use relay_types::Keys;
    use tempfile::tempdir;

    #[tokio::test]
    async fn logout_forgets_session_and_key() {
        let dir = tempdir().unwrap();
        let keys = Keys::generate();
        let key_path = dir.path().join("me.key");
        std::fs::write(&key_path, keys.secret_hex()).unwrap();
        let config = ClientConfig::default();
        crate::commands::login::with_key_file(dir.path(), &config, &key_path, None)
            .await
            .unwrap();

        run(dir.path(), &config).await.unwrap();

        assert!(FileSessionStore::new(dir.path()).load().await.unwrap().is_none());
        assert!(config::load_key(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_when_logged_out_is_fine() {
        let dir = tempdir().unwrap();
        run(dir.path(), &ClientConfig::default()).await.unwrap();
    }
}
