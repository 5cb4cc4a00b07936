//! Show the stored session.

use anyhow::{Context, Result};
use relay_client::{FileSessionStore, SessionStore, SignerMethod};
use std::path::Path;

/// Run the whoami command. Reads `session.json` only; nothing is contacted.
pub async fn run(data_dir: &Path) -> Result<()> {
    let record = FileSessionStore::new(data_dir)
        .load()
        .await
        .context("Failed to read session")?;

    let Some(record) = record else {
        println!("Not logged in.");
        println!();
        println!("Run 'tunecast login --connect' or 'tunecast login --key' to sign in.");
        return Ok(());
    };

    println!("Public key: {}", record.pubkey);
    if let Some(name) = &record.display_name {
        println!("Name:       {}", name);
    }
    match (record.method, &record.bunker) {
        (SignerMethod::Local, _) => println!("Signer:     local key"),
        (SignerMethod::Remote, Some(bunker)) => {
            println!("Signer:     remote ({})", bunker.remote_pubkey);
            for relay in &bunker.relays {
                println!("  via {}", relay);
            }
        }
        (SignerMethod::Remote, None) => println!("Signer:     remote"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_client::PersistedSession;
    use relay_types::Keys;
    use tempfile::tempdir;

    #[tokio::test]
    async fn whoami_without_login() {
        let dir = tempdir().unwrap();
        // Should succeed but show "not logged in"
        assert!(run(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn whoami_with_session() {
        let dir = tempdir().unwrap();
        let record = PersistedSession {
            pubkey: Keys::generate().public_key(),
            display_name: Some("Host".into()),
            method: SignerMethod::Local,
            bunker: None,
            client_secret_key: None,
        };
        FileSessionStore::new(dir.path()).save(&record).await.unwrap();

        assert!(run(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn whoami_with_corrupt_session_fails() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "{").unwrap();

        assert!(run(dir.path()).await.is_err());
    }
}
