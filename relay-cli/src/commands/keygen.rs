//! Generate a key pair.

use anyhow::Result;
use relay_types::Keys;
use std::path::Path;

use crate::config::write_secret;

/// Run the keygen command.
pub async fn run(output: Option<&Path>) -> Result<()> {
    let keys = Keys::generate();

    println!("Public key: {}", keys.public_key());
    match output {
        Some(path) => {
            write_secret(path, &keys).await?;
            println!("Secret key written to {}", path.display());
            println!();
            println!("Sign in with: tunecast login --key-file {}", path.display());
        }
        None => {
            println!("Secret key: {}", keys.secret_hex());
            println!();
            println!("Keep the secret key private. Anyone holding it can post as you.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_secret;
    use tempfile::tempdir;

    #[tokio::test]
    async fn keygen_writes_loadable_secret() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("me.key");

        run(Some(&path)).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(parse_secret(&contents).is_ok());
    }
}
