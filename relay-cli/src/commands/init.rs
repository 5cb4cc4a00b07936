//! Write a default configuration.

use anyhow::{Context, Result};
use relay_client::ClientConfig;
use std::path::Path;

use crate::config::config_path;

/// Run the init command.
pub async fn run(data_dir: &Path, force: bool) -> Result<()> {
    let path = config_path(data_dir);

    // Check if already initialized
    if !force && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let config = ClientConfig::default();
    config.save(&path).context("Failed to write config")?;

    println!("Config written to {}", path.display());
    println!();
    println!("  Relays:");
    for relay in &config.relays {
        println!("    {}", relay);
    }
    println!();
    println!("Next steps:");
    println!("  1. Sign in with a signer app: tunecast login --connect");
    println!("  2. Or with a key:              tunecast login --key");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_writes_default_config() {
        let dir = tempdir().unwrap();
        run(dir.path(), false).await.unwrap();

        let loaded = ClientConfig::load(&config_path(dir.path())).unwrap();
        assert_eq!(loaded, ClientConfig::default());
    }

    #[tokio::test]
    async fn init_refuses_to_overwrite() {
        let dir = tempdir().unwrap();

        // First init should succeed
        run(dir.path(), false).await.unwrap();

        // Second init should fail
        assert!(run(dir.path(), false).await.is_err());

        // Unless forced
        run(dir.path(), true).await.unwrap();
    }
}
