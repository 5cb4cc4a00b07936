//! Show or update a profile.

use anyhow::{Context, Result};
use relay_client::{ClientConfig, RelayClient};
use relay_core::{EventBuilder, Profile};
use relay_types::PublicKey;
use std::path::Path;

use crate::commands::report_publish;
use crate::session;

/// Fields to change; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct Edits {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
}

impl Edits {
    /// Nothing to change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.display_name.is_none()
            && self.about.is_none()
            && self.picture.is_none()
    }

    /// Apply onto `profile`. An empty string clears the field.
    fn apply(self, profile: &mut Profile) {
        let set = |field: &mut Option<String>, value: Option<String>| {
            if let Some(value) = value {
                *field = Some(value).filter(|v| !v.is_empty());
            }
        };
        set(&mut profile.name, self.name);
        set(&mut profile.display_name, self.display_name);
        set(&mut profile.about, self.about);
        set(&mut profile.picture, self.picture);
    }
}

/// Print the profile of `pubkey`, or of the stored session's user.
pub async fn show(data_dir: &Path, config: &ClientConfig, pubkey: Option<&str>) -> Result<()> {
    let pubkey = match pubkey {
        Some(hex) => PublicKey::from_hex(hex).context("Invalid public key")?,
        None => session::stored_user(data_dir)
            .await?
            .context("Not logged in. Pass a public key or run 'tunecast login'.")?,
    };

    let client = RelayClient::from_config(config);
    match client.fetch_profile(pubkey).await {
        Some(profile) => print_profile(&pubkey, &profile),
        None => println!("No profile found for {}", pubkey),
    }
    Ok(())
}

/// Publish the signed-in user's profile with `edits` applied.
///
/// Starts from the newest profile on the relays so unedited fields survive.
pub async fn update(data_dir: &Path, config: &ClientConfig, edits: Edits) -> Result<()> {
    let manager = session::manager(data_dir, config);
    let pubkey = session::restore(data_dir, &manager).await?;
    let signer = manager
        .signer()
        .await
        .context("Session ended unexpectedly")?;

    let client = RelayClient::from_config(config);
    let mut profile = client.fetch_profile(pubkey).await.unwrap_or_default();
    edits.apply(&mut profile);

    let draft = EventBuilder::metadata(&profile)?;
    let result = client.sign_and_publish(signer.as_ref(), draft).await;
    signer.close().await;

    let (event, outcome) = result.context("Signing failed")?;
    print_profile(&pubkey, &profile);
    report_publish(event.id(), &outcome)
}

fn print_profile(pubkey: &PublicKey, profile: &Profile) {
    println!("Profile of {}", pubkey);
    let fields = [
        ("Name", &profile.name),
        ("Display name", &profile.display_name),
        ("About", &profile.about),
        ("Picture", &profile.picture),
        ("NIP-05", &profile.nip05),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:<13} {}", format!("{}:", label), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_keep_untouched_fields() {
        let mut profile = Profile {
            name: Some("old".into()),
            about: Some("about me".into()),
            ..Profile::default()
        };
        Edits {
            name: Some("new".into()),
            picture: Some(String::new()),
            ..Edits::default()
        }
        .apply(&mut profile);

        assert_eq!(profile.name.as_deref(), Some("new"));
        assert_eq!(profile.about.as_deref(), Some("about me"));
        assert_eq!(profile.picture, None);
    }

    #[test]
    fn empty_string_clears_field() {
        let mut profile = Profile {
            about: Some("gone soon".into()),
            ..Profile::default()
        };
        Edits {
            about: Some(String::new()),
            ..Edits::default()
        }
        .apply(&mut profile);
        assert_eq!(profile.about, None);
    }

    #[test]
    fn no_edits_is_empty() {
        assert!(Edits::default().is_empty());
        assert!(!Edits {
            name: Some("x".into()),
            ..Edits::default()
        }
        .is_empty());
    }
}
