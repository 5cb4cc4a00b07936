//! Ask relays to delete events.

use anyhow::{Context, Result};
use relay_client::{ClientConfig, RelayClient};
use relay_core::EventBuilder;
use relay_types::UnsignedEvent;
use std::path::Path;

use crate::commands::report_publish;
use crate::session;

/// Build the deletion request, checking ids and coordinates look right.
pub fn draft(ids: &[String], coordinates: &[String], reason: Option<&str>) -> Result<UnsignedEvent> {
    for id in ids {
        if id.len() != 64 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid event id {}", id);
        }
    }
    for coordinate in coordinates {
        let mut parts = coordinate.splitn(3, ':');
        let kind_ok = parts.next().is_some_and(|k| k.parse::<u32>().is_ok());
        if !kind_ok || parts.next().is_none() || parts.next().is_none() {
            anyhow::bail!("Invalid coordinate {} (expected <kind>:<pubkey>:<d>)", coordinate);
        }
    }
    if ids.is_empty() && coordinates.is_empty() {
        anyhow::bail!("Nothing to delete");
    }
    Ok(EventBuilder::deletion(ids, coordinates, reason))
}

/// Run the delete command.
pub async fn run(
    data_dir: &Path,
    config: &ClientConfig,
    ids: &[String],
    coordinates: &[String],
    reason: Option<&str>,
) -> Result<()> {
    let draft = draft(ids, coordinates, reason)?;

    let manager = session::manager(data_dir, config);
    session::restore(data_dir, &manager).await?;
    let signer = manager
        .signer()
        .await
        .context("Session ended unexpectedly")?;

    let client = RelayClient::from_config(config);
    let result = client.sign_and_publish(signer.as_ref(), draft).await;
    signer.close().await;

    let (event, outcome) = result.context("Signing failed")?;
    println!("Requested deletion of {} item(s)", ids.len() + coordinates.len());
    report_publish(event.id(), &outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::kind;
    use relay_types::Tag;

    #[test]
    fn draft_tags_ids_and_coordinates() {
        let id = "ab".repeat(32);
        let coordinate = format!("30078:{}:podcast:feed:guid-1", "cd".repeat(32));

        let draft = draft(&[id.clone()], &[coordinate.clone()], Some("typo")).unwrap();

        assert_eq!(draft.kind, kind::DELETION);
        assert_eq!(draft.content, "typo");
        assert!(draft.tags.contains(&Tag::new(["e", id.as_str()])));
        assert!(draft.tags.contains(&Tag::new(["a", coordinate.as_str()])));
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!(draft(&["abc".into()], &[], None).is_err());
        assert!(draft(&[], &["notakind:pk:d".into()], None).is_err());
        assert!(draft(&[], &["30078:pk".into()], None).is_err());
        assert!(draft(&[], &[], None).is_err());
    }
}
