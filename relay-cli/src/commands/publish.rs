//! Sign and publish an event.

use anyhow::{Context, Result};
use relay_client::{ClientConfig, RelayClient};
use relay_core::EventBuilder;
use relay_types::{Tag, UnsignedEvent};
use std::path::Path;

use crate::commands::report_publish;
use crate::session;

/// Build the draft from command-line arguments.
///
/// With `feed`, the content is published as that feed (`title` required);
/// otherwise as an event of `kind` carrying `tags`.
pub fn draft(
    content: String,
    kind: u32,
    tags: &[String],
    feed: Option<&str>,
    title: Option<&str>,
) -> Result<UnsignedEvent> {
    if let Some(guid) = feed {
        let title = title.context("--feed needs --title")?;
        let mut draft = EventBuilder::feed(guid, title, content);
        for tag in tags {
            draft = draft.tag(parse_tag(tag)?);
        }
        return Ok(draft);
    }
    let tags = tags
        .iter()
        .map(|t| parse_tag(t))
        .collect::<Result<Vec<_>>>()?;
    Ok(EventBuilder::custom(kind, content, tags))
}

/// `name=value[,value...]` as a tag.
fn parse_tag(arg: &str) -> Result<Tag> {
    let (name, values) = arg
        .split_once('=')
        .with_context(|| format!("Tag '{}' is not name=value", arg))?;
    if name.is_empty() {
        anyhow::bail!("Tag '{}' has an empty name", arg);
    }
    let parts = std::iter::once(name).chain(values.split(','));
    Ok(Tag::new(parts))
}

/// Run the publish command.
pub async fn run(data_dir: &Path, config: &ClientConfig, draft: UnsignedEvent) -> Result<()> {
    let manager = session::manager(data_dir, config);
    session::restore(data_dir, &manager).await?;
    let signer = manager
        .signer()
        .await
        .context("Session ended unexpectedly")?;

    let client = RelayClient::from_config(config);
    println!("Publishing to {} relays...", client.relays().len());
    let result = client.sign_and_publish(signer.as_ref(), draft).await;
    signer.close().await;

    let (event, outcome) = result.context("Signing failed")?;
    report_publish(event.id(), &outcome)
}
