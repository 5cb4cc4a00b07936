//! Fetch events from the relays.

use anyhow::{Context, Result};
use relay_client::{ClientConfig, RelayClient};
use relay_types::{Event, Filter, PublicKey};

/// Build a filter from command-line arguments.
pub fn filter(
    authors: &[String],
    kinds: &[u32],
    ids: &[String],
    since: Option<u64>,
    until: Option<u64>,
    limit: Option<usize>,
) -> Result<Filter> {
    let mut filter = Filter::new();
    for author in authors {
        let pubkey = PublicKey::from_hex(author)
            .with_context(|| format!("Invalid author public key {}", author))?;
        filter = filter.author(pubkey);
    }
    for kind in kinds {
        filter = filter.kind(*kind);
    }
    for id in ids {
        filter = filter.id(id.as_str());
    }
    if let Some(since) = since {
        filter = filter.since(since);
    }
    if let Some(until) = until {
        filter = filter.until(until);
    }
    if let Some(limit) = limit {
        filter = filter.limit(limit);
    }
    Ok(filter)
}

/// Run the query command.
pub async fn run(config: &ClientConfig, filter: &Filter, latest: bool, json: bool) -> Result<()> {
    let client = RelayClient::from_config(config);
    let (mut events, reports) = client.query_detailed(filter).await;
    if latest {
        events = relay_core::latest_by_identity(events);
    }

    for report in &reports {
        if let Some(error) = &report.error {
            tracing::warn!("{}: {}", report.url, error);
        }
    }

    if json {
        for event in &events {
            println!("{}", event.to_json()?);
        }
        return Ok(());
    }

    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }
    for event in &events {
        print_event(event);
    }
    println!(
        "{} events from {}/{} relays",
        events.len(),
        reports.iter().filter(|r| r.completed).count(),
        reports.len()
    );
    Ok(())
}

fn print_event(event: &Event) {
    println!("{}  kind {}  at {}", event.id(), event.kind(), event.created_at());
    println!("  by {}", event.pubkey());
    for tag in event.tags() {
        println!("  [{}]", tag.0.join(", "));
    }
    println!("  {}", preview(event.content(), 160));
    println!();
}

/// First line of `content`, cut to `max` characters.
fn preview(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    let mut out: String = line.chars().take(max).collect();
    if out.len() < line.len() || content.lines().nth(1).is_some() {
        out.push_str(" …");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::Keys;

    #[test]
    fn filter_collects_every_field() {
        let pk = Keys::generate().public_key();
        let f = filter(
            &[pk.to_hex()],
            &[1, 30078],
            &["ab".repeat(32)],
            Some(10),
            Some(20),
            Some(5),
        )
        .unwrap();

        assert_eq!(f.authors, Some(vec![pk]));
        assert_eq!(f.kinds, Some(vec![1, 30078]));
        assert_eq!(f.ids, Some(vec!["ab".repeat(32)]));
        assert_eq!((f.since, f.until, f.limit), (Some(10), Some(20), Some(5)));
    }

    #[test]
    fn bad_author_is_rejected() {
        assert!(filter(&["xyz".into()], &[], &[], None, None, None).is_err());
    }

    #[test]
    fn preview_cuts_long_and_multiline_content() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc …");
        assert_eq!(preview("one\ntwo", 10), "one …");
        assert_eq!(preview("", 10), "");
    }
}
