//! CLI command implementations.

pub mod delete;
pub mod init;
pub mod keygen;
pub mod login;
pub mod logout;
pub mod profile;
pub mod publish;
pub mod query;
pub mod whoami;

use relay_client::{PublishOutcome, PublishStatus};

/// Print per-relay results; fail if no relay accepted.
pub fn report_publish(event_id: &str, outcome: &PublishOutcome) -> anyhow::Result<()> {
    for result in &outcome.results {
        let mark = if result.accepted { "ok" } else { "FAILED" };
        if result.message.is_empty() {
            println!("  [{}] {}", mark, result.url);
        } else {
            println!("  [{}] {} ({})", mark, result.url, result.message);
        }
    }
    match outcome.status() {
        PublishStatus::Accepted | PublishStatus::PartialFailure => {
            println!(
                "Published {} to {}/{} relays",
                event_id,
                outcome.success_count,
                outcome.results.len()
            );
            Ok(())
        }
        PublishStatus::Failed => anyhow::bail!("No relay accepted event {}", event_id),
    }
}
