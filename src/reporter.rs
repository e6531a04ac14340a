use serde::Serialize;
use tracing::{error, info};

use crate::types::{Embed, RunReport};

/// Process exit status for a completed run, including one with nothing to post.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit status for any failure.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Serialize)]
struct DryRunLine<'a> {
    channel: &'a str,
    embed: &'a Embed,
}

/// Emit a message that would have been posted as a single JSON line to stdout.
pub fn report_message(channel: &str, embed: &Embed) {
    if let Ok(json) = render_message(channel, embed) {
        println!("{json}");
    }
}

fn render_message(channel: &str, embed: &Embed) -> serde_json::Result<String> {
    serde_json::to_string(&DryRunLine { channel, embed })
}

/// One-line summary of a finished run.
pub fn run_summary(report: &RunReport) -> String {
    if report.is_empty() {
        return "No recent sales".to_string();
    }
    let (sales, listings, skipped) = report.counts();
    format!("Done: {sales} sale(s), {listings} listing(s), {skipped} skipped")
}

/// Log the run result and map it to the process exit status.
pub fn exit_status(result: &anyhow::Result<RunReport>) -> u8 {
    match result {
        Ok(report) => {
            info!("{}", run_summary(report));
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryReceipt, EmbedAuthor, EmbedField, Outcome};
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};

    #[test]
    fn message_line_shape() {
        let embed = Embed {
            title: "Cool Cat #42".into(),
            url: "https://p/42".into(),
            color: 0x00ff99,
            author: EmbedAuthor {
                name: "OpenSea Listing".into(),
                icon_url: "https://icon".into(),
                url: "https://author".into(),
            },
            fields: vec![EmbedField { name: "Seller".into(), value: "bob".into() }],
            image: None,
            timestamp: Utc.with_ymd_and_hms(2021, 8, 25, 19, 4, 58).unwrap(),
        };
        let line = render_message("listings:222", &embed).unwrap();
        assert!(!line.contains('\n'));
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["channel"], json!("listings:222"));
        assert_eq!(v["embed"]["title"], json!("Cool Cat #42"));
        assert_eq!(v["embed"]["fields"][0]["value"], json!("bob"));
    }

    // ── run result ─────────────────────────────────────────────────

    fn receipt() -> DeliveryReceipt {
        DeliveryReceipt {
            message_id: "1".into(),
            channel_id: "9".into(),
        }
    }

    #[test]
    fn empty_run_says_no_recent_sales() {
        let result = Ok(RunReport::default());
        assert_eq!(run_summary(result.as_ref().unwrap()), "No recent sales");
        assert_eq!(exit_status(&result), EXIT_SUCCESS);
    }

    #[test]
    fn non_empty_run_succeeds_with_counts() {
        let report = RunReport {
            outcomes: vec![
                Outcome::Listing(receipt()),
                Outcome::Sale(receipt()),
                Outcome::Sale(receipt()),
                Outcome::Skipped,
            ],
        };
        assert_eq!(
            run_summary(&report),
            "Done: 2 sale(s), 1 listing(s), 1 skipped"
        );
        assert_eq!(exit_status(&Ok(report)), EXIT_SUCCESS);
    }

    #[test]
    fn only_skipped_events_still_succeed() {
        let report = RunReport {
            outcomes: vec![Outcome::Skipped],
        };
        assert_eq!(run_summary(&report), "Done: 0 sale(s), 0 listing(s), 1 skipped");
        assert_eq!(exit_status(&Ok(report)), EXIT_SUCCESS);
    }

    #[test]
    fn error_exits_with_failure() {
        let result: anyhow::Result<RunReport> = Err(anyhow::anyhow!("DISCORD_BOT_TOKEN not set"));
        assert_eq!(exit_status(&result), EXIT_FAILURE);
    }
}
