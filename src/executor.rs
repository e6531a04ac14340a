use futures_util::future::try_join_all;
use tracing::debug;

use crate::discord::{Channels, DeliveryError, MessageSink};
use crate::types::{FormattedMessage, MessageKind, Outcome};

/// Post every message to the channel matching its kind.
///
/// All sends are started together, in the given order, and joined as a
/// group. The first failure fails the whole dispatch; sends still in flight
/// are dropped. `None` entries produce [`Outcome::Skipped`] without a send.
pub async fn dispatch<S: MessageSink>(
    channels: &Channels<S>,
    messages: Vec<Option<FormattedMessage>>,
) -> Result<Vec<Outcome>, DeliveryError> {
    let sends = messages.into_iter().map(|message| async move {
        let Some(message) = message else {
            return Ok::<_, DeliveryError>(Outcome::Skipped);
        };
        debug!("posting {}", message.kind.label());
        match message.kind {
            MessageKind::Sale => channels.sales.send(&message.embed).await.map(Outcome::Sale),
            MessageKind::Listing => channels
                .listings
                .send(&message.embed)
                .await
                .map(Outcome::Listing),
        }
    });

    try_join_all(sends).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryReceipt, Embed, EmbedAuthor};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records the order in which sends were submitted across both channels.
    #[derive(Clone)]
    struct RecordingSink {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, embed: &Embed) -> Result<DeliveryReceipt, DeliveryError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, embed.title));
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(DeliveryError::Rejected {
                    channel_id: self.name.into(),
                    status: 403,
                    body: "Missing Permissions".into(),
                });
            }
            Ok(DeliveryReceipt {
                message_id: embed.title.clone(),
                channel_id: self.name.into(),
            })
        }
    }

    fn make_channels(fail_sales: bool) -> (Channels<RecordingSink>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = |name, fail| RecordingSink {
            name,
            log: log.clone(),
            fail,
            delay: Duration::from_millis(10),
        };
        let channels = Channels {
            sales: sink("sales", fail_sales),
            listings: sink("listings", false),
        };
        (channels, log)
    }

    fn message(kind: MessageKind, title: &str) -> Option<FormattedMessage> {
        Some(FormattedMessage {
            kind,
            embed: Embed {
                title: title.into(),
                url: String::new(),
                color: 0,
                author: EmbedAuthor {
                    name: String::new(),
                    icon_url: String::new(),
                    url: String::new(),
                },
                fields: vec![],
                image: None,
                timestamp: Utc::now(),
            },
        })
    }

    #[tokio::test]
    async fn routes_and_preserves_submission_order() {
        let (channels, log) = make_channels(false);
        let outcomes = dispatch(
            &channels,
            vec![
                message(MessageKind::Listing, "a"),
                None,
                message(MessageKind::Sale, "b"),
                message(MessageKind::Listing, "c"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            ["listings:a", "sales:b", "listings:c"]
        );
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(&outcomes[0], Outcome::Listing(r) if r.message_id == "a"));
        assert_eq!(outcomes[1], Outcome::Skipped);
        assert!(matches!(&outcomes[2], Outcome::Sale(r) if r.channel_id == "sales"));
        assert!(matches!(&outcomes[3], Outcome::Listing(_)));
    }

    #[tokio::test]
    async fn sends_run_concurrently() {
        let (mut channels, _log) = make_channels(false);
        channels.sales.delay = Duration::from_millis(200);
        channels.listings.delay = Duration::from_millis(200);

        let start = tokio::time::Instant::now();
        let messages = (0..5)
            .map(|i| message(MessageKind::Sale, &i.to_string()))
            .collect();
        dispatch(&channels, messages).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn only_skips_sends_nothing() {
        let (channels, log) = make_channels(false);
        let outcomes = dispatch(&channels, vec![None, None]).await.unwrap();
        assert_eq!(outcomes, [Outcome::Skipped, Outcome::Skipped]);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn any_failure_fails_dispatch() {
        let (channels, _log) = make_channels(true);
        let err = dispatch(
            &channels,
            vec![
                message(MessageKind::Listing, "a"),
                message(MessageKind::Sale, "b"),
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn empty_input() {
        let (channels, _log) = make_channels(false);
        assert!(dispatch(&channels, vec![]).await.unwrap().is_empty());
    }
}
