use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::types::AssetEvent;
use crate::{EVENTS_PAGE_LIMIT, OPENSEA_API_BASE, SHARED_STOREFRONT_ADDRESS};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("events request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("events API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed event at index {index}: {source}")]
    Malformed {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Filter for one page of the OpenSea events feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsQuery {
    /// Unix seconds; only events after this instant are returned.
    pub occurred_after: i64,
    pub collection_slug: String,
    /// Omitted for the shared storefront contract.
    pub asset_contract_address: Option<String>,
    pub limit: u32,
}

impl EventsQuery {
    /// Build the query for the lookback window ending at `now`.
    pub fn for_window(settings: &Settings, now: DateTime<Utc>) -> Self {
        let asset_contract_address = settings
            .contract_address
            .clone()
            .filter(|addr| addr != SHARED_STOREFRONT_ADDRESS);

        Self {
            occurred_after: now.timestamp() - settings.window_secs,
            collection_slug: settings.collection_slug.clone(),
            asset_contract_address,
            limit: EVENTS_PAGE_LIMIT,
        }
    }

    /// Query string pairs, in the order the feed documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("offset", "0".to_string()),
            ("only_opensea", "false".to_string()),
            ("occurred_after", self.occurred_after.to_string()),
            ("collection_slug", self.collection_slug.clone()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(addr) = &self.asset_contract_address {
            params.push(("asset_contract_address", addr.clone()));
        }
        params
    }
}

/// Source of recent marketplace events.
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Fetch one page of events, in the order the feed returns them.
    async fn recent_events(&self, query: &EventsQuery) -> Result<Vec<AssetEvent>, FetchError>;
}

/// HTTP client for the OpenSea events feed.
#[derive(Clone)]
pub struct OpenSeaClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for OpenSeaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenSeaClient {
    pub fn new() -> Self {
        Self::with_base_url(OPENSEA_API_BASE)
    }

    /// Point the client at a different API root (mirror, local stub).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EventFeed for OpenSeaClient {
    async fn recent_events(&self, query: &EventsQuery) -> Result<Vec<AssetEvent>, FetchError> {
        let url = format!("{}/events", self.base_url);
        let resp = self.client.get(&url).query(&query.params()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        let events = decode_events(body)?;
        debug!("Fetched {} events", events.len());
        Ok(events)
    }
}

/// Decode the `asset_events` list of a feed response.
///
/// A missing or non-list `asset_events` is treated as an empty page; an entry
/// that is present but malformed fails the whole page.
pub fn decode_events(body: Value) -> Result<Vec<AssetEvent>, FetchError> {
    let raw = match body {
        Value::Object(mut map) => match map.remove("asset_events") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => {
                warn!("Response has no asset_events list; treating as empty");
                return Ok(Vec::new());
            }
            Some(other) => {
                warn!("asset_events is not a list ({other}); treating as empty");
                return Ok(Vec::new());
            }
        },
        _ => {
            warn!("Response is not a JSON object; treating as empty");
            return Ok(Vec::new());
        }
    };

    raw.into_iter()
        .enumerate()
        .map(|(index, item)| {
            AssetEvent::from_value(item).map_err(|source| FetchError::Malformed { index, source })
        })
        .collect()
}
