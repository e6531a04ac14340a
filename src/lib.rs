pub mod api;
pub mod config;
pub mod discord;
pub mod engine;
pub mod executor;
pub mod reporter;
pub mod types;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::api::{EventFeed, EventsQuery};
use crate::config::{ConfigError, Settings};
use crate::discord::ChatConnector;
use crate::types::RunReport;

/// OpenSea REST API base URL (v1 events feed).
pub const OPENSEA_API_BASE: &str = "https://api.opensea.io/api/v1";

/// Discord REST API base URL.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Storefront contract shared by many collections; filtering on it would
/// narrow results to unrelated tokens, so it is never sent as a filter.
pub const SHARED_STOREFRONT_ADDRESS: &str = "0x495f947276749Ce646f68AC8c248420045cb7b5e";

/// Maximum events requested per run (single page).
pub const EVENTS_PAGE_LIMIT: u32 = 100;

/// Default lookback window when `SECONDS` is unset.
pub const DEFAULT_WINDOW_SECS: i64 = 3_600;

/// Embed colors.
pub const SALE_COLOR: u32 = 0x0099ff;
pub const LISTING_COLOR: u32 = 0x00ff99;

/// Author byline shared by every embed.
pub const AUTHOR_ICON_URL: &str = "https://files.readme.io/566c72b-opensea-logomark-full-colored.png";
pub const AUTHOR_URL: &str = "https://github.com/sbauch/opensea-discord-bot";
pub const SALE_AUTHOR: &str = "OpenSea Sale";
pub const LISTING_AUTHOR: &str = "OpenSea Listing";

/// Ether symbol appended to formatted prices.
pub const ETHER_SYMBOL: &str = "\u{039e}";

/// Load settings with `load` and perform one run.
///
/// Configuration is validated before any network call is made.
pub async fn run<L, C, F>(load: L, connector: &C, feed: &F, now: DateTime<Utc>) -> Result<RunReport>
where
    L: FnOnce() -> Result<Settings, ConfigError>,
    C: ChatConnector,
    F: EventFeed,
{
    let settings = load().context("invalid configuration")?;
    run_once(&settings, connector, feed, now).await
}

/// One full run: open the chat session, fetch the recent events window,
/// format and post everything.
///
/// Startup is strictly sequential (authenticate, resolve sales channel,
/// resolve listings channel) and completes before the feed is queried.
pub async fn run_once<C, F>(
    settings: &Settings,
    connector: &C,
    feed: &F,
    now: DateTime<Utc>,
) -> Result<RunReport>
where
    C: ChatConnector,
    F: EventFeed,
{
    let channels = connector
        .open(
            &settings.bot_token,
            &settings.sales_channel_id,
            &settings.listings_channel_id,
        )
        .await
        .context("failed to open chat session")?;

    let query = EventsQuery::for_window(settings, now);
    info!(
        seconds = settings.window_secs,
        occurred_after = query.occurred_after,
        "Fetching events for '{}'",
        query.collection_slug
    );

    let events = feed
        .recent_events(&query)
        .await
        .context("failed to fetch marketplace events")?;

    let messages = engine::classify_all(events);
    let outcomes = executor::dispatch(&channels, messages)
        .await
        .context("failed to deliver message")?;

    Ok(RunReport { outcomes })
}
