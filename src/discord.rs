use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::DISCORD_API_BASE;
use crate::reporter;
use crate::types::{DeliveryReceipt, Embed};

const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/sbauch/opensea-discord-bot, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Channel types that accept messages: guild text, announcement, and the
/// three thread kinds.
const TEXT_CHANNEL_TYPES: [u8; 5] = [0, 5, 10, 11, 12];

/// Maximum 429 responses tolerated for a single message.
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Wait used when a 429 carries no usable retry hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("bot token rejected ({0})")]
    Auth(u16),

    #[error("channel {0} not found or not accessible")]
    ChannelNotFound(String),

    #[error("channel {id} is not a text channel (type {kind})")]
    NotTextChannel { id: String, kind: u8 },

    #[error("chat service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat service returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("send to channel {channel_id} rejected with {status}: {body}")]
    Rejected {
        channel_id: String,
        status: u16,
        body: String,
    },

    #[error("send to channel {channel_id} still rate limited after {attempts} attempts")]
    RateLimited { channel_id: String, attempts: u32 },
}

/// Something a formatted message can be posted to.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, embed: &Embed) -> Result<DeliveryReceipt, DeliveryError>;
}

/// The two resolved destination channels.
pub struct Channels<S> {
    pub sales: S,
    pub listings: S,
}

/// Opens a chat session and resolves the sales and listings channels.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    type Sink: MessageSink;

    async fn open(
        &self,
        token: &str,
        sales_channel_id: &str,
        listings_channel_id: &str,
    ) -> Result<Channels<Self::Sink>, SessionError>;
}

// ---------------------------------------------------------------------------
// Discord REST
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BotUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
}

/// Authenticated Discord session.
#[derive(Clone)]
pub struct DiscordSession {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
    bot_id: String,
    bot_name: String,
}

/// A resolved, text-capable Discord channel.
///
/// Sends to one channel go out one at a time and respect the route's rate
/// limit bucket; concurrent callers queue on `next_send`.
#[derive(Clone)]
pub struct DiscordChannel {
    session: DiscordSession,
    id: String,
    name: Option<String>,
    /// Earliest instant the next send may start (bucket exhausted until then).
    next_send: Arc<Mutex<Option<Instant>>>,
}

impl DiscordSession {
    /// Authenticate with a bot token; fails with [`SessionError::Auth`] when
    /// the token is rejected.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, SessionError> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let auth_header = format!("Bot {token}");

        let resp = client
            .get(format!("{base_url}/users/@me"))
            .header(reqwest::header::AUTHORIZATION, &auth_header)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SessionError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            return Err(SessionError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let user: BotUser = resp.json().await?;
        Ok(Self {
            client,
            base_url,
            auth_header,
            bot_id: user.id,
            bot_name: user.username,
        })
    }

    /// Look up a channel by ID and check it can receive messages.
    pub async fn resolve_channel(&self, id: &str) -> Result<DiscordChannel, SessionError> {
        let resp = self
            .client
            .get(format!("{}/channels/{id}", self.base_url))
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            return Err(SessionError::ChannelNotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(SessionError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let info: ChannelInfo = resp.json().await?;
        ensure_text_channel(&info)?;
        Ok(DiscordChannel {
            session: self.clone(),
            id: info.id,
            name: info.name,
            next_send: Arc::new(Mutex::new(None)),
        })
    }
}

fn ensure_text_channel(info: &ChannelInfo) -> Result<(), SessionError> {
    if TEXT_CHANNEL_TYPES.contains(&info.kind) {
        Ok(())
    } else {
        Err(SessionError::NotTextChannel {
            id: info.id.clone(),
            kind: info.kind,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// How long a 429 asks us to wait: the body's `retry_after`, else the
/// `Retry-After` header, else [`DEFAULT_RETRY_AFTER`].
fn retry_delay(headers: &HeaderMap, body: &str) -> Duration {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .map(|b| b.retry_after)
        .or_else(|| header_secs(headers, "retry-after"))
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Wait until the bucket resets when a response reports it exhausted.
fn bucket_wait(headers: &HeaderMap) -> Option<Duration> {
    let remaining = header_secs(headers, "x-ratelimit-remaining")?;
    if remaining > 0.0 {
        return None;
    }
    header_secs(headers, "x-ratelimit-reset-after")
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn header_secs(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl MessageSink for DiscordChannel {
    async fn send(&self, embed: &Embed) -> Result<DeliveryReceipt, DeliveryError> {
        let session = &self.session;
        let payload = json!({ "embeds": [embed] });
        let mut next_send = self.next_send.lock().await;
        let mut rate_limited = 0;

        loop {
            if let Some(at) = next_send.take() {
                tokio::time::sleep_until(at).await;
            }

            let resp = session
                .client
                .post(format!("{}/channels/{}/messages", session.base_url, self.id))
                .header(reqwest::header::AUTHORIZATION, &session.auth_header)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .json(&payload)
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                rate_limited += 1;
                let headers = resp.headers().clone();
                let body = resp.text().await.unwrap_or_default();
                if rate_limited > MAX_RATE_LIMIT_RETRIES {
                    return Err(DeliveryError::RateLimited {
                        channel_id: self.id.clone(),
                        attempts: rate_limited,
                    });
                }
                let delay = retry_delay(&headers, &body);
                warn!(
                    "Rate limited on channel {} (attempt {rate_limited}/{MAX_RATE_LIMIT_RETRIES}), retrying in {delay:?}",
                    self.id
                );
                *next_send = Some(Instant::now() + delay);
                continue;
            }
            if !status.is_success() {
                return Err(DeliveryError::Rejected {
                    channel_id: self.id.clone(),
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }

            if let Some(wait) = bucket_wait(resp.headers()) {
                *next_send = Some(Instant::now() + wait);
            }
            let receipt: DeliveryReceipt = resp.json().await?;
            debug!("Posted message {} to channel {}", receipt.message_id, receipt.channel_id);
            return Ok(receipt);
        }
    }
}

/// Connects to Discord over REST.
#[derive(Debug, Clone)]
pub struct DiscordConnector {
    base_url: String,
}

impl Default for DiscordConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordConnector {
    pub fn new() -> Self {
        Self::with_base_url(DISCORD_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChatConnector for DiscordConnector {
    type Sink = DiscordChannel;

    async fn open(
        &self,
        token: &str,
        sales_channel_id: &str,
        listings_channel_id: &str,
    ) -> Result<Channels<DiscordChannel>, SessionError> {
        info!("Authenticating with Discord...");
        let session = DiscordSession::connect(&self.base_url, token).await?;
        info!("Logged in as {} ({})", session.bot_name, session.bot_id);

        let sales = session.resolve_channel(sales_channel_id).await?;
        let listings = session.resolve_channel(listings_channel_id).await?;
        info!(
            "Resolved channels: sales={} listings={}",
            sales.name.as_deref().unwrap_or(sales.id.as_str()),
            listings.name.as_deref().unwrap_or(listings.id.as_str()),
        );

        Ok(Channels { sales, listings })
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Prints messages to stdout instead of posting them.
#[derive(Debug, Clone)]
pub struct StdoutChannel {
    pub label: String,
}

#[async_trait]
impl MessageSink for StdoutChannel {
    async fn send(&self, embed: &Embed) -> Result<DeliveryReceipt, DeliveryError> {
        reporter::report_message(&self.label, embed);
        Ok(DeliveryReceipt {
            message_id: "dry-run".to_string(),
            channel_id: self.label.clone(),
        })
    }
}

/// Connector for `--dry-run`: no network, channels labelled by their IDs.
#[derive(Debug, Clone, Default)]
pub struct DryRunConnector;

#[async_trait]
impl ChatConnector for DryRunConnector {
    type Sink = StdoutChannel;

    async fn open(
        &self,
        _token: &str,
        sales_channel_id: &str,
        listings_channel_id: &str,
    ) -> Result<Channels<StdoutChannel>, SessionError> {
        info!("Dry run: messages will be printed, not posted");
        Ok(Channels {
            sales: StdoutChannel {
                label: format!("sales:{sales_channel_id}"),
            },
            listings: StdoutChannel {
                label: format!("listings:{listings_channel_id}"),
            },
        })
    }
}
