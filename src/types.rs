use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Wei per ether, as a decimal scale.
const WEI_DECIMALS: u32 = 18;

// ---------------------------------------------------------------------------
// Marketplace events
// ---------------------------------------------------------------------------

/// A decoded entry of the OpenSea events feed.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetEvent {
    /// `event_type == "successful"`
    Sale(SaleEvent),
    /// `event_type == "created"`
    Listing(ListingEvent),
    /// Any other discriminator; carried so it can be reported and skipped.
    Other { event_type: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SaleEvent {
    pub asset: Asset,
    /// Sale price in ether (converted from wei at decode time).
    #[serde(default, deserialize_with = "wei_to_ether")]
    pub total_price: Decimal,
    pub winner_account: Account,
    pub seller: Account,
    #[serde(deserialize_with = "utc_timestamp")]
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListingEvent {
    pub asset: Asset,
    /// Starting price in ether (converted from wei at decode time).
    #[serde(default, deserialize_with = "wei_to_ether")]
    pub starting_price: Decimal,
    pub seller: Account,
    #[serde(deserialize_with = "utc_timestamp")]
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub token_id: String,
    pub permalink: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A marketplace account (buyer, seller).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    pub address: String,
    #[serde(default)]
    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountUser {
    #[serde(default)]
    pub username: Option<String>,
}

impl AssetEvent {
    /// Decode one raw feed entry, validating the discriminator and the nested
    /// fields its variant needs.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let event_type = value
            .get("event_type")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                <serde_json::Error as serde::de::Error>::missing_field("event_type")
            })?;

        match event_type.as_str() {
            "successful" => Ok(Self::Sale(serde_json::from_value(value)?)),
            "created" => Ok(Self::Listing(serde_json::from_value(value)?)),
            _ => Ok(Self::Other { event_type }),
        }
    }
}

fn wei_to_ether<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(Decimal::ZERO);
    };
    let wei: u128 = raw
        .trim()
        .parse()
        .map_err(|_| D::Error::custom(format!("invalid wei amount '{raw}'")))?;
    let wei = i128::try_from(wei)
        .map_err(|_| D::Error::custom(format!("wei amount out of range '{raw}'")))?;
    Decimal::try_from_i128_with_scale(wei, WEI_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|_| D::Error::custom(format!("wei amount out of range '{raw}'")))
}

/// Feed timestamps are UTC without a zone suffix, e.g. `2021-08-25T19:04:58.123456`.
fn utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = String::deserialize(deserializer)?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| D::Error::custom(format!("invalid created_date '{raw}'")))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid token_id {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Sale,
    Listing,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Listing => "listing",
        }
    }
}

/// A formatted message routed to the channel matching its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedMessage {
    pub kind: MessageKind,
    pub embed: Embed,
}

/// Discord rich embed, serialized as the REST API expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub color: u32,
    pub author: EmbedAuthor,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub icon_url: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Acknowledgement of a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeliveryReceipt {
    #[serde(rename = "id")]
    pub message_id: String,
    pub channel_id: String,
}

/// Result of handling one feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sale(DeliveryReceipt),
    Listing(DeliveryReceipt),
    /// Unrecognized event type; nothing was sent.
    Skipped,
}

/// Everything one run did, in submission order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// `(sales, listings, skipped)`
    pub fn counts(&self) -> (usize, usize, usize) {
        self.outcomes
            .iter()
            .fold((0, 0, 0), |(s, l, k), outcome| match outcome {
                Outcome::Sale(_) => (s + 1, l, k),
                Outcome::Listing(_) => (s, l + 1, k),
                Outcome::Skipped => (s, l, k + 1),
            })
    }
}
