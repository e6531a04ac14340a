use rust_decimal::Decimal;
use tracing::error;

use crate::types::{
    Account, Asset, AssetEvent, Embed, EmbedAuthor, EmbedField, EmbedImage, FormattedMessage,
    ListingEvent, MessageKind, SaleEvent,
};
use crate::{
    AUTHOR_ICON_URL, AUTHOR_URL, ETHER_SYMBOL, LISTING_AUTHOR, LISTING_COLOR, SALE_AUTHOR,
    SALE_COLOR,
};

/// Classify a feed page in posting order.
///
/// The feed is assumed newest-first, so the page is reversed to post
/// chronologically. Entries with an unrecognized type map to `None`.
pub fn classify_all(events: Vec<AssetEvent>) -> Vec<Option<FormattedMessage>> {
    events.into_iter().rev().map(classify).collect()
}

/// Map one event to its message, or `None` (with an error log) for event types
/// we don't post.
pub fn classify(event: AssetEvent) -> Option<FormattedMessage> {
    match event {
        AssetEvent::Sale(sale) => Some(FormattedMessage {
            kind: MessageKind::Sale,
            embed: build_sale_embed(&sale),
        }),
        AssetEvent::Listing(listing) => Some(FormattedMessage {
            kind: MessageKind::Listing,
            embed: build_listing_embed(&listing),
        }),
        AssetEvent::Other { event_type } => {
            error!("Don't know how to handle event type => {event_type}");
            None
        }
    }
}

pub fn build_sale_embed(sale: &SaleEvent) -> Embed {
    Embed {
        title: asset_title(&sale.asset),
        url: sale.asset.permalink.clone(),
        color: SALE_COLOR,
        author: author(SALE_AUTHOR),
        fields: vec![
            field("Amount", format_ether(sale.total_price)),
            field("Buyer", account_label(&sale.winner_account)),
            field("Seller", account_label(&sale.seller)),
        ],
        image: asset_image(&sale.asset),
        timestamp: sale.created_date,
    }
}

pub fn build_listing_embed(listing: &ListingEvent) -> Embed {
    Embed {
        title: asset_title(&listing.asset),
        url: listing.asset.permalink.clone(),
        color: LISTING_COLOR,
        author: author(LISTING_AUTHOR),
        fields: vec![
            field("Seller", account_label(&listing.seller)),
            field("Price", format_ether(listing.starting_price)),
        ],
        image: asset_image(&listing.asset),
        timestamp: listing.created_date,
    }
}

/// Format an ether amount for display: `0Ξ`, `1.0Ξ`, `0.25Ξ`.
pub fn format_ether(amount: Decimal) -> String {
    if amount.is_zero() {
        return format!("0{ETHER_SYMBOL}");
    }
    let amount = amount.normalize();
    if amount.fract().is_zero() {
        format!("{amount}.0{ETHER_SYMBOL}")
    } else {
        format!("{amount}{ETHER_SYMBOL}")
    }
}

/// Display name for an account: its username when set, else its address.
pub fn account_label(account: &Account) -> String {
    account
        .user
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .filter(|name| !name.is_empty())
        .unwrap_or(account.address.as_str())
        .to_string()
}

fn asset_title(asset: &Asset) -> String {
    match asset.name.as_deref() {
        Some(name) if !name.is_empty() => format!("{name} #{}", asset.token_id),
        _ => format!("#{}", asset.token_id),
    }
}

fn asset_image(asset: &Asset) -> Option<EmbedImage> {
    asset
        .image_url
        .as_ref()
        .filter(|url| !url.is_empty())
        .map(|url| EmbedImage { url: url.clone() })
}

fn author(name: &str) -> EmbedAuthor {
    EmbedAuthor {
        name: name.to_string(),
        icon_url: AUTHOR_ICON_URL.to_string(),
        url: AUTHOR_URL.to_string(),
    }
}

fn field(name: &str, value: String) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value,
    }
}
