use thiserror::Error;

use crate::DEFAULT_WINDOW_SECS;

pub const ENV_BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";
pub const ENV_SALES_CHANNEL: &str = "DISCORD_SALES_CHANNEL_ID";
pub const ENV_LISTINGS_CHANNEL: &str = "DISCORD_LISTINGS_CHANNEL_ID";
pub const ENV_COLLECTION_SLUG: &str = "COLLECTION_SLUG";
pub const ENV_CONTRACT_ADDRESS: &str = "CONTRACT_ADDRESS";
pub const ENV_SECONDS: &str = "SECONDS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingVar(&'static str),

    #[error("SECONDS must be a non-negative integer, got '{0}'")]
    InvalidSeconds(String),
}

/// Run configuration, read once from the environment at startup.
#[derive(Clone)]
pub struct Settings {
    /// Discord bot token.
    pub bot_token: String,
    pub sales_channel_id: String,
    pub listings_channel_id: String,
    /// OpenSea collection slug to watch.
    pub collection_slug: String,
    /// Contract filter; `None` when unset.
    pub contract_address: Option<String>,
    /// Lookback window in seconds.
    pub window_secs: i64,
}

// Keep the token out of debug output.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("sales_channel_id", &self.sales_channel_id)
            .field("listings_channel_id", &self.listings_channel_id)
            .field("collection_slug", &self.collection_slug)
            .field("contract_address", &self.contract_address)
            .field("window_secs", &self.window_secs)
            .finish()
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// The chat-service variables are checked first, in a fixed order, so the
    /// reported variable is deterministic when several are missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::MissingVar(name));

        let bot_token = require(ENV_BOT_TOKEN)?;
        let sales_channel_id = require(ENV_SALES_CHANNEL)?;
        let listings_channel_id = require(ENV_LISTINGS_CHANNEL)?;
        let collection_slug = require(ENV_COLLECTION_SLUG)?;
        let contract_address = get(ENV_CONTRACT_ADDRESS);

        let window_secs = match get(ENV_SECONDS) {
            Some(raw) => parse_seconds(&raw)?,
            None => DEFAULT_WINDOW_SECS,
        };

        Ok(Self {
            bot_token,
            sales_channel_id,
            listings_channel_id,
            collection_slug,
            contract_address,
            window_secs,
        })
    }
}

fn parse_seconds(raw: &str) -> Result<i64, ConfigError> {
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs >= 0 => Ok(secs),
        _ => Err(ConfigError::InvalidSeconds(raw.to_string())),
    }
}
