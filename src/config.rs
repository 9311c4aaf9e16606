//! Bot configuration loaded from environment variables.
//!
//! `main` calls `dotenv` first, so a local `.env` file works the same way as
//! real environment variables. Only the bot token is mandatory.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use teloxide::types::{ChatId, UserId};
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://archive.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `BOT_TOKEN`, falling back to `TELOXIDE_TOKEN`.
    pub bot_token: String,

    /// Env: `DATABASE_URL`
    pub database_url: String,

    /// Env: `ADMIN_IDS`, comma separated.
    pub admin_ids: Vec<UserId>,

    /// Used when an archived record has no source chat of its own.
    /// Env: `SOURCE_CHAT_ID`
    pub source_chat_id: Option<ChatId>,

    /// Env: `AUTO_DELETE_HISTORY_DAYS`
    pub history_retention_days: u32,

    /// Env: `MAX_FAVORITES_PER_USER`
    pub max_favorites_per_user: u32,

    /// Updates a user may send in a burst; the budget refills over
    /// `rate_limit_window_secs`. Admins are exempt.
    /// Env: `RATE_LIMIT_REQUESTS`
    pub rate_limit_requests: u32,

    /// Env: `RATE_LIMIT_WINDOW_SECS`
    pub rate_limit_window_secs: u64,

    /// Chat that receives a copy of every admin action.
    /// Env: `ADMIN_LOG_CHANNEL`
    pub admin_log_channel: Option<ChatId>,

    /// Public URL for webhook mode. Long polling is used when unset.
    /// Env: `WEBHOOK_URL`
    pub webhook_url: Option<Url>,

    /// Env: `PORT`
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            admin_ids: Vec::new(),
            source_chat_id: None,
            history_retention_days: 15,
            max_favorites_per_user: 1000,
            rate_limit_requests: 30,
            rate_limit_window_secs: 60,
            admin_log_channel: None,
            webhook_url: None,
            port: 10000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(ids) = get("ADMIN_IDS") {
            config.admin_ids = parse_admin_ids(&ids);
        }

        if let Some(raw) = get("SOURCE_CHAT_ID") {
            config.source_chat_id = Some(ChatId(parse_value("SOURCE_CHAT_ID", &raw)?));
        }
        if let Some(raw) = get("AUTO_DELETE_HISTORY_DAYS") {
            config.history_retention_days = parse_value("AUTO_DELETE_HISTORY_DAYS", &raw)?;
        }
        if let Some(raw) = get("MAX_FAVORITES_PER_USER") {
            config.max_favorites_per_user = parse_value("MAX_FAVORITES_PER_USER", &raw)?;
        }
        if let Some(raw) = get("RATE_LIMIT_REQUESTS") {
            config.rate_limit_requests = parse_value("RATE_LIMIT_REQUESTS", &raw)?;
        }
        if let Some(raw) = get("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit_window_secs = parse_value("RATE_LIMIT_WINDOW_SECS", &raw)?;
        }
        if let Some(raw) = get("ADMIN_LOG_CHANNEL") {
            config.admin_log_channel = Some(ChatId(parse_value("ADMIN_LOG_CHANNEL", &raw)?));
        }
        if let Some(raw) = get("WEBHOOK_URL") {
            let url = Url::parse(&raw).map_err(|_| ConfigError::Invalid {
                key: "WEBHOOK_URL",
                value: raw.clone(),
            })?;
            config.webhook_url = Some(url);
        }
        if let Some(raw) = get("PORT") {
            config.port = parse_value("PORT", &raw)?;
        }

        Ok(config)
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admin_ids.contains(&user)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_admin_ids(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse::<u64>() {
            Ok(id) => Some(UserId(id)),
            Err(_) => {
                log::warn!("Ignoring malformed admin id {part:?}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.history_retention_days, 15);
        assert_eq!(config.max_favorites_per_user, 1000);
        assert_eq!(config.rate_limit_requests, 30);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert!(config.webhook_url.is_none());
        assert!(config.admin_ids.is_empty());
    }

    #[test]
    fn admin_ids_skip_garbage() {
        let config = Config::from_lookup(lookup(&[
            ("TELOXIDE_TOKEN", "123:abc"),
            ("ADMIN_IDS", " 42, nope,,7 "),
        ]))
        .unwrap();
        assert_eq!(config.admin_ids, vec![UserId(42), UserId(7)]);
        assert!(config.is_admin(UserId(7)));
        assert!(!config.is_admin(UserId(8)));
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("AUTO_DELETE_HISTORY_DAYS", "two weeks"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "AUTO_DELETE_HISTORY_DAYS", .. }
        ));
    }

    #[test]
    fn source_chat_accepts_negative_ids() {
        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("SOURCE_CHAT_ID", "-1001234567890"),
        ]))
        .unwrap();
        assert_eq!(config.source_chat_id, Some(ChatId(-1001234567890)));
    }
}
