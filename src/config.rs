use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_BACKFILL_PAGES;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    pub command_prefix: String,
    pub quote_blacklist: Vec<u64>,
    pub fetch_timeout: Duration,
    pub selection_deadline: Duration,
    pub backfill_pages: usize,
    pub metrics_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
        let guild_id = parse(
            "GUILD_ID",
            lookup("GUILD_ID").ok_or(ConfigError::Missing("GUILD_ID"))?,
        )?;

        let quote_blacklist = match lookup("QUOTE_BLACKLIST") {
            Some(raw) => parse_id_list("QUOTE_BLACKLIST", &raw)?,
            None => Vec::new(),
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("plain") | Some("pretty") => LogFormat::Plain,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            discord_token,
            guild_id,
            command_prefix: lookup("COMMAND_PREFIX").unwrap_or_else(|| "!".into()),
            quote_blacklist,
            fetch_timeout: Duration::from_secs(optional(&lookup, "FETCH_TIMEOUT_SECS", 10)?),
            selection_deadline: Duration::from_secs(optional(&lookup, "SELECTION_DEADLINE_SECS", 30)?),
            backfill_pages: optional(&lookup, "BACKFILL_PAGES", DEFAULT_BACKFILL_PAGES)?,
            metrics_addr: lookup("METRICS_ADDR")
                .map(|raw| parse("METRICS_ADDR", raw))
                .transpose()?,
            log_format,
        })
    }
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parse(key, raw),
        None => Ok(default),
    }
}

fn parse_id_list(key: &'static str, raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse(key, s.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_fill_in_optional_keys() {
        let cfg = Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "abc"), ("GUILD_ID", "1234")]))
            .unwrap();

        assert_eq!(cfg.guild_id, 1234);
        assert_eq!(cfg.command_prefix, "!");
        assert!(cfg.quote_blacklist.is_empty());
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(10));
        assert_eq!(cfg.selection_deadline, Duration::from_secs(30));
        assert_eq!(cfg.backfill_pages, 10);
        assert_eq!(cfg.metrics_addr, None);
        assert_eq!(cfg.log_format, LogFormat::Plain);
    }

    #[test]
    fn blacklist_is_comma_separated() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "1"),
            ("QUOTE_BLACKLIST", " 10, 20,,30 "),
            ("LOG_FORMAT", "json"),
            ("METRICS_ADDR", "127.0.0.1:8083"),
        ]))
        .unwrap();

        assert_eq!(cfg.quote_blacklist, vec![10, 20, 30]);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.metrics_addr, Some("127.0.0.1:8083".parse().unwrap()));
    }

    #[test]
    fn missing_token_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("GUILD_ID", "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DISCORD_TOKEN")));
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "1"),
            ("FETCH_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "FETCH_TIMEOUT_SECS", .. }));
    }
}
