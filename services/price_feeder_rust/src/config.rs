//! Configuration for price_feeder_rust

use anyhow::{anyhow, Result};
use exdex_rust_core::clients::binance::{DEFAULT_TICKER_URL, DEFAULT_TIMEOUT_SECS};
use exdex_rust_core::symbols::{QuoteMatchMode, SymbolClassifier, DEFAULT_QUOTE_CURRENCIES};
use std::env;
use std::time::Duration;

/// Loop timing, independent of any connection settings so tests can build it
/// directly.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Sleep applied after each cycle completes
    pub cycle_interval: Duration,
    /// Stop after this many cycles; run until shutdown when `None`
    pub max_cycles: Option<u64>,
    /// Log cumulative stats and the mirror size every N cycles (0 disables)
    pub stats_log_every: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_millis(1000),
            max_cycles: None,
            stats_log_every: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeederConfig {
    // Connections
    pub database_url: String,
    pub redis_url: String,
    pub auto_migrate: bool,

    // Inbound feed
    pub ticker_url: String,
    pub ticker_timeout: Duration,

    // Classification
    pub quote_currencies: Vec<String>,
    pub quote_match_mode: QuoteMatchMode,

    // Event publishing
    pub publish_enabled: bool,
    pub publish_channel: String,
    pub publish_queue_capacity: usize,

    pub schedule: ScheduleConfig,
}

impl FeederConfig {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| anyhow!("DATABASE_URL must be set"))?;

        let ticker_timeout_secs = parse_u64("TICKER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if ticker_timeout_secs == 0 {
            return Err(anyhow!("TICKER_TIMEOUT_SECS must be > 0"));
        }

        let publish_queue_capacity = parse_u64("PUBLISH_QUEUE_CAPACITY", 1024)? as usize;
        if publish_queue_capacity == 0 {
            return Err(anyhow!("PUBLISH_QUEUE_CAPACITY must be > 0"));
        }

        let quote_currencies = match env::var("QUOTE_CURRENCIES") {
            Ok(list) => parse_list(&list),
            Err(_) => DEFAULT_QUOTE_CURRENCIES.iter().map(|q| q.to_string()).collect(),
        };
        if quote_currencies.is_empty() {
            return Err(anyhow!("QUOTE_CURRENCIES must list at least one currency"));
        }

        let max_cycles = match env::var("MAX_CYCLES") {
            Ok(v) => Some(
                v.parse()
                    .map_err(|_| anyhow!("MAX_CYCLES must be a valid u64"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            auto_migrate: parse_bool("AUTO_MIGRATE", true)?,

            ticker_url: env::var("TICKER_URL").unwrap_or_else(|_| DEFAULT_TICKER_URL.to_string()),
            ticker_timeout: Duration::from_secs(ticker_timeout_secs),

            quote_currencies,
            quote_match_mode: env::var("QUOTE_MATCH_MODE")
                .unwrap_or_else(|_| "first".to_string())
                .parse()?,

            publish_enabled: parse_bool("PUBLISH_ENABLED", false)?,
            publish_channel: env::var("PUBLISH_CHANNEL").unwrap_or_else(|_| "prices".to_string()),
            publish_queue_capacity,

            schedule: ScheduleConfig {
                cycle_interval: Duration::from_millis(parse_u64("CYCLE_INTERVAL_MS", 1000)?),
                max_cycles,
                stats_log_every: parse_u64("STATS_LOG_EVERY_CYCLES", 60)?,
            },
        })
    }

    pub fn classifier(&self) -> SymbolClassifier {
        SymbolClassifier::new(&self.quote_currencies, self.quote_match_mode)
    }
}

/// Split a comma-separated list, dropping empty entries
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse environment variable as u64 with default fallback
fn parse_u64(var_name: &str, default: u64) -> Result<u64> {
    match env::var(var_name) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        Err(_) => Ok(default),
    }
}

/// Parse environment variable as bool with default fallback
fn parse_bool(var_name: &str, default: bool) -> Result<bool> {
    match env::var(var_name) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(anyhow!("{} must be a boolean", var_name)),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests stay away from setting env vars; cargo runs tests in parallel threads.

    #[test]
    fn test_parse_u64_with_default() {
        assert_eq!(parse_u64("NON_EXISTENT_VAR_ABC", 100).unwrap(), 100);
    }

    #[test]
    fn test_parse_bool_with_default() {
        assert!(parse_bool("NON_EXISTENT_VAR_DEF", true).unwrap());
        assert!(!parse_bool("NON_EXISTENT_VAR_DEF", false).unwrap());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("USDT, BTC,,ETH "), vec!["USDT", "BTC", "ETH"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_schedule_defaults() {
        let schedule = ScheduleConfig::default();
        assert_eq!(schedule.cycle_interval, Duration::from_secs(1));
        assert_eq!(schedule.max_cycles, None);
    }
}
