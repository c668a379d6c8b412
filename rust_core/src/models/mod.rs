// Shared models for Exdex Rust services
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fractional digits used for cache mirror values.
pub const CACHE_PRICE_DP: u32 = 6;
/// Fractional digits used for broker message values.
pub const EVENT_PRICE_DP: u32 = 8;

// ============================================================================
// Feed Types
// ============================================================================

/// One raw ticker row as delivered by the exchange, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerQuote {
    pub symbol: String,
    #[serde(rename = "price")]
    pub price_raw: String,
}

impl TickerQuote {
    pub fn new(symbol: impl Into<String>, price_raw: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price_raw: price_raw.into(),
        }
    }

    /// Parse the raw price string. Negative or non-numeric prices yield `None`.
    pub fn parse_price(&self) -> Option<Decimal> {
        let price: Decimal = self.price_raw.trim().parse().ok()?;
        if price.is_sign_negative() && !price.is_zero() {
            return None;
        }
        Some(price)
    }
}

/// A ticker symbol decomposed into base and quote currency (e.g. BTC / USDT).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolPair {
    pub base: String,
    pub quote: String,
}

impl SymbolPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Key used by the cache mirror and the event publisher.
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }
}

impl fmt::Display for SymbolPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// ============================================================================
// Pipeline Types
// ============================================================================

/// A price observation with its delta against the previously stored price,
/// staged for the batched write of the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub pair: SymbolPair,
    pub price: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
}

/// Row of the `exdex_token` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceRecord {
    pub base_currency: String,
    pub quote_currency: String,
    pub price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl PriceRecord {
    pub fn pair(&self) -> SymbolPair {
        SymbolPair::new(self.base_currency.clone(), self.quote_currency.clone())
    }
}

/// Message emitted to the broker for every price update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub key: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl PriceEvent {
    pub fn new(key: impl Into<String>, price: &Decimal) -> Self {
        Self {
            key: key.into(),
            value: format_fixed(price, EVENT_PRICE_DP),
            timestamp: Utc::now(),
        }
    }
}

/// Render a decimal with exactly `dp` fractional digits.
pub fn format_fixed(value: &Decimal, dp: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_cache_key() {
        let pair = SymbolPair::new("BTC", "USDT");
        assert_eq!(pair.cache_key(), "BTC_USDT");
        assert_eq!(pair.to_string(), "BTC/USDT");
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(
            TickerQuote::new("BTCUSDT", "50000.00").parse_price(),
            Some(Decimal::from_str("50000.00").unwrap())
        );
        assert_eq!(
            TickerQuote::new("SHIBUSDT", "0.00001234").parse_price(),
            Some(Decimal::from_str("0.00001234").unwrap())
        );
        assert_eq!(TickerQuote::new("X", "0").parse_price(), Some(Decimal::ZERO));
        assert_eq!(TickerQuote::new("X", "abc").parse_price(), None);
        assert_eq!(TickerQuote::new("X", "").parse_price(), None);
        assert_eq!(TickerQuote::new("X", "-1.5").parse_price(), None);
    }

    #[test]
    fn test_format_fixed() {
        let price = Decimal::from_str("50000.00").unwrap();
        assert_eq!(format_fixed(&price, CACHE_PRICE_DP), "50000.000000");
        assert_eq!(format_fixed(&price, EVENT_PRICE_DP), "50000.00000000");

        let tiny = Decimal::from_str("0.000000125").unwrap();
        assert_eq!(format_fixed(&tiny, CACHE_PRICE_DP), "0.000000");
        assert_eq!(format_fixed(&tiny, EVENT_PRICE_DP), "0.00000013");
    }

    #[test]
    fn test_ticker_quote_deserializes_price_field() {
        let quote: TickerQuote =
            serde_json::from_str(r#"{"symbol":"ETHBTC","price":"0.05123000"}"#).unwrap();
        assert_eq!(quote.symbol, "ETHBTC");
        assert_eq!(quote.price_raw, "0.05123000");
    }

    #[test]
    fn test_price_event_value_precision() {
        let event = PriceEvent::new("BTC_USDT", &Decimal::from_str("51000.5").unwrap());
        assert_eq!(event.key, "BTC_USDT");
        assert_eq!(event.value, "51000.50000000");
    }
}
