//! Ticker symbol classification.
//!
//! Exchange tickers arrive as a single concatenated symbol (`BTCUSDT`,
//! `ETHBTC`). The classifier splits them into base and quote currency by
//! matching against a known list of quote suffixes.
//!
//! Two matching modes are supported:
//! - [`QuoteMatchMode::FirstInList`]: the first suffix in list order wins.
//!   This is order-dependent: with `["USD", "TUSD"]`, `BTCTUSD` splits into
//!   `BTCT` / `USD`. It is the default because existing rows were keyed that way.
//! - [`QuoteMatchMode::LongestSuffix`]: the longest matching suffix wins,
//!   ties resolved by list order.

use crate::models::SymbolPair;
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Known quote currencies in match order.
pub const DEFAULT_QUOTE_CURRENCIES: &[&str] = &[
    "USDT", "BUSD", "USDC", "FDUSD", "TUSD", "BTC", "ETH", "BNB", "TRY", "BRL", "EUR", "GBP",
    "AUD", "ZAR", "JPY", "RUB", "UAH", "NGN", "VND", "IDR", "DAI", "TRX", "PAX",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteMatchMode {
    #[default]
    FirstInList,
    LongestSuffix,
}

impl QuoteMatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstInList => "first",
            Self::LongestSuffix => "longest",
        }
    }
}

impl FromStr for QuoteMatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first_in_list" => Ok(Self::FirstInList),
            "longest" | "longest_suffix" => Ok(Self::LongestSuffix),
            other => Err(anyhow!("unknown quote match mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolClassifier {
    quotes: Vec<String>,
    mode: QuoteMatchMode,
}

impl SymbolClassifier {
    /// Build a classifier from an ordered quote list.
    ///
    /// Entries are trimmed and upper-cased; empty entries and later
    /// duplicates are dropped so the first occurrence keeps its position.
    pub fn new<I, S>(quotes: I, mode: QuoteMatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for quote in quotes {
            let quote = quote.as_ref().trim().to_uppercase();
            if !quote.is_empty() && !list.contains(&quote) {
                list.push(quote);
            }
        }
        Self { quotes: list, mode }
    }

    pub fn with_mode(mode: QuoteMatchMode) -> Self {
        Self::new(DEFAULT_QUOTE_CURRENCIES.iter().copied(), mode)
    }

    pub fn quotes(&self) -> &[String] {
        &self.quotes
    }

    pub fn mode(&self) -> QuoteMatchMode {
        self.mode
    }

    /// Split `symbol` into base and quote, or `None` if no known quote
    /// currency is a strict suffix of it.
    pub fn classify(&self, symbol: &str) -> Option<SymbolPair> {
        let mut candidates = self
            .quotes
            .iter()
            .filter(|q| symbol.len() > q.len() && symbol.ends_with(q.as_str()));

        let quote = match self.mode {
            QuoteMatchMode::FirstInList => candidates.next()?,
            // max_by_key keeps the last maximum, so fold to keep list order on ties
            QuoteMatchMode::LongestSuffix => candidates.fold(None::<&String>, |best, q| match best {
                Some(b) if b.len() >= q.len() => Some(b),
                _ => Some(q),
            })?,
        };

        let base = &symbol[..symbol.len() - quote.len()];
        Some(SymbolPair::new(base, quote.as_str()))
    }
}

impl Default for SymbolClassifier {
    fn default() -> Self {
        Self::with_mode(QuoteMatchMode::default())
    }
}
