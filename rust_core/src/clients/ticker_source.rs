//! Ticker Source Trait
//!
//! Defines the interface the feeder uses to pull one full price list per
//! cycle. The Binance client is the production implementation; tests inject
//! in-memory sources.

use crate::models::TickerQuote;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single fetch. Every variant is recoverable: the caller skips
/// the cycle and tries again on the next one.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The request did not complete within the client timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection refused, reset, DNS failure or a broken body stream.
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body was not a JSON array of `{symbol, price}` objects.
    #[error("failed to decode ticker payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FeedError {
    /// Short label for log fields and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Timeout { .. } => "timeout",
            FeedError::Network { .. } => "network",
            FeedError::Status { .. } => "status",
            FeedError::Decode(_) => "decode",
        }
    }
}

/// Provider health/availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProviderStatus {
    /// Last request succeeded
    #[default]
    Healthy,
    /// Provider answered 429, requests should be delayed
    RateLimited,
    /// Last request failed
    Error,
}

/// Common trait for full-list ticker providers
#[async_trait]
pub trait TickerSource: Send + Sync {
    /// Display name used in logs (e.g. "Binance")
    fn source_name(&self) -> &str;

    /// Current status of the provider
    fn status(&self) -> ProviderStatus {
        ProviderStatus::Healthy
    }

    /// Fetch the complete price list. Either the whole list decodes or the
    /// call fails; there are no partial results.
    async fn fetch(&self) -> Result<Vec<TickerQuote>, FeedError>;
}

/// Decode a ticker list body.
pub fn decode_tickers(body: &[u8]) -> Result<Vec<TickerQuote>, FeedError> {
    Ok(serde_json::from_slice::<Vec<TickerQuote>>(body)?)
}
