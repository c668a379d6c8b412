//! Binance API Client
//!
//! Pulls the full spot price list from the Binance public API.
//! No API key required for public endpoints.
//!
//! The `/ticker/price` endpoint without a `symbol` parameter costs 4 request
//! weight and returns every listed trading pair in one response.

use super::ticker_source::{decode_tickers, FeedError, ProviderStatus, TickerSource};
use crate::models::TickerQuote;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Binance API client implementing TickerSource
pub struct BinanceClient {
    client: Client,
    url: String,
    /// Status of the most recent request
    status: RwLock<ProviderStatus>,
}

impl BinanceClient {
    /// Create a client for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Exdex/1.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            status: RwLock::new(ProviderStatus::Healthy),
        })
    }

    /// Client for the public Binance endpoint with the default timeout
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_TICKER_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn transport_error(&self, source: reqwest::Error) -> FeedError {
        if source.is_timeout() {
            FeedError::Timeout {
                url: self.url.clone(),
            }
        } else {
            FeedError::Network {
                url: self.url.clone(),
                source,
            }
        }
    }

    async fn fetch_inner(&self) -> Result<Vec<TickerQuote>, FeedError> {
        debug!("Fetching ticker list from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                *self.status.write() = ProviderStatus::RateLimited;
            }
            return Err(FeedError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        let quotes = decode_tickers(&body)?;
        debug!("Decoded {} tickers ({} bytes)", quotes.len(), body.len());
        Ok(quotes)
    }
}

#[async_trait]
impl TickerSource for BinanceClient {
    fn source_name(&self) -> &str {
        "Binance"
    }

    fn status(&self) -> ProviderStatus {
        *self.status.read()
    }

    async fn fetch(&self) -> Result<Vec<TickerQuote>, FeedError> {
        let result = self.fetch_inner().await;
        match &result {
            Ok(_) => *self.status.write() = ProviderStatus::Healthy,
            Err(FeedError::Status { status: 429, .. }) => {}
            Err(_) => *self.status.write() = ProviderStatus::Error,
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = BinanceClient::with_defaults().unwrap();
        assert_eq!(client.source_name(), "Binance");
        assert_eq!(client.url(), DEFAULT_TICKER_URL);
        assert_eq!(client.status(), ProviderStatus::Healthy);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 1 on loopback is not expected to accept connections
        let client = BinanceClient::new("http://127.0.0.1:1/ticker", Duration::from_secs(2)).unwrap();
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err.kind(), "network" | "timeout"));
        assert_eq!(client.status(), ProviderStatus::Error);
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_live() {
        let client = BinanceClient::with_defaults().unwrap();
        let quotes = client.fetch().await.unwrap();
        assert!(quotes.iter().any(|q| q.symbol == "BTCUSDT"));
    }
}
