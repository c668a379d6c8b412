pub mod binance;
pub mod ticker_source;

// Re-export commonly used types
pub use binance::BinanceClient;
pub use ticker_source::{decode_tickers, FeedError, ProviderStatus, TickerSource};
