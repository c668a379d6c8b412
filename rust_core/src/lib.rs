//! Exdex Core - ticker ingestion and price synchronization primitives.
//!
//! This crate provides:
//! - Symbol classification into base / quote currency
//! - Full-list ticker fetching from Binance
//! - Price delta computation against the stored price
//! - Batched Postgres upserts into the price table
//! - Redis price mirror and pub/sub publishing

pub mod clients;
pub mod db;
pub mod delta;
pub mod models;
pub mod redis;
pub mod symbols;

pub use clients::{BinanceClient, FeedError, TickerSource};
pub use db::{PgPriceStore, PriceStore};
pub use delta::{compute_delta, DeltaEngine, PriceDelta, PriorLookup};
pub use models::{PriceEvent, PriceRecord, PriceUpdate, SymbolPair, TickerQuote};
pub use crate::redis::{PriceCache, RedisBus, RedisPriceCache};
pub use symbols::{QuoteMatchMode, SymbolClassifier, DEFAULT_QUOTE_CURRENCIES};
