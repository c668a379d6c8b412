//! price_feeder_rust - periodic Binance ticker ingestion
//!
//! Each cycle fetches the full ticker list, writes every recognized pair to
//! Postgres in one batch, mirrors prices into Redis, and optionally publishes
//! price events.

pub mod config;
pub mod feeder;
pub mod publisher;

pub use config::{FeederConfig, ScheduleConfig};
pub use feeder::{CycleReport, Feeder, FeederStats, FeederStatsSnapshot};
pub use publisher::{EventPublisher, PriceEventSink, PublisherStatsSnapshot, RedisEventSink};
