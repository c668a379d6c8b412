//! Durable price storage.
//!
//! [`PriceStore`] is the seam between the feeder and Postgres: the delta
//! engine reads prior prices through it and the cycle writes its batch
//! through it. [`PgPriceStore`] is the production implementation.

pub mod health;
pub mod pool;
pub mod schema;
pub mod tokens;

pub use health::{check_pool_health, get_pool_stats, PoolStats};
pub use pool::{create_pool, DbPoolConfig};
pub use schema::ensure_schema;
pub use tokens::PgPriceStore;

use crate::models::{PriceUpdate, SymbolPair};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Last stored price for `pair`, or `None` if the pair was never written.
    async fn previous_price(&self, pair: &SymbolPair) -> Result<Option<Decimal>>;

    /// Insert or update every pair of one cycle in a single request, keyed by
    /// (base, quote). Returns the number of rows affected. The batch is not
    /// required to be atomic.
    async fn upsert_batch(&self, updates: &[PriceUpdate], updated_at: DateTime<Utc>) -> Result<u64>;
}
