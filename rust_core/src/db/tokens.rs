//! Price table operations
//!
//! Reads the previously stored price for a pair and writes one cycle of
//! updates as a single batched upsert into `exdex_token`.

use super::PriceStore;
use crate::models::{PriceRecord, PriceUpdate, SymbolPair};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;

/// Postgres-backed [`PriceStore`]
#[derive(Clone)]
pub struct PgPriceStore {
    pool: PgPool,
}

impl PgPriceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetch the full stored row for a pair.
    ///
    /// Tables created by earlier deployments declare `updated_at` as a plain
    /// `TIMESTAMP`; the cast reads both column types as UTC instants.
    pub async fn get_record(&self, pair: &SymbolPair) -> Result<Option<PriceRecord>> {
        let record = sqlx::query_as::<_, PriceRecord>(
            r#"
            SELECT base_currency, quote_currency, price,
                   COALESCE(price_change, 0) AS price_change,
                   COALESCE(price_change_percent, 0) AS price_change_percent,
                   COALESCE(updated_at::timestamptz, now()) AS updated_at
            FROM exdex_token
            WHERE base_currency = $1 AND quote_currency = $2
            "#,
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch price record for {}", pair))?;

        Ok(record)
    }
}

#[async_trait]
impl PriceStore for PgPriceStore {
    async fn previous_price(&self, pair: &SymbolPair) -> Result<Option<Decimal>> {
        let price = sqlx::query_scalar::<_, Decimal>(
            "SELECT price FROM exdex_token WHERE base_currency = $1 AND quote_currency = $2",
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch previous price for {}", pair))?;

        Ok(price)
    }

    async fn upsert_batch(&self, updates: &[PriceUpdate], updated_at: DateTime<Utc>) -> Result<u64> {
        let columns = UpsertColumns::from_updates(updates);
        if columns.is_empty() {
            return Ok(0);
        }

        // One statement for the whole cycle; array binds keep the parameter
        // count fixed no matter how many pairs the exchange lists.
        let result = sqlx::query(
            r#"
            INSERT INTO exdex_token (
                base_currency, quote_currency, price, price_change, price_change_percent, updated_at
            )
            SELECT base, quote, price, change, change_percent, $6
            FROM UNNEST($1::text[], $2::text[], $3::numeric[], $4::numeric[], $5::numeric[])
                AS batch(base, quote, price, change, change_percent)
            ON CONFLICT (base_currency, quote_currency)
            DO UPDATE SET
                price = EXCLUDED.price,
                price_change = EXCLUDED.price_change,
                price_change_percent = EXCLUDED.price_change_percent,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(columns.bases)
        .bind(columns.quotes)
        .bind(columns.prices)
        .bind(columns.changes)
        .bind(columns.change_percents)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert price batch")?;

        debug!("Upserted {} price rows", result.rows_affected());
        Ok(result.rows_affected())
    }
}

/// Column-major view of one batch, ready for `UNNEST`.
///
/// A pair listed twice keeps only its last update: Postgres refuses an
/// `ON CONFLICT DO UPDATE` that touches the same row twice in one statement.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct UpsertColumns {
    pub bases: Vec<String>,
    pub quotes: Vec<String>,
    pub prices: Vec<Decimal>,
    pub changes: Vec<Decimal>,
    pub change_percents: Vec<Decimal>,
}

impl UpsertColumns {
    pub fn from_updates(updates: &[PriceUpdate]) -> Self {
        let mut slot: HashMap<&SymbolPair, usize> = HashMap::with_capacity(updates.len());
        let mut unique: Vec<&PriceUpdate> = Vec::with_capacity(updates.len());

        for update in updates {
            match slot.get(&update.pair) {
                Some(&i) => unique[i] = update,
                None => {
                    slot.insert(&update.pair, unique.len());
                    unique.push(update);
                }
            }
        }

        let mut columns = Self {
            bases: Vec::with_capacity(unique.len()),
            quotes: Vec::with_capacity(unique.len()),
            prices: Vec::with_capacity(unique.len()),
            changes: Vec::with_capacity(unique.len()),
            change_percents: Vec::with_capacity(unique.len()),
        };
        for update in unique {
            columns.bases.push(update.pair.base.clone());
            columns.quotes.push(update.pair.quote.clone());
            columns.prices.push(update.price);
            columns.changes.push(update.change);
            columns.change_percents.push(update.change_percent);
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn update(base: &str, quote: &str, price: &str) -> PriceUpdate {
        PriceUpdate {
            pair: SymbolPair::new(base, quote),
            price: Decimal::from_str(price).unwrap(),
            change: Decimal::ZERO,
            change_percent: Decimal::ZERO,
        }
    }

    #[test]
    fn test_columns_preserve_order() {
        let updates = vec![update("BTC", "USDT", "50000"), update("ETH", "BTC", "0.05")];
        let columns = UpsertColumns::from_updates(&updates);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns.bases, vec!["BTC", "ETH"]);
        assert_eq!(columns.quotes, vec!["USDT", "BTC"]);
        assert_eq!(columns.prices[1], Decimal::from_str("0.05").unwrap());
    }

    #[test]
    fn test_duplicate_pair_keeps_last_update() {
        let updates = vec![
            update("BTC", "USDT", "50000"),
            update("ETH", "USDT", "3000"),
            update("BTC", "USDT", "50100"),
        ];
        let columns = UpsertColumns::from_updates(&updates);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns.bases, vec!["BTC", "ETH"]);
        assert_eq!(columns.prices[0], Decimal::from_str("50100").unwrap());
    }

    #[test]
    fn test_empty_batch() {
        assert!(UpsertColumns::from_updates(&[]).is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL pointing at a scratch database
    async fn test_upsert_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = crate::db::create_pool(&url, &crate::db::DbPoolConfig::default())
            .await
            .unwrap();
        crate::db::ensure_schema(&pool).await.unwrap();
        let store = PgPriceStore::new(pool);
        let pair = SymbolPair::new("TESTBASE", "USDT");

        let mut first = update("TESTBASE", "USDT", "10");
        store.upsert_batch(&[first.clone()], Utc::now()).await.unwrap();
        assert_eq!(
            store.previous_price(&pair).await.unwrap(),
            Some(Decimal::from(10))
        );

        first.price = Decimal::from(12);
        first.change = Decimal::from(2);
        first.change_percent = Decimal::from(20);
        let rows = store.upsert_batch(&[first], Utc::now()).await.unwrap();
        assert_eq!(rows, 1);

        let record = store.get_record(&pair).await.unwrap().unwrap();
        assert_eq!(record.pair(), pair);
        assert_eq!(record.price, Decimal::from(12));
        assert_eq!(record.price_change_percent, Decimal::from(20));

        sqlx::query("DELETE FROM exdex_token WHERE base_currency = $1")
            .bind("TESTBASE")
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL pointing at a scratch database
    async fn test_get_record_reads_plain_timestamp_column() {
        let url = std::env::var("DATABASE_URL").unwrap();
        // One connection so the session-local temp table shadows exdex_token
        let config = crate::db::DbPoolConfig {
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = crate::db::create_pool(&url, &config).await.unwrap();
        sqlx::query(
            r#"
            CREATE TEMP TABLE exdex_token (
                id SERIAL PRIMARY KEY,
                base_currency TEXT NOT NULL,
                quote_currency TEXT NOT NULL,
                price NUMERIC NOT NULL,
                price_change NUMERIC DEFAULT 0,
                price_change_percent NUMERIC DEFAULT 0,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (base_currency, quote_currency)
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = PgPriceStore::new(pool);
        let pair = SymbolPair::new("BTC", "USDT");
        store
            .upsert_batch(&[update("BTC", "USDT", "50000")], Utc::now())
            .await
            .unwrap();

        let record = store.get_record(&pair).await.unwrap().unwrap();
        assert_eq!(record.price, Decimal::from(50000));
        assert!(record.price_change.is_zero());
    }
}
