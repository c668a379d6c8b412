//! Redis price mirror
//!
//! Latest price per pair under `"{base}_{quote}"`, no expiry, last write
//! wins. The mirror is never authoritative; the price table is.

use crate::models::{format_fixed, CACHE_PRICE_DP};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use std::collections::HashMap;

const SCAN_BATCH: usize = 500;
const PRICE_KEY_PATTERN: &str = "*_*";

#[async_trait]
pub trait PriceCache: Send + Sync {
    /// Overwrite the cached price for `key`.
    async fn mirror(&self, key: &str, price: &Decimal) -> Result<()>;

    /// Every mirrored price key with its value. Keys that do not look like
    /// `"{base}_{quote}"` are left out.
    async fn entries(&self) -> Result<HashMap<String, String>>;
}

/// Whether `key` has the `"{base}_{quote}"` shape the mirror writes.
pub fn is_price_key(key: &str) -> bool {
    let Some((base, quote)) = key.split_once('_') else {
        return false;
    };
    let part_ok = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    part_ok(base) && part_ok(quote)
}

/// String stored for a mirrored price, e.g. `"50000.000000"`.
pub fn cache_value(price: &Decimal) -> String {
    format_fixed(price, CACHE_PRICE_DP)
}

#[derive(Clone)]
pub struct RedisPriceCache {
    connection: ConnectionManager,
}

impl RedisPriceCache {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Single-key lookup as served to downstream readers.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("Redis GET failed for {}", key))?;
        Ok(value)
    }

    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(PRICE_KEY_PATTERN)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .context("Redis SCAN failed")?;
            keys.extend(batch.into_iter().filter(|k| is_price_key(k)));
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl PriceCache for RedisPriceCache {
    async fn mirror(&self, key: &str, price: &Decimal) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, cache_value(price))
            .await
            .with_context(|| format!("Redis SET failed for {}", key))?;
        Ok(())
    }

    async fn entries(&self) -> Result<HashMap<String, String>> {
        let keys = self.scan_keys().await?;
        let mut entries = HashMap::with_capacity(keys.len());
        let mut conn = self.connection.clone();

        for chunk in keys.chunks(SCAN_BATCH) {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .context("Redis MGET failed")?;

            // Keys deleted between SCAN and MGET come back as nil
            for (key, value) in chunk.iter().zip(values) {
                if let Some(value) = value {
                    entries.insert(key.clone(), value);
                }
            }
        }

        Ok(entries)
    }
}
