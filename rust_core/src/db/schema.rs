//! Idempotent schema bootstrap for the price table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

pub const PRICE_TABLE: &str = "exdex_token";

const CREATE_PRICE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS exdex_token (
        id SERIAL PRIMARY KEY,
        base_currency TEXT NOT NULL,
        quote_currency TEXT NOT NULL,
        price NUMERIC NOT NULL,
        price_change NUMERIC DEFAULT 0,
        price_change_percent NUMERIC DEFAULT 0,
        updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (base_currency, quote_currency)
    )
"#;

/// Create the price table if it does not exist
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_PRICE_TABLE)
        .execute(pool)
        .await
        .context("Failed to create price table")?;

    info!("Table ready: {}", PRICE_TABLE);
    Ok(())
}
