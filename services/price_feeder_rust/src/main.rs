use anyhow::{Context, Result};
use dotenv::dotenv;
use exdex_rust_core::clients::BinanceClient;
use exdex_rust_core::db::{
    check_pool_health, create_pool, ensure_schema, get_pool_stats, DbPoolConfig, PgPriceStore,
};
use exdex_rust_core::redis::{RedisBus, RedisPriceCache};
use price_feeder_rust::{EventPublisher, Feeder, FeederConfig, RedisEventSink};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting price_feeder_rust...");

    let config = FeederConfig::from_env()?;

    // Database
    let pool = create_pool(&config.database_url, &DbPoolConfig::from_env()).await?;
    check_pool_health(&pool)
        .await
        .context("Database health check failed")?;
    if config.auto_migrate {
        ensure_schema(&pool).await?;
    }

    // Redis
    let bus = RedisBus::connect(&config.redis_url).await?;
    bus.ping().await.context("Redis ping failed")?;
    let cache = RedisPriceCache::new(bus.connection());

    let source = BinanceClient::new(config.ticker_url.clone(), config.ticker_timeout)?;

    let (publisher, drain) = if config.publish_enabled {
        info!(
            "Publishing price events on '{}' (queue: {})",
            config.publish_channel, config.publish_queue_capacity
        );
        let sink = RedisEventSink::new(bus.clone(), config.publish_channel.clone());
        let (publisher, handle) = EventPublisher::spawn(Arc::new(sink), config.publish_queue_capacity);
        (publisher, Some(handle))
    } else {
        (EventPublisher::disabled(), None)
    };

    let feeder = Feeder::new(
        config.schedule.clone(),
        config.classifier(),
        Arc::new(source),
        Arc::new(PgPriceStore::new(pool.clone())),
        Arc::new(cache),
        publisher,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    feeder.run(shutdown_rx).await;

    // Closing the publisher lets the drain task flush what is queued
    drop(feeder);
    if let Some(handle) = drain {
        if let Err(e) = handle.await {
            error!("Event publisher task failed: {}", e);
        }
    }

    let pool_stats = get_pool_stats(&pool);
    info!(
        "Closing database pool (size={}, active={})",
        pool_stats.size,
        pool_stats.active()
    );
    pool.close().await;
    info!("price_feeder_rust stopped");
    Ok(())
}
