use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Serialize;

/// Shared Redis handle for the feeder: pub/sub publishing for price events
/// and the connection the cache mirror writes through.
#[derive(Clone)]
pub struct RedisBus {
    connection: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Invalid Redis URL")?;
        let connection = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self { connection })
    }

    /// Round-trip a PING; used to fail fast at startup.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }

    pub async fn publish<T: Serialize>(&self, channel: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        self.publish_str(channel, &payload).await
    }

    pub async fn publish_str(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .context("Failed to publish message")?;
        Ok(())
    }

    /// Multiplexed connection; cheap to clone
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}
