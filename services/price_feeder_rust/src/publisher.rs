//! Best-effort price event publishing
//!
//! The feeder hands events to a bounded queue and never waits on the broker.
//! A dedicated drain task forwards queued events to a [`PriceEventSink`].
//! A full queue drops the event; a failed send is logged and not retried.

use anyhow::Result;
use async_trait::async_trait;
use exdex_rust_core::models::PriceEvent;
use exdex_rust_core::redis::RedisBus;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[async_trait]
pub trait PriceEventSink: Send + Sync {
    async fn send(&self, event: &PriceEvent) -> Result<()>;
}

/// Publishes events as JSON on a Redis pub/sub channel
pub struct RedisEventSink {
    bus: RedisBus,
    channel: String,
}

impl RedisEventSink {
    pub fn new(bus: RedisBus, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl PriceEventSink for RedisEventSink {
    async fn send(&self, event: &PriceEvent) -> Result<()> {
        self.bus.publish(&self.channel, event).await
    }
}

#[derive(Debug, Default)]
pub struct PublisherStats {
    pub enqueued: AtomicU64,
    pub dropped: AtomicU64,
    pub published: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublisherStatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub published: u64,
    pub failed: u64,
}

impl PublisherStats {
    pub fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct EventPublisher {
    tx: Option<mpsc::Sender<PriceEvent>>,
    stats: Arc<PublisherStats>,
}

impl EventPublisher {
    /// Publisher that accepts and discards everything
    pub fn disabled() -> Self {
        Self {
            tx: None,
            stats: Arc::new(PublisherStats::default()),
        }
    }

    /// Start the drain task. It exits once the publisher is dropped and the
    /// queued events have been handed to the sink.
    pub fn spawn(sink: Arc<dyn PriceEventSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PriceEvent>(capacity.max(1));
        let stats = Arc::new(PublisherStats::default());
        let drain_stats = stats.clone();

        let handle = tokio::spawn(async move {
            debug!("Event publisher drain task started (capacity: {})", capacity);
            while let Some(event) = rx.recv().await {
                match sink.send(&event).await {
                    Ok(()) => {
                        drain_stats.published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        drain_stats.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Failed to publish {}: {:#}", event.key, e);
                    }
                }
            }
            let snapshot = drain_stats.snapshot();
            info!(
                "Event publisher drained: published={}, failed={}, dropped={}",
                snapshot.published, snapshot.failed, snapshot.dropped
            );
        });

        (
            Self {
                tx: Some(tx),
                stats,
            },
            handle,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue one event without waiting. Returns whether it was queued.
    pub fn publish(&self, key: &str, price: &Decimal) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(PriceEvent::new(key, price)) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Event queue full, dropping {}", event.key);
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Event publisher closed, dropping {}", event.key);
                false
            }
        }
    }

    pub fn stats(&self) -> PublisherStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<PriceEvent>>,
        fail_keys: Vec<String>,
    }

    #[async_trait]
    impl PriceEventSink for RecordingSink {
        async fn send(&self, event: &PriceEvent) -> Result<()> {
            if self.fail_keys.contains(&event.key) {
                return Err(anyhow!("broker unavailable"));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    /// Sink that never completes, so the queue fills up.
    struct StuckSink;

    #[async_trait]
    impl PriceEventSink for StuckSink {
        async fn send(&self, _event: &PriceEvent) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_noop() {
        let publisher = EventPublisher::disabled();
        assert!(!publisher.is_enabled());
        assert!(!publisher.publish("BTC_USDT", &Decimal::from(1)));
        assert_eq!(publisher.stats(), PublisherStatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_events_are_drained_on_close() {
        let sink = Arc::new(RecordingSink::default());
        let (publisher, handle) = EventPublisher::spawn(sink.clone(), 16);

        assert!(publisher.publish("BTC_USDT", &Decimal::from(50000)));
        assert!(publisher.publish("ETH_USDT", &Decimal::from(3000)));
        let stats = publisher.stats.clone();
        drop(publisher);
        handle.await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key, "BTC_USDT");
        assert_eq!(events[0].value, "50000.00000000");
        assert_eq!(stats.snapshot().published, 2);
    }

    #[tokio::test]
    async fn test_send_failure_is_counted_not_retried() {
        let sink = Arc::new(RecordingSink {
            fail_keys: vec!["BAD_USDT".to_string()],
            ..Default::default()
        });
        let (publisher, handle) = EventPublisher::spawn(sink.clone(), 16);

        publisher.publish("BAD_USDT", &Decimal::from(1));
        publisher.publish("BTC_USDT", &Decimal::from(2));
        let stats = publisher.stats.clone();
        drop(publisher);
        handle.await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.published, 1);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (publisher, handle) = EventPublisher::spawn(Arc::new(StuckSink), 2);

        // The drain task holds at most one event in flight, so at most three
        // can be accepted before the queue reports full
        let accepted = tokio::time::timeout(Duration::from_secs(1), async {
            (0..10)
                .filter(|i| publisher.publish(&format!("K{}_USDT", i), &Decimal::from(1)))
                .count()
        })
        .await
        .unwrap();

        assert!(accepted <= 3);
        assert_eq!(publisher.stats().dropped, 10 - accepted as u64);
        handle.abort();
    }
}
