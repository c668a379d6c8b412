//! Feeder: the ingestion cycle and the loop that drives it
//!
//! One cycle:
//! - fetch the full ticker list (skip the cycle on any feed error)
//! - classify each symbol and parse its price (unknown or invalid rows are filtered)
//! - read the prior price and compute the delta per pair
//! - write every staged pair in one batched upsert
//! - mirror each price into the cache, independently of the write
//! - hand each update to the event publisher
//!
//! Cycles never overlap. The configured interval is a sleep *after* each
//! cycle, so a slow cycle stretches the effective period.

use crate::config::ScheduleConfig;
use crate::publisher::EventPublisher;
use chrono::Utc;
use exdex_rust_core::clients::{FeedError, TickerSource};
use exdex_rust_core::db::PriceStore;
use exdex_rust_core::delta::{DeltaEngine, PriorLookup};
use exdex_rust_core::models::{PriceUpdate, TickerQuote};
use exdex_rust_core::redis::PriceCache;
use exdex_rust_core::symbols::SymbolClassifier;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Outcome of a single cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Set when the fetch failed and processing was skipped
    pub fetch_error: Option<String>,
    pub fetched: usize,
    pub unrecognized: usize,
    pub invalid_price: usize,
    pub lookup_failures: usize,
    pub staged: usize,
    pub upserted: u64,
    pub write_failed: bool,
    pub cached: usize,
    pub cache_failures: usize,
    pub published: usize,
    pub duration: Duration,
}

impl CycleReport {
    pub fn is_skipped(&self) -> bool {
        self.fetch_error.is_some()
    }
}

#[derive(Debug, Default)]
pub struct FeederStats {
    pub cycles: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub pairs_staged: AtomicU64,
    pub rows_upserted: AtomicU64,
    pub write_failures: AtomicU64,
    pub cache_failures: AtomicU64,
    pub unrecognized_symbols: AtomicU64,
    pub invalid_prices: AtomicU64,
    pub lookup_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeederStatsSnapshot {
    pub cycles: u64,
    pub fetch_failures: u64,
    pub pairs_staged: u64,
    pub rows_upserted: u64,
    pub write_failures: u64,
    pub cache_failures: u64,
    pub unrecognized_symbols: u64,
    pub invalid_prices: u64,
    pub lookup_failures: u64,
}

impl FeederStats {
    fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if report.is_skipped() {
            self.fetch_failures.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.pairs_staged.fetch_add(report.staged as u64, Ordering::Relaxed);
        self.rows_upserted.fetch_add(report.upserted, Ordering::Relaxed);
        if report.write_failed {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.cache_failures.fetch_add(report.cache_failures as u64, Ordering::Relaxed);
        self.unrecognized_symbols.fetch_add(report.unrecognized as u64, Ordering::Relaxed);
        self.invalid_prices.fetch_add(report.invalid_price as u64, Ordering::Relaxed);
        self.lookup_failures.fetch_add(report.lookup_failures as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeederStatsSnapshot {
        FeederStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            pairs_staged: self.pairs_staged.load(Ordering::Relaxed),
            rows_upserted: self.rows_upserted.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            cache_failures: self.cache_failures.load(Ordering::Relaxed),
            unrecognized_symbols: self.unrecognized_symbols.load(Ordering::Relaxed),
            invalid_prices: self.invalid_prices.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct Feeder {
    schedule: ScheduleConfig,
    classifier: SymbolClassifier,
    source: Arc<dyn TickerSource>,
    store: Arc<dyn PriceStore>,
    cache: Arc<dyn PriceCache>,
    deltas: DeltaEngine,
    publisher: EventPublisher,
    stats: Arc<FeederStats>,
}

impl Feeder {
    pub fn new(
        schedule: ScheduleConfig,
        classifier: SymbolClassifier,
        source: Arc<dyn TickerSource>,
        store: Arc<dyn PriceStore>,
        cache: Arc<dyn PriceCache>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            schedule,
            classifier,
            source,
            deltas: DeltaEngine::new(store.clone()),
            store,
            cache,
            publisher,
            stats: Arc::new(FeederStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<FeederStats> {
        self.stats.clone()
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Run cycles until `shutdown` flips to `true` or `max_cycles` is reached.
    ///
    /// Shutdown is observed between cycles, while the fetch is in flight, and
    /// during the sleep. Store and cache calls that were already issued are
    /// allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> FeederStatsSnapshot {
        info!(
            "Feeder running: source={}, interval={:?}, max_cycles={:?}, quote_mode={}",
            self.source.source_name(),
            self.schedule.cycle_interval,
            self.schedule.max_cycles,
            self.classifier.mode().as_str()
        );

        let mut cycle: u64 = 0;
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping before cycle {}", cycle + 1);
                break;
            }
            if self.schedule.max_cycles.is_some_and(|max| cycle >= max) {
                info!("Reached max cycles ({}), stopping", cycle);
                break;
            }
            cycle += 1;

            let started = Instant::now();
            let fetched = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Shutdown requested during fetch of cycle {}", cycle);
                    break;
                }
                result = self.source.fetch() => result,
            };
            let report = self.complete_cycle(cycle, fetched, started).await;
            self.log_report(&report);

            if self.schedule.stats_log_every > 0 && cycle % self.schedule.stats_log_every == 0 {
                self.log_stats().await;
            }

            if self.schedule.max_cycles.is_some_and(|max| cycle >= max) {
                continue;
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("Shutdown requested, stopping after cycle {}", cycle);
                    break;
                }
                _ = tokio::time::sleep(self.schedule.cycle_interval) => {}
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            "Feeder stopped after {} cycles ({} fetch failures, {} rows upserted)",
            snapshot.cycles, snapshot.fetch_failures, snapshot.rows_upserted
        );
        snapshot
    }

    /// Execute one full cycle without any shutdown handling.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.stats.cycles.load(Ordering::Relaxed) + 1;
        let started = Instant::now();
        let fetched = self.source.fetch().await;
        let report = self.complete_cycle(cycle, fetched, started).await;
        self.log_report(&report);
        report
    }

    async fn complete_cycle(
        &self,
        cycle: u64,
        fetched: Result<Vec<TickerQuote>, FeedError>,
        started: Instant,
    ) -> CycleReport {
        let mut report = match fetched {
            Ok(quotes) => self.process(quotes).await,
            Err(e) => {
                warn!("[cycle {}] {} fetch failed ({}): {}", cycle, self.source.source_name(), e.kind(), e);
                CycleReport {
                    fetch_error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        report.cycle = cycle;
        report.duration = started.elapsed();
        self.stats.record(&report);
        report
    }

    async fn process(&self, quotes: Vec<TickerQuote>) -> CycleReport {
        let mut report = CycleReport {
            fetched: quotes.len(),
            ..Default::default()
        };

        // Every prior-price read happens before the single write below
        let mut staged: Vec<PriceUpdate> = Vec::with_capacity(quotes.len());
        for quote in &quotes {
            let Some(pair) = self.classifier.classify(&quote.symbol) else {
                report.unrecognized += 1;
                debug!("Skipping unrecognized symbol {}", quote.symbol);
                continue;
            };
            let Some(price) = quote.parse_price() else {
                report.invalid_price += 1;
                debug!("Skipping {} with invalid price {:?}", quote.symbol, quote.price_raw);
                continue;
            };

            // A delta outside Decimal range is bad data, not a cycle failure
            let Some((update, lookup)) = self.deltas.stage(pair, price).await else {
                report.invalid_price += 1;
                continue;
            };
            if lookup == PriorLookup::Failed {
                report.lookup_failures += 1;
            }
            debug!(
                "{:<10} {:<6} => {} | Δ {} ({}%)",
                update.pair.base, update.pair.quote, update.price, update.change, update.change_percent
            );
            staged.push(update);
        }
        report.staged = staged.len();

        match self.store.upsert_batch(&staged, Utc::now()).await {
            Ok(rows) => report.upserted = rows,
            Err(e) => {
                report.write_failed = true;
                error!("Batch upsert of {} pairs failed: {:#}", staged.len(), e);
            }
        }

        for update in &staged {
            let key = update.pair.cache_key();
            match self.cache.mirror(&key, &update.price).await {
                Ok(()) => report.cached += 1,
                Err(e) => {
                    report.cache_failures += 1;
                    warn!("Cache mirror failed for {}: {:#}", key, e);
                }
            }
            if self.publisher.publish(&key, &update.price) {
                report.published += 1;
            }
        }

        report
    }

    fn log_report(&self, report: &CycleReport) {
        if report.is_skipped() {
            info!(
                "[cycle {}] skipped after {:?}",
                report.cycle, report.duration
            );
            return;
        }
        info!(
            "[cycle {}] fetched={} upserted={} cached={} published={} unrecognized={} invalid={} lookup_failures={} cache_failures={} write_failed={} in {:?}",
            report.cycle,
            report.fetched,
            report.upserted,
            report.cached,
            report.published,
            report.unrecognized,
            report.invalid_price,
            report.lookup_failures,
            report.cache_failures,
            report.write_failed,
            report.duration
        );
    }

    async fn log_stats(&self) {
        let snapshot = self.stats.snapshot();
        let mirrored = match self.cache.entries().await {
            Ok(entries) => entries.len().to_string(),
            Err(e) => {
                warn!("Failed to list cache entries: {:#}", e);
                "unknown".to_string()
            }
        };
        let publisher = self.publisher.stats();
        info!(
            "Feeder stats: cycles={}, fetch_failures={}, rows_upserted={}, write_failures={}, cache_failures={}, mirrored_keys={}, events_published={}, events_dropped={}",
            snapshot.cycles,
            snapshot.fetch_failures,
            snapshot.rows_upserted,
            snapshot.write_failures,
            snapshot.cache_failures,
            mirrored,
            publisher.published,
            publisher.dropped
        );
    }
}

/// Resolves once `true` is sent. A dropped sender never resolves, so losing
/// the signal handler does not stop the feeder.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_skipped_cycle() {
        let stats = FeederStats::default();
        stats.record(&CycleReport {
            fetch_error: Some("timeout".to_string()),
            staged: 5,
            ..Default::default()
        });
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.fetch_failures, 1);
        assert_eq!(snapshot.pairs_staged, 0);
    }

    #[test]
    fn test_stats_accumulate() {
        let stats = FeederStats::default();
        let report = CycleReport {
            staged: 3,
            upserted: 3,
            unrecognized: 2,
            cache_failures: 1,
            ..Default::default()
        };
        stats.record(&report);
        stats.record(&report);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles, 2);
        assert_eq!(snapshot.rows_upserted, 6);
        assert_eq!(snapshot.unrecognized_symbols, 4);
        assert_eq!(snapshot.cache_failures, 2);
        assert_eq!(snapshot.write_failures, 0);
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_ignores_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(50), wait_for_shutdown(&mut rx)).await;
        assert!(waited.is_err());
    }
}
