//! Run counters and document store statistics
//!
//! `RunStats` is shared by every in-flight work item of a run and logged
//! periodically and at the end. `StoreStatistics` backs the `--stats` report.

use crate::storage::{DocumentStoreSink, SinkResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one crawl run
#[derive(Debug, Default)]
pub struct RunStats {
    pub seeds_accepted: AtomicU64,
    pub seeds_skipped: AtomicU64,
    pub cities_crawled: AtomicU64,
    pub categories_discovered: AtomicU64,
    pub stores_dispatched: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub records_persisted: AtomicU64,
    pub records_rejected: AtomicU64,
    pub retries_scheduled: AtomicU64,
    pub failures_recorded: AtomicU64,
    pub enrichment_failures: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to a counter
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn snapshot(&self) -> RunSummary {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RunSummary {
            seeds_accepted: get(&self.seeds_accepted),
            seeds_skipped: get(&self.seeds_skipped),
            cities_crawled: get(&self.cities_crawled),
            categories_discovered: get(&self.categories_discovered),
            stores_dispatched: get(&self.stores_dispatched),
            duplicates_skipped: get(&self.duplicates_skipped),
            records_persisted: get(&self.records_persisted),
            records_rejected: get(&self.records_rejected),
            retries_scheduled: get(&self.retries_scheduled),
            failures_recorded: get(&self.failures_recorded),
            enrichment_failures: get(&self.enrichment_failures),
        }
    }
}

/// Point-in-time copy of `RunStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub seeds_accepted: u64,
    pub seeds_skipped: u64,
    pub cities_crawled: u64,
    pub categories_discovered: u64,
    pub stores_dispatched: u64,
    pub duplicates_skipped: u64,
    pub records_persisted: u64,
    pub records_rejected: u64,
    pub retries_scheduled: u64,
    pub failures_recorded: u64,
    pub enrichment_failures: u64,
}

impl RunSummary {
    /// Logs the summary at info level
    pub fn log(&self) {
        tracing::info!(
            "Seeds: {} accepted, {} skipped; {} cities crawled",
            self.seeds_accepted,
            self.seeds_skipped,
            self.cities_crawled
        );
        tracing::info!(
            "Discovery: {} categories, {} stores dispatched, {} duplicates skipped",
            self.categories_discovered,
            self.stores_dispatched,
            self.duplicates_skipped
        );
        tracing::info!(
            "Persistence: {} records written, {} rejected, {} retries, {} failure records",
            self.records_persisted,
            self.records_rejected,
            self.retries_scheduled,
            self.failures_recorded
        );
        if self.enrichment_failures > 0 {
            tracing::warn!(
                "{} stores were persisted without embeddings",
                self.enrichment_failures
            );
        }
    }
}

/// Document store contents summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub total_stores: u64,
    pub stores_by_label: Vec<(String, u64)>,
    pub failures: u64,
}

/// Loads statistics from the document store
pub fn load_statistics(store: &DocumentStoreSink) -> SinkResult<StoreStatistics> {
    Ok(StoreStatistics {
        total_stores: store.count()?,
        stores_by_label: store.count_by_label()?,
        failures: store.count_failures()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Overview:");
    println!("  Total stores: {}", stats.total_stores);
    println!("  Labels: {}", stats.stores_by_label.len());
    println!("  Failure records: {}", stats.failures);
    println!();

    if !stats.stores_by_label.is_empty() {
        println!("Stores by Label:");
        let mut counts: Vec<_> = stats.stores_by_label.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (label, count) in counts {
            let percentage = if stats.total_stores > 0 {
                (*count as f64 / stats.total_stores as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", label, count, percentage);
        }
        println!();
    }
}
