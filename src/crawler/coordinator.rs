//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Seeding the frontier with accepted city seeds
//! - Dispatching work items to concurrent tasks
//! - Applying the retry policy to failed work items
//! - Recording exactly one failure record per dropped request
//! - Closing the sink on every exit path

use crate::config::{load_seeds, Config, EmbedderConfig, SeedSelection};
use crate::crawler::fetcher::{build_http_client, user_agent_string, StageError};
use crate::crawler::scheduler::{Dispatch, ScheduledWork, Scheduler};
use crate::crawler::stages::{Endpoints, Pipeline, StageOutcome, WorkItem};
use crate::enrich::{GeoResolver, HttpEmbedder, HttpGeoResolver, MenuEnricher};
use crate::output::{RunStats, RunSummary};
use crate::record::LabeledRecord;
use crate::state::{DedupSet, RetryDecision, RetryPolicy};
use crate::storage::{open_sink, persist, RecordSink};
use crate::HarvestError;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Number of completed work items between progress reports
const PROGRESS_INTERVAL: u64 = 50;

/// Main crawler coordinator structure
pub struct Coordinator {
    pipeline: Arc<Pipeline>,
    scheduler: Scheduler,
    retry: RetryPolicy,
    dedup: Arc<DedupSet>,
    stats: Arc<RunStats>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `sink` - Destination for store and failure records
    /// * `enricher` - Menu enrichment, `MenuEnricher::disabled()` to skip it
    pub fn new(
        config: &Config,
        sink: Arc<dyn RecordSink>,
        enricher: MenuEnricher,
    ) -> Result<Self, HarvestError> {
        let timeout = Duration::from_secs(config.crawler.request_timeout_secs);
        let client = build_http_client(&config.user_agent, timeout)?;
        let endpoints = Endpoints::new(&config.api.base_url)?;

        let dedup = Arc::new(DedupSet::new());
        let stats = Arc::new(RunStats::new());
        let pipeline = Pipeline::new(
            client,
            endpoints,
            Arc::clone(&dedup),
            enricher,
            sink,
            Arc::clone(&stats),
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            scheduler: Scheduler::new(
                config.crawler.max_concurrent_requests as usize,
                Duration::from_millis(config.crawler.minimum_request_interval_ms),
            ),
            retry: RetryPolicy::new(
                config.crawler.max_attempts,
                Duration::from_millis(config.crawler.retry_backoff_ms),
            ),
            dedup,
            stats,
        })
    }

    /// Queues one city work item per accepted seed, in seed order
    pub fn seed(&mut self, selection: &SeedSelection) {
        RunStats::add(&self.stats.seeds_accepted, selection.accepted.len() as u64);
        RunStats::add(&self.stats.seeds_skipped, selection.skipped.len() as u64);

        for seed in &selection.accepted {
            self.scheduler.push(WorkItem::city(seed.as_str()));
        }
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Store ids dispatched so far this run
    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// Runs until no work is queued or in flight, then closes the sink
    ///
    /// The sink is closed even when the loop fails.
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        tracing::info!(
            "Starting crawl with {} queued work items",
            self.scheduler.frontier_size()
        );

        let result = self.drive().await;
        let closed = self.pipeline.sink().close().await;

        result?;
        closed?;

        let summary = self.stats.snapshot();
        summary.log();
        Ok(summary)
    }

    async fn drive(&mut self) -> Result<(), HarvestError> {
        let mut tasks: JoinSet<(WorkItem, StageOutcome)> = JoinSet::new();
        let start_time = Instant::now();
        let mut completed: u64 = 0;

        loop {
            // Start everything the scheduler allows right now
            let mut wait = None;
            loop {
                match self.scheduler.next_ready(Instant::now()) {
                    Dispatch::Ready(scheduled) => {
                        let pipeline = Arc::clone(&self.pipeline);
                        tasks.spawn(async move {
                            let ScheduledWork { item, permit } = scheduled;
                            let outcome = pipeline.execute(&item).await;
                            drop(permit);
                            (item, outcome)
                        });
                    }
                    Dispatch::Wait(duration) => {
                        wait = Some(duration);
                        break;
                    }
                    Dispatch::Saturated | Dispatch::Empty => break,
                }
            }

            let joined = match (tasks.is_empty(), wait) {
                (true, None) => break,
                (true, Some(duration)) => {
                    tokio::time::sleep(duration).await;
                    continue;
                }
                (false, None) => tasks.join_next().await,
                (false, Some(duration)) => tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = tokio::time::sleep(duration) => continue,
                },
            };

            let Some(joined) = joined else {
                continue;
            };
            let (item, outcome) = joined?;
            self.handle_outcome(item, outcome).await;

            completed += 1;
            if completed % PROGRESS_INTERVAL == 0 {
                let elapsed = start_time.elapsed();
                tracing::info!(
                    "Progress: {} work items done, {} queued, {} in flight, {} stores persisted, {:.2} items/sec",
                    completed,
                    self.scheduler.frontier_size(),
                    tasks.len(),
                    self.stats.snapshot().records_persisted,
                    completed as f64 / elapsed.as_secs_f64()
                );
            }
        }

        tracing::info!(
            "Frontier exhausted: {} work items in {:?}",
            completed,
            start_time.elapsed()
        );
        Ok(())
    }

    /// Queues follow-up work and applies the retry policy to a failure
    async fn handle_outcome(&mut self, item: WorkItem, outcome: StageOutcome) {
        for follow_up in outcome.follow_ups {
            self.scheduler.push(follow_up);
        }

        let Some(error) = outcome.error else {
            return;
        };

        if !error.is_retryable() {
            tracing::warn!("{} failed: {}; not retrying", item.describe(), error);
            self.record_drop(&item, &error, item.failures + 1).await;
            return;
        }

        match self
            .retry
            .decide(item.failures, item.retry_priority_adjustment())
        {
            RetryDecision::Retry {
                attempt,
                priority_adjustment,
                delay,
            } => {
                tracing::warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    item.describe(),
                    error,
                    attempt,
                    self.retry.max_attempts() - 1,
                    delay
                );
                RunStats::incr(&self.stats.retries_scheduled);
                self.scheduler
                    .push_delayed(item.retried(attempt, priority_adjustment), delay);
            }
            RetryDecision::Drop { attempts } => {
                tracing::error!(
                    "Dropping {} after {} attempts: {}",
                    item.describe(),
                    attempts,
                    error
                );
                self.record_drop(&item, &error, attempts).await;
            }
        }
    }

    async fn record_drop(&self, item: &WorkItem, error: &StageError, attempts: u32) {
        let failure = self.pipeline.failure_record(item, error, attempts);
        let mut record = LabeledRecord::failure(failure);

        match persist(self.pipeline.sink().as_ref(), &mut record).await {
            Ok(()) => RunStats::incr(&self.stats.failures_recorded),
            Err(e) => tracing::error!(
                "Failed to record failure for {}: {}",
                item.describe(),
                e
            ),
        }
    }
}

/// Builds the menu enricher described by the optional `[embedder]` section
pub fn build_enricher(
    config: Option<&EmbedderConfig>,
    timeout: Duration,
) -> Result<MenuEnricher, HarvestError> {
    match config {
        Some(embedder_config) => {
            let embedder = HttpEmbedder::from_config(embedder_config, timeout)?;
            tracing::info!(
                "Menu enrichment enabled with model {}",
                embedder_config.model
            );
            Ok(MenuEnricher::from_config(embedder_config, Arc::new(embedder)))
        }
        None => Ok(MenuEnricher::disabled()),
    }
}

/// Builds the address resolver described by the optional `[geocoder]` section
pub fn build_resolver(config: &Config) -> Result<Option<Arc<dyn GeoResolver>>, HarvestError> {
    let Some(geocoder) = &config.geocoder else {
        return Ok(None);
    };

    let resolver = HttpGeoResolver::new(
        &geocoder.endpoint,
        &user_agent_string(&config.user_agent),
        Duration::from_secs(config.crawler.request_timeout_secs),
    )?;
    Ok(Some(Arc::new(resolver)))
}

/// Runs a complete crawl from configuration
///
/// The seed list and the sink are opened before any work is scheduled;
/// failing to open either aborts the run.
pub async fn run_crawl(config: &Config) -> Result<RunSummary, HarvestError> {
    let seeds = load_seeds(&config.seeds)?;
    tracing::info!(
        "Loaded {} seeds ({} skipped by region allow-list)",
        seeds.accepted.len(),
        seeds.skipped.len()
    );
    if seeds.accepted.is_empty() {
        tracing::warn!("No seeds accepted; nothing to crawl");
    }

    let resolver = build_resolver(config)?;
    let enricher = build_enricher(
        config.embedder.as_ref(),
        Duration::from_secs(config.crawler.request_timeout_secs),
    )?;
    let sink = open_sink(&config.output, Utc::now(), resolver)?;

    let mut coordinator = Coordinator::new(config, sink, enricher)?;
    coordinator.seed(&seeds);
    coordinator.run().await
}
