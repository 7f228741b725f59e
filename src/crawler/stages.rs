//! Discovery stages
//!
//! Work flows through a fixed chain of typed stages:
//! `Discoverer` (city → category paths) → `FeedFetcher` (category → new store ids)
//! → `StoreFetcher` (store id → payload) → `RecordBuilder` → enrichment → sink.
//!
//! Each stage consumes one `WorkItem` and either emits follow-up work items or
//! persists a record. Retry and drop decisions belong to the coordinator.

use crate::crawler::fetcher::{fetch_page, post_json, StageError};
use crate::crawler::parser::{extract_category_paths, extract_store_ids, FEED_ELEMENT_INDEX};
use crate::enrich::MenuEnricher;
use crate::output::RunStats;
use crate::record::{FailureRecord, LabeledRecord, RecordBuilder};
use crate::state::DedupSet;
use crate::storage::{persist, RecordSink, SinkError};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

/// One unit of discovery work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    /// Extract category paths from a city page
    City { seed: String },

    /// Fetch the store list of one category
    Category { label: String, path: String },

    /// Fetch and persist one store
    Store { label: String, store_id: String },
}

/// A work item with its retry bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub work: Work,

    /// Failures recorded so far for this request
    pub failures: u32,

    /// Scheduling priority; higher runs first
    pub priority: i32,
}

impl WorkItem {
    pub fn new(work: Work) -> Self {
        Self {
            work,
            failures: 0,
            priority: 0,
        }
    }

    pub fn city(seed: impl Into<String>) -> Self {
        Self::new(Work::City { seed: seed.into() })
    }

    /// Stage name stored in failure records
    pub fn stage(&self) -> &'static str {
        match self.work {
            Work::City { .. } => "discover",
            Work::Category { .. } => "feed",
            Work::Store { .. } => "store",
        }
    }

    /// Label carried to every record this work item produces
    pub fn label(&self) -> &str {
        match &self.work {
            Work::City { seed } => seed,
            Work::Category { label, .. } | Work::Store { label, .. } => label,
        }
    }

    /// The seed, category path or store id this item is about
    pub fn identifier(&self) -> &str {
        match &self.work {
            Work::City { seed } => seed,
            Work::Category { path, .. } => path,
            Work::Store { store_id, .. } => store_id,
        }
    }

    /// Priority change applied on retry
    ///
    /// Store retries sink below fresh discovery work so a burst of failing
    /// stores cannot starve new categories.
    pub fn retry_priority_adjustment(&self) -> i32 {
        match self.work {
            Work::City { .. } | Work::Category { .. } => 0,
            Work::Store { .. } => -1,
        }
    }

    /// The same request, rescheduled after a failure
    pub fn retried(&self, failures: u32, priority_adjustment: i32) -> Self {
        Self {
            work: self.work.clone(),
            failures,
            priority: self.priority + priority_adjustment,
        }
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.stage(), self.identifier())
    }
}

/// Marketplace URLs derived from the configured site root
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    fn join(&self, path: &str) -> String {
        self.base
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.base, path.trim_start_matches('/')))
    }

    pub fn city_url(&self, seed: &str) -> String {
        self.join(&format!("city/{}", seed))
    }

    pub fn feed_url(&self) -> String {
        self.join("api/getSeoFeedV1")
    }

    pub fn store_url(&self) -> String {
        self.join("api/getStoreV1")
    }
}

pub fn feed_request(path: &str) -> Value {
    json!({ "pathname": path })
}

pub fn store_request(store_id: &str) -> Value {
    json!({ "storeUuid": store_id })
}

/// City seed → category paths
#[derive(Clone)]
pub struct Discoverer {
    client: Client,
    endpoints: Arc<Endpoints>,
}

impl Discoverer {
    pub fn new(client: Client, endpoints: Arc<Endpoints>) -> Self {
        Self { client, endpoints }
    }

    /// Fetches the city page and extracts its category paths
    ///
    /// A page without the category block is an application failure for
    /// that city only.
    pub async fn discover(&self, seed: &str) -> Result<Vec<String>, StageError> {
        let url = self.endpoints.city_url(seed);
        let html = fetch_page(&self.client, &url).await?;

        extract_category_paths(&html).ok_or_else(|| StageError::Application {
            message: format!("no category links found on {}", url),
            body: None,
        })
    }
}

/// Store ids found in one category feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Ids that passed the dedup gate, in feed order
    pub new_stores: Vec<String>,

    /// Ids already dispatched earlier in the run
    pub duplicates: usize,
}

/// Category path → store ids not yet seen this run
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
    endpoints: Arc<Endpoints>,
    dedup: Arc<DedupSet>,
}

impl FeedFetcher {
    pub fn new(client: Client, endpoints: Arc<Endpoints>, dedup: Arc<DedupSet>) -> Self {
        Self {
            client,
            endpoints,
            dedup,
        }
    }

    /// Fetches the category feed and passes each id through the dedup gate
    ///
    /// Each id is returned by at most one call per run, however many
    /// categories list it and however the calls interleave.
    pub async fn fetch(&self, path: &str) -> Result<FeedOutcome, StageError> {
        let response = post_json(
            &self.client,
            &self.endpoints.feed_url(),
            &feed_request(path),
        )
        .await?;

        let ids = extract_store_ids(&response).ok_or_else(|| {
            StageError::Malformed(format!(
                "feed for {} has no data.elements[{}].feedItems",
                path, FEED_ELEMENT_INDEX
            ))
        })?;

        let mut outcome = FeedOutcome::default();
        for id in ids {
            if self.dedup.insert(&id) {
                outcome.new_stores.push(id);
            } else {
                outcome.duplicates += 1;
            }
        }
        Ok(outcome)
    }
}

/// A store-detail payload and when it was fetched
#[derive(Debug, Clone)]
pub struct StorePayload {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
}

/// Store id → raw store payload
#[derive(Clone)]
pub struct StoreFetcher {
    client: Client,
    endpoints: Arc<Endpoints>,
}

impl StoreFetcher {
    pub fn new(client: Client, endpoints: Arc<Endpoints>) -> Self {
        Self { client, endpoints }
    }

    pub async fn fetch(&self, store_id: &str) -> Result<StorePayload, StageError> {
        let response = post_json(
            &self.client,
            &self.endpoints.store_url(),
            &store_request(store_id),
        )
        .await?;

        match response.get("data") {
            Some(data) if data.is_object() => Ok(StorePayload {
                data: data.clone(),
                fetched_at: Utc::now(),
            }),
            _ => Err(StageError::Malformed(format!(
                "store {} response has no data object",
                store_id
            ))),
        }
    }
}

/// Result of running one work item
#[derive(Debug, Default)]
pub struct StageOutcome {
    pub follow_ups: Vec<WorkItem>,
    pub error: Option<StageError>,
}

/// The wired-up stage chain shared by every in-flight work item
pub struct Pipeline {
    endpoints: Arc<Endpoints>,
    discoverer: Discoverer,
    feeds: FeedFetcher,
    stores: StoreFetcher,
    builder: RecordBuilder,
    enricher: MenuEnricher,
    sink: Arc<dyn RecordSink>,
    stats: Arc<RunStats>,
}

impl Pipeline {
    pub fn new(
        client: Client,
        endpoints: Endpoints,
        dedup: Arc<DedupSet>,
        enricher: MenuEnricher,
        sink: Arc<dyn RecordSink>,
        stats: Arc<RunStats>,
    ) -> Self {
        let endpoints = Arc::new(endpoints);
        Self {
            discoverer: Discoverer::new(client.clone(), Arc::clone(&endpoints)),
            feeds: FeedFetcher::new(client.clone(), Arc::clone(&endpoints), dedup),
            stores: StoreFetcher::new(client, Arc::clone(&endpoints)),
            endpoints,
            builder: RecordBuilder::new(),
            enricher,
            sink,
            stats,
        }
    }

    pub fn sink(&self) -> &Arc<dyn RecordSink> {
        &self.sink
    }

    /// Runs one work item through its stage
    pub async fn execute(&self, item: &WorkItem) -> StageOutcome {
        let result = match &item.work {
            Work::City { seed } => self.run_city(seed).await,
            Work::Category { label, path } => self.run_category(label, path).await,
            Work::Store { label, store_id } => self.run_store(label, store_id).await,
        };

        match result {
            Ok(follow_ups) => StageOutcome {
                follow_ups,
                error: None,
            },
            Err(error) => StageOutcome {
                follow_ups: Vec::new(),
                error: Some(error),
            },
        }
    }

    async fn run_city(&self, seed: &str) -> Result<Vec<WorkItem>, StageError> {
        let paths = self.discoverer.discover(seed).await?;
        tracing::info!("City {}: {} categories", seed, paths.len());

        RunStats::incr(&self.stats.cities_crawled);
        RunStats::add(&self.stats.categories_discovered, paths.len() as u64);

        Ok(paths
            .into_iter()
            .map(|path| {
                WorkItem::new(Work::Category {
                    label: seed.to_string(),
                    path,
                })
            })
            .collect())
    }

    async fn run_category(&self, label: &str, path: &str) -> Result<Vec<WorkItem>, StageError> {
        let outcome = self.feeds.fetch(path).await?;
        tracing::debug!(
            "Category {}: {} new stores, {} already seen",
            path,
            outcome.new_stores.len(),
            outcome.duplicates
        );

        RunStats::add(&self.stats.stores_dispatched, outcome.new_stores.len() as u64);
        RunStats::add(&self.stats.duplicates_skipped, outcome.duplicates as u64);

        Ok(outcome
            .new_stores
            .into_iter()
            .map(|store_id| {
                WorkItem::new(Work::Store {
                    label: label.to_string(),
                    store_id,
                })
            })
            .collect())
    }

    async fn run_store(&self, label: &str, store_id: &str) -> Result<Vec<WorkItem>, StageError> {
        let payload = self.stores.fetch(store_id).await?;
        let mut restaurant = self
            .builder
            .build(&payload.data, payload.fetched_at)
            .map_err(|e| StageError::Malformed(format!("store {}: {}", store_id, e)))?;

        if self.enricher.is_enabled() {
            match self.enricher.enrich(&mut restaurant).await {
                Ok(count) => tracing::trace!("Embedded {} items for store {}", count, store_id),
                Err(e) => {
                    tracing::warn!("Enrichment failed for store {}: {}", store_id, e);
                    RunStats::incr(&self.stats.enrichment_failures);
                }
            }
        }

        let mut record = LabeledRecord::restaurant(label, restaurant);
        match persist(self.sink.as_ref(), &mut record).await {
            Ok(()) => {
                tracing::debug!("Persisted store {} under {}", store_id, label);
                RunStats::incr(&self.stats.records_persisted);
            }
            Err(SinkError::Precondition(e)) => {
                tracing::warn!("Rejected store {}: {}", store_id, e);
                RunStats::incr(&self.stats.records_rejected);
            }
            Err(e) => {
                tracing::error!("Failed to persist store {}: {}", store_id, e);
                RunStats::incr(&self.stats.records_rejected);
            }
        }

        Ok(Vec::new())
    }

    /// Diagnostic context for a work item that is being dropped
    pub fn failure_record(&self, item: &WorkItem, error: &StageError, attempts: u32) -> FailureRecord {
        let (url, request) = match &item.work {
            Work::City { seed } => (self.endpoints.city_url(seed), None),
            Work::Category { path, .. } => (self.endpoints.feed_url(), Some(feed_request(path))),
            Work::Store { store_id, .. } => {
                (self.endpoints.store_url(), Some(store_request(store_id)))
            }
        };

        FailureRecord {
            stage: item.stage().to_string(),
            reason: error.reason().to_string(),
            url: Some(url),
            body: error.body().cloned().or(request),
            identifier: Some(item.identifier().to_string()),
            attempts,
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let endpoints = Endpoints::new("https://www.ubereats.com").unwrap();
        assert_eq!(
            endpoints.city_url("berkeley-ca"),
            "https://www.ubereats.com/city/berkeley-ca"
        );
        assert_eq!(
            endpoints.feed_url(),
            "https://www.ubereats.com/api/getSeoFeedV1"
        );

        let nested = Endpoints::new("http://127.0.0.1:8080/mirror").unwrap();
        assert_eq!(
            nested.store_url(),
            "http://127.0.0.1:8080/mirror/api/getStoreV1"
        );
    }

    #[test]
    fn test_retry_lowers_store_priority_cumulatively() {
        let item = WorkItem::new(Work::Store {
            label: "berkeley-ca".to_string(),
            store_id: "abc".to_string(),
        });
        let once = item.retried(1, item.retry_priority_adjustment());
        let twice = once.retried(2, once.retry_priority_adjustment());
        assert_eq!(once.priority, -1);
        assert_eq!(twice.priority, -2);
        assert_eq!(twice.failures, 2);

        let category = WorkItem::new(Work::Category {
            label: "berkeley-ca".to_string(),
            path: "/category/berkeley-ca/pizza".to_string(),
        });
        assert_eq!(
            category
                .retried(1, category.retry_priority_adjustment())
                .priority,
            0
        );
    }

    #[test]
    fn test_work_item_accessors() {
        let item = WorkItem::city("berkeley-ca");
        assert_eq!(item.stage(), "discover");
        assert_eq!(item.label(), "berkeley-ca");
        assert_eq!(item.identifier(), "berkeley-ca");
        assert_eq!(item.describe(), "discover berkeley-ca");
    }
}
