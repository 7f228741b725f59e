//! Crawler module for store discovery
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and failure classification
//! - City-page and feed-response extraction
//! - Priority scheduling with retry backoff and politeness limits
//! - The typed discovery stages (city → category → store)
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod stages;

pub use coordinator::{build_enricher, build_resolver, run_crawl, Coordinator};
pub use fetcher::{
    build_http_client, fetch_page, post_json, user_agent_string, StageError, FAILURE_STATUS,
};
pub use parser::{
    extract_category_paths, extract_store_ids, CATEGORY_LINK_SELECTOR, CATEGORY_SENTINEL_INDEX,
    FEED_ELEMENT_INDEX,
};
pub use scheduler::{Dispatch, ScheduledWork, Scheduler};
pub use stages::{
    Discoverer, Endpoints, FeedFetcher, FeedOutcome, Pipeline, StageOutcome, StoreFetcher,
    StorePayload, Work, WorkItem,
};

use crate::config::Config;
use crate::output::RunSummary;
use crate::HarvestError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load the seed list and apply the region allow-list
/// 2. Open the configured sink
/// 3. Build the HTTP client and optional enrichment
/// 4. Walk cities, categories and stores until the frontier is exhausted
/// 5. Close the sink and report run statistics
pub async fn crawl(config: &Config) -> Result<RunSummary, HarvestError> {
    run_crawl(config).await
}
