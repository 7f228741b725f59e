//! Menu-Harvest: a food-delivery marketplace store crawler
//!
//! This crate walks a marketplace's city → category → store link chain,
//! builds one canonical record per store (location, hours, categories, menu,
//! reviews) and persists it to per-label files or to a geospatially indexed
//! document store, optionally decorating menu items with text embeddings.

pub mod config;
pub mod crawler;
pub mod enrich;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Menu-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Seed list error for {path}: {message}")]
    Seeds { path: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("Enrichment setup error: {0}")]
    Enrich(#[from] enrich::EmbedError),

    #[error("Geocoder setup error: {0}")]
    Geocoder(#[from] enrich::GeoError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Menu-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use record::{LabeledRecord, MenuItem, RecordData, Restaurant};
pub use state::{DedupSet, RetryPolicy};
pub use storage::RecordSink;
