use serde::Deserialize;

/// Main configuration structure for Menu-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub api: ApiConfig,
    pub seeds: SeedConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub geocoder: Option<GeocoderConfig>,
    #[serde(default)]
    pub embedder: Option<EmbedderConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of in-flight work items
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Number of consecutive application failures after which a request is dropped
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base backoff before a retried request becomes eligible again (milliseconds)
    #[serde(rename = "retry-backoff-ms", default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Minimum time between two dispatched requests (milliseconds)
    #[serde(rename = "minimum-request-interval-ms", default)]
    pub minimum_request_interval_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Marketplace endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Site root, e.g. `https://www.ubereats.com`
    #[serde(rename = "base-url")]
    pub base_url: String,
}

/// City seed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Path to the JSON seed list
    pub path: String,

    /// Region codes whose cities are crawled; empty accepts every region
    #[serde(rename = "allowed-regions", default)]
    pub allowed_regions: Vec<String>,
}

/// Which `RecordSink` implementation a run persists through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    Ndjson,
    JsonArray,
    DocumentStore,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Selected sink variant
    pub sink: SinkKind,

    /// Directory for the file sinks; each run writes into a timestamped subdirectory
    #[serde(default)]
    pub directory: Option<String>,

    /// Path to the SQLite document store
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}

/// Address → coordinate fallback lookup
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    /// Search endpoint of a Nominatim-compatible geocoder
    pub endpoint: String,
}

/// Optional menu-item embedding enrichment
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedderConfig {
    /// OpenAI-compatible API root (the client posts to `<endpoint>/embeddings`)
    pub endpoint: String,

    /// Embedding model name
    pub model: String,

    /// Environment variable holding the API key, if the endpoint needs one
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,

    /// Number of texts per embedding request
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of words of each item text sent to the model
    #[serde(rename = "word-budget", default = "default_word_budget")]
    pub word_budget: usize,

    /// Embed `title + description` instead of the title alone
    #[serde(rename = "include-description", default = "default_true")]
    pub include_description: bool,
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    32
}

fn default_word_budget() -> usize {
    20
}

fn default_true() -> bool {
    true
}
