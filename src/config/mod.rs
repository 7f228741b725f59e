//! Configuration module for Menu-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and reading the city seed list the configuration points at.
//!
//! # Example
//!
//! ```no_run
//! use menu_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will retry up to {} times", config.crawler.max_attempts);
//! ```

mod parser;
mod seeds;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, Config, CrawlerConfig, EmbedderConfig, GeocoderConfig, OutputConfig, SeedConfig,
    SinkKind, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use seeds::{load_seeds, parse_seeds, seed_region, select_seeds, SeedSelection};
