//! Run-scoped crawl state
//!
//! This module provides the state shared by all in-flight work of one crawl run.
//!
//! # Components
//!
//! - `DedupSet`: store identifiers already dispatched for a detail fetch
//! - `RetryPolicy`: the bounded retry/drop state machine for failing requests

mod dedup;
mod retry;

// Re-export main types
pub use dedup::DedupSet;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
