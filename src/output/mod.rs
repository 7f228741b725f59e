//! Output module for run reporting
//!
//! This module handles:
//! - Counting what a run discovered, persisted, retried and dropped
//! - Summarizing the document store for the `--stats` report
//! - Printing nearest-store query results

pub mod stats;

pub use stats::{load_statistics, print_statistics, RunStats, RunSummary, StoreStatistics};

use crate::storage::NearbyDocument;

/// Prints nearest-store query results to stdout, nearest first
pub fn print_nearby(results: &[NearbyDocument]) {
    if results.is_empty() {
        println!("No stores found within the given radius");
        return;
    }

    println!("=== Nearest Stores ===\n");
    for (rank, hit) in results.iter().enumerate() {
        let address = hit
            .restaurant
            .location
            .address
            .as_deref()
            .unwrap_or("(no address)");
        println!(
            "{:>3}. {} [{}] {:.0} m",
            rank + 1,
            hit.restaurant.name,
            hit.label,
            hit.distance_meters
        );
        println!("     {}", address);
        if let Some(url) = &hit.restaurant.store_url {
            println!("     {}", url);
        }
    }
}
