//! Optional record decoration
//!
//! This module holds the narrow contracts the pipeline consumes from external
//! services, with HTTP implementations:
//! - `TextEmbedder`: text → normalized vectors for menu items (no-op by default)
//! - `GeoResolver`: address → coordinates, used only as a location fallback
//!
//! Failures here never abort persistence; callers log them and keep the
//! undecorated record.

mod embedder;
mod geocode;

pub use embedder::{
    item_text, l2_normalize, EmbedError, HttpEmbedder, MenuEnricher, NoopEmbedder, TextEmbedder,
};
pub use geocode::{GeoError, GeoResolver, HttpGeoResolver};
