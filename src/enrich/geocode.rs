use crate::record::GeoPoint;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocoder returned an unusable coordinate: {0}")]
    InvalidCoordinate(String),
}

/// Address → coordinate lookup
///
/// `Ok(None)` means the address is unknown to the resolver.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, GeoError>;
}

/// Resolver for Nominatim-compatible `search` endpoints
#[derive(Clone)]
pub struct HttpGeoResolver {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

impl HttpGeoResolver {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, address: &str) -> Result<Option<GeoPoint>, GeoError> {
        let hits: Vec<SearchHit> = self
            .client
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let latitude: f64 = hit
            .lat
            .parse()
            .map_err(|_| GeoError::InvalidCoordinate(hit.lat.clone()))?;
        let longitude: f64 = hit
            .lon
            .parse()
            .map_err(|_| GeoError::InvalidCoordinate(hit.lon.clone()))?;

        Ok(Some(GeoPoint::new(longitude, latitude)))
    }
}
