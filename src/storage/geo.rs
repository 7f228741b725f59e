//! Location derivation and distance math for the document store

use crate::enrich::GeoResolver;
use crate::record::{GeoPoint, Location};

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;
const METERS_PER_DEGREE_LATITUDE: f64 = 111_320.0;

/// Derives the stored `geo` point for a store location
///
/// Reported coordinates win. Otherwise the address is resolved; a resolver
/// error or an unknown address falls back to `[0, 0]`. Resolver failures are
/// logged and never surface to the caller.
pub async fn derive_geo(location: &Location, resolver: Option<&dyn GeoResolver>) -> GeoPoint {
    if let (Some(latitude), Some(longitude)) = (location.latitude, location.longitude) {
        return GeoPoint::new(longitude, latitude);
    }

    let (Some(resolver), Some(address)) = (resolver, location.address.as_deref()) else {
        return GeoPoint::origin();
    };

    match resolver.resolve(address).await {
        Ok(Some(point)) => point,
        Ok(None) => {
            tracing::warn!("Geocoder found nothing for '{}', using [0, 0]", address);
            GeoPoint::origin()
        }
        Err(e) => {
            tracing::warn!("Geocoder failed for '{}': {}, using [0, 0]", address, e);
            GeoPoint::origin()
        }
    }
}

/// Great-circle distance between two points
pub fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude().to_radians(), b.latitude().to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Latitude/longitude box containing every point within `radius_meters` of `center`
///
/// Returns `(min_lat, max_lat, min_lon, max_lon)`. Longitude spans the whole
/// globe when the box would cross the antimeridian or reach a pole.
pub fn bounding_box(center: &GeoPoint, radius_meters: f64) -> (f64, f64, f64, f64) {
    let dlat = radius_meters / METERS_PER_DEGREE_LATITUDE;
    let min_lat = (center.latitude() - dlat).max(-90.0);
    let max_lat = (center.latitude() + dlat).min(90.0);

    let cos_lat = center.latitude().to_radians().cos();
    if cos_lat <= f64::EPSILON || min_lat <= -90.0 || max_lat >= 90.0 {
        return (min_lat, max_lat, -180.0, 180.0);
    }

    let dlon = radius_meters / (METERS_PER_DEGREE_LATITUDE * cos_lat);
    let (min_lon, max_lon) = (center.longitude() - dlon, center.longitude() + dlon);
    if min_lon < -180.0 || max_lon > 180.0 {
        return (min_lat, max_lat, -180.0, 180.0);
    }

    (min_lat, max_lat, min_lon, max_lon)
}
