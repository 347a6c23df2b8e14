//! Geospatial helpers for item locations
//!
//! Provides great-circle distances between stored coordinates, human-readable
//! distance strings, and display formatting for reverse-geocoded addresses.

use serde::{Deserialize, Serialize};

use crate::config::{
    COORDINATE_DISPLAY_DECIMALS, DISTANCE_DECIMAL_BELOW_KM, DISTANCE_METERS_BELOW_KM,
    EARTH_RADIUS_KM,
};

/// A WGS84 coordinate pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Address fields as returned by a reverse geocoder.
/// Every field is optional; geocoders rarely fill them all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub name: Option<String>,
    pub street: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Great-circle distance between two points in kilometres (haversine)
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Format a distance in kilometres for display.
///
/// Sub-kilometre distances are shown in whole metres, short distances with
/// one decimal, and anything from 10 km up as whole kilometres.
pub fn format_distance(km: f64) -> String {
    if km < DISTANCE_METERS_BELOW_KM {
        format!("{:.0} m", km * 1000.0)
    } else if km < DISTANCE_DECIMAL_BELOW_KM {
        format!("{:.1} km", km)
    } else {
        format!("{:.0} km", km)
    }
}

/// Format a reverse-geocoded address for display.
///
/// Joins the populated fields in priority order (name, street, locality,
/// state, country). Falls back to raw coordinates when the geocoder
/// returned nothing usable.
pub fn format_address(address: &GeocodedAddress, point: GeoPoint) -> String {
    let parts: Vec<&str> = [
        &address.name,
        &address.street,
        &address.locality,
        &address.state,
        &address.country,
    ]
    .into_iter()
    .filter_map(|part| part.as_deref())
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect();

    if parts.is_empty() {
        format!(
            "{:.prec$}, {:.prec$}",
            point.latitude,
            point.longitude,
            prec = COORDINATE_DISPLAY_DECIMALS
        )
    } else {
        parts.join(", ")
    }
}
