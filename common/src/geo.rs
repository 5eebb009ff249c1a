//! Coordinates, great-circle distance, and Google Maps pin extraction.

use serde::{Deserialize, Serialize};
use url::Url;

pub const MEAN_EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// The form a coordinates annotation takes in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCoordinates {
    pub google_maps_url: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl StoredCoordinates {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Returns None for anything that is not a stored coordinates object,
    /// including the "not available" marker.
    pub fn parse(value: &str) -> Option<Self> {
        serde_json::from_str(value).ok()
    }

    pub fn to_value(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Haversine distance in meters.
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let sin_dlat = ((b.latitude - a.latitude).to_radians() / 2.0).sin();
    let sin_dlon = ((b.longitude - a.longitude).to_radians() / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    MEAN_EARTH_RADIUS_METERS * c
}

/// Extract the pin position from a Google Maps place url.
///
/// The pin lives in the `data=` path segment as `!3d<latitude>!4d<longitude>`.
/// The `@lat,lng` part is the map center, not the pin, so it is ignored.
pub fn coordinates_from_google_maps_url(input: &str) -> Option<Coordinates> {
    let url = Url::parse(input.trim()).ok()?;
    let data = url
        .path_segments()?
        .find(|segment| segment.starts_with("data"))?;

    let find_number = |prefix: &str| -> Option<f64> {
        data.split('!')
            .find_map(|part| part.strip_prefix(prefix))
            .and_then(|number| number.parse::<f64>().ok())
            .filter(|number| number.is_finite())
    };

    let coordinates = Coordinates {
        latitude: find_number("3d")?,
        longitude: find_number("4d")?,
    };
    coordinates.is_in_range().then_some(coordinates)
}
