use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// External geocoding collaborator. The core caches results indefinitely but
/// treats the cache as best-effort, never authoritative.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, country: &str, city: &str) -> Result<Coordinates, Error>;
}

/// Deterministic in-memory geocoder for tests and local runs.
pub struct StaticGeocoder {
    places: HashMap<(String, String), Coordinates>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self {
            places: HashMap::new(),
        }
    }

    pub fn with_place(mut self, country: &str, city: &str, lat: f64, lon: f64) -> Self {
        self.places
            .insert((country.to_uppercase(), city.to_lowercase()), Coordinates { lat, lon });
        self
    }
}

impl Default for StaticGeocoder {
    fn default() -> Self {
        Self::new()
            .with_place("UZ", "tashkent", 41.2995, 69.2401)
            .with_place("UZ", "samarkand", 39.6542, 66.9597)
            .with_place("KZ", "almaty", 43.2389, 76.8897)
            .with_place("RU", "moscow", 55.7558, 37.6173)
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn resolve(&self, country: &str, city: &str) -> Result<Coordinates, Error> {
        self.places
            .get(&(country.to_uppercase(), city.to_lowercase()))
            .copied()
            .ok_or_else(|| {
                Error::ExternalServiceUnavailable(format!("geocoder has no entry for {city}, {country}"))
            })
    }
}
