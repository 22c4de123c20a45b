//! Nominatim HTTP adapter for address geocoding.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::Coordinate;
use crate::traits::Geocoder;

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no match for address '{address}'")]
    NotFound { address: String },
    #[error("geocoder returned an invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    /// Nominatim rejects requests without an identifying agent.
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("pallet-router/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    config: GeocoderConfig,
    client: reqwest::blocking::Client,
}

impl NominatimGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self, GeocodingError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, address: &str) -> Result<Coordinate, GeocodingError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let results: Vec<NominatimPlace> = self
            .client
            .get(url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .and_then(|resp| resp.error_for_status())?
            .json()?;

        let place = results.into_iter().next().ok_or_else(|| GeocodingError::NotFound {
            address: address.to_string(),
        })?;
        debug!(address, display_name = %place.display_name, "geocoded address");
        place.coordinate()
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl NominatimPlace {
    fn coordinate(&self) -> Result<Coordinate, GeocodingError> {
        let parse = |text: &str| {
            text.trim().parse::<f64>().map_err(|_| {
                GeocodingError::InvalidCoordinate(format!("{}, {}", self.lat, self.lon))
            })
        };
        let point = Coordinate::new(parse(&self.lat)?, parse(&self.lon)?);
        point
            .validate()
            .map_err(|err| GeocodingError::InvalidCoordinate(err.to_string()))?;
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_payload() {
        let body = r#"[{"lat": "41.8781136", "lon": "-87.6297982",
            "display_name": "Chicago, Cook County, Illinois"}]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let point = places[0].coordinate().unwrap();
        assert!((point.lat - 41.8781136).abs() < 1e-9);
        assert!((point.lon + 87.6297982).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_coordinates() {
        let place = NominatimPlace {
            lat: "north".to_string(),
            lon: "-87.6".to_string(),
            display_name: String::new(),
        };
        assert!(matches!(place.coordinate(), Err(GeocodingError::InvalidCoordinate(_))));

        let out_of_range = NominatimPlace {
            lat: "95.0".to_string(),
            lon: "0.0".to_string(),
            display_name: String::new(),
        };
        assert!(matches!(out_of_range.coordinate(), Err(GeocodingError::InvalidCoordinate(_))));
    }

    #[test]
    fn builds_client_with_defaults() {
        let config = GeocoderConfig::default();
        assert!(config.user_agent.starts_with("pallet-router/"));
        assert!(NominatimGeocoder::new(config).is_ok());
    }
}
