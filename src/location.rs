use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use urlencoding::encode;

use crate::config::{GeocoderConfig, HttpConfig};
use crate::{ChartError, GeoCoordinate, Result};

/// Resolves a free-form place name to coordinates.
///
/// A service that answers but finds nothing must return
/// [`ChartError::LocationNotFound`]; transport problems are
/// [`ChartError::Geocoding`].
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, place: &str) -> Result<GeoCoordinate>;
}

/// OpenStreetMap Nominatim search client.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(http.timeout())
            .build()
            .map_err(|e| ChartError::Config(format!("cannot build geocoder client: {e}")))?;
        Ok(NominatimGeocoder {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    fn search_url(&self, place: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1",
            self.endpoint,
            encode(place)
        )
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[tracing::instrument(skip(self))]
    async fn geocode(&self, place: &str) -> Result<GeoCoordinate> {
        let failed = |reason: String| ChartError::Geocoding {
            place: place.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.search_url(place))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        let coordinate = parse_search_response(place, &body)?;
        info!(
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            "place resolved"
        );
        Ok(coordinate)
    }
}

/// Extracts the best match from a Nominatim `format=json` search body.
pub fn parse_search_response(place: &str, body: &str) -> Result<GeoCoordinate> {
    let failed = |reason: String| ChartError::Geocoding {
        place: place.to_string(),
        reason,
    };

    let matches: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| failed(format!("malformed response: {e}")))?;
    let best = matches.into_iter().next().ok_or_else(|| ChartError::LocationNotFound {
        place: place.to_string(),
    })?;
    debug!(display_name = ?best.display_name, "best geocoding match");

    let latitude: f64 = best
        .lat
        .trim()
        .parse()
        .map_err(|e| failed(format!("bad latitude {:?}: {e}", best.lat)))?;
    let longitude: f64 = best
        .lon
        .trim()
        .parse()
        .map_err(|e| failed(format!("bad longitude {:?}: {e}", best.lon)))?;

    GeoCoordinate::new(latitude, longitude).map_err(|e| failed(e.to_string()))
}
