// JPL Horizons observer-table client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use urlencoding::encode;

use crate::config::{EphemerisConfig, HttpConfig};
use crate::ephemeris::EphemerisSource;
use crate::{CelestialBody, ChartError, GeoCoordinate, ResolvedInstant, Result};

/// Observer ecliptic longitude and latitude.
const QUANTITIES: &str = "31";
const MASKED: &str = "n.a.";

#[derive(Debug, Deserialize)]
struct HorizonsResponse {
    #[serde(default)]
    signature: Option<Signature>,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Signature {
    source: String,
    version: String,
}

#[derive(Debug, Clone)]
pub struct HorizonsClient {
    client: Client,
    endpoint: String,
}

impl HorizonsClient {
    pub fn new(config: &EphemerisConfig, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout())
            .build()
            .map_err(|e| ChartError::Config(format!("cannot build Horizons client: {e}")))?;
        Ok(HorizonsClient {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Topocentric observer table for a single epoch, one quantity, CSV rows.
    fn query_url(
        &self,
        body: CelestialBody,
        instant: ResolvedInstant,
        observer: GeoCoordinate,
    ) -> String {
        let command = format!("'{}'", body.horizons_id());
        let site = format!("'{},{},0'", observer.longitude, observer.latitude);
        let epoch = format!("'{:.6}'", instant.julian_day());

        format!(
            "{}?format=json&COMMAND={}&OBJ_DATA='NO'&MAKE_EPHEM='YES'&EPHEM_TYPE='OBSERVER'&CENTER={}&COORD_TYPE='GEODETIC'&SITE_COORD={}&TLIST={}&TIME_TYPE='UT'&QUANTITIES={}&CSV_FORMAT='YES'&ANG_FORMAT='DEG'",
            self.endpoint,
            encode(&command),
            encode("'coord@399'"),
            encode(&site),
            encode(&epoch),
            encode(&format!("'{QUANTITIES}'")),
        )
    }
}

#[async_trait]
impl EphemerisSource for HorizonsClient {
    #[tracing::instrument(skip(self))]
    async fn ecliptic_longitude(
        &self,
        body: CelestialBody,
        instant: ResolvedInstant,
        observer: GeoCoordinate,
    ) -> Result<f64> {
        let unavailable = |reason: String| ChartError::ephemeris(body, reason);

        let response = self
            .client
            .get(self.query_url(body, instant, observer))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!(
                "HTTP request failed with status: {}",
                response.status()
            )));
        }

        let horizons: HorizonsResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed response: {e}")))?;
        if let Some(signature) = &horizons.signature {
            debug!(source = %signature.source, version = %signature.version, "Horizons answered");
        }
        if let Some(error) = horizons.error {
            return Err(unavailable(error));
        }

        let longitude = parse_ecliptic_longitude(&horizons.result).map_err(unavailable)?;
        debug!(longitude, "ecliptic longitude parsed");
        Ok(longitude)
    }
}

/// Reads the observer ecliptic longitude from the first `$$SOE` row of a
/// CSV observer table. Masked (`n.a.`) values and missing rows are errors.
pub fn parse_ecliptic_longitude(result: &str) -> std::result::Result<f64, String> {
    let lines: Vec<&str> = result.lines().collect();
    let soe = lines.iter().position(|line| line.contains("$$SOE"));
    let eoe = lines.iter().position(|line| line.contains("$$EOE"));

    let (Some(soe), Some(eoe)) = (soe, eoe) else {
        return Err("ephemeris data markers not found".to_string());
    };

    let row = lines
        .get(soe + 1..eoe)
        .and_then(|rows| rows.iter().find(|line| !line.trim().is_empty()))
        .ok_or_else(|| "ephemeris table is empty".to_string())?;

    // Skip the date column; solar/lunar presence flags are never numeric.
    for field in row.split(',').skip(1).map(str::trim) {
        if field == MASKED {
            return Err("ecliptic longitude is masked".to_string());
        }
        if let Ok(value) = field.parse::<f64>() {
            if value.is_finite() {
                return Ok(value);
            }
        }
    }

    Err(format!("no ecliptic longitude in row {:?}", row.trim()))
}
