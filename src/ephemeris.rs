use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{BodyPositions, CelestialBody, ChartError, GeoCoordinate, ResolvedInstant, Result};

/// Apparent ecliptic longitude of one body as seen from an observer.
///
/// Implementations return [`ChartError::EphemerisUnavailable`] when the
/// service has no value for the body at that epoch.
#[async_trait]
pub trait EphemerisSource: Send + Sync {
    async fn ecliptic_longitude(
        &self,
        body: CelestialBody,
        instant: ResolvedInstant,
        observer: GeoCoordinate,
    ) -> Result<f64>;
}

/// Longitudes that could be resolved, plus the bodies that could not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EphemerisOutcome {
    pub positions: BodyPositions,
    /// Bodies without data, in canonical order, with the reason.
    pub unavailable: Vec<(CelestialBody, String)>,
}

/// Queries every body independently, at most `max_concurrency` at a time.
///
/// A failure for one body never affects the others: it is recorded in
/// [`EphemerisOutcome::unavailable`] and the body is left out of the positions.
#[tracing::instrument(skip(source, bodies), fields(bodies = bodies.len()))]
pub async fn positions_for(
    source: &dyn EphemerisSource,
    bodies: &[CelestialBody],
    instant: ResolvedInstant,
    observer: GeoCoordinate,
    max_concurrency: usize,
) -> EphemerisOutcome {
    let mut wanted = bodies.to_vec();
    wanted.sort();
    wanted.dedup();

    let results: Vec<(CelestialBody, Result<f64>)> = stream::iter(wanted)
        .map(|body| async move {
            debug!(%body, "querying ephemeris");
            (body, source.ecliptic_longitude(body, instant, observer).await)
        })
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await;

    let mut outcome = EphemerisOutcome::default();
    for (body, result) in results {
        let reason = match result {
            Ok(longitude) => {
                if outcome.positions.insert(body, longitude) {
                    continue;
                }
                format!("non-finite longitude {longitude}")
            }
            Err(ChartError::EphemerisUnavailable { reason, .. }) => reason,
            Err(other) => other.to_string(),
        };
        warn!(%body, %reason, "ephemeris data unavailable");
        outcome.unavailable.push((body, reason));
    }
    outcome.unavailable.sort_by_key(|(body, _)| *body);

    info!(
        resolved = outcome.positions.len(),
        unavailable = outcome.unavailable.len(),
        "ephemeris stage finished"
    );
    outcome
}
