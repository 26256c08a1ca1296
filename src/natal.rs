use std::fmt::Write as _;
use tracing::info;

use crate::chart::{render_chart, ChartArtifact, RenderOptions};
use crate::config::ChartConfig;
use crate::ephemeris::{positions_for, EphemerisSource};
use crate::horizons::HorizonsClient;
use crate::location::{Geocoder, NominatimGeocoder};
use crate::timezone::{resolve_instant, TimezoneLookup, TzfLookup};
use crate::{
    Aspect, AspectDetector, BirthEvent, BodyPositions, CelestialBody, GeoCoordinate,
    ResolvedInstant, Result, ZodiacPlacement,
};

pub const REPORT_HEADER: &str = "Planet positions:";
pub const UNAVAILABLE_MARKER: &str = "unavailable";

/// Everything computed for one birth event.
#[derive(Debug, Clone)]
pub struct NatalChart {
    pub coordinate: GeoCoordinate,
    pub instant: ResolvedInstant,
    pub positions: BodyPositions,
    /// Bodies the ephemeris could not resolve, with the reason.
    pub unavailable: Vec<(CelestialBody, String)>,
    pub aspects: Vec<Aspect>,
    pub report: String,
    pub image: ChartArtifact,
}

impl NatalChart {
    pub fn placements(&self) -> Vec<(CelestialBody, Option<ZodiacPlacement>)> {
        CelestialBody::iter()
            .map(|body| {
                let placement = self.positions.get(body).map(ZodiacPlacement::from_longitude);
                (body, placement)
            })
            .collect()
    }
}

/// One line per body in canonical order: sign and degree, or the unavailable marker.
pub fn format_report(positions: &BodyPositions) -> String {
    let mut report = String::from(REPORT_HEADER);
    report.push('\n');
    for body in CelestialBody::iter() {
        match positions.get(body) {
            Some(longitude) => {
                let placement = ZodiacPlacement::from_longitude(longitude);
                let _ = writeln!(report, "{body}: {placement}");
            }
            None => {
                let _ = writeln!(report, "{body}: {UNAVAILABLE_MARKER}");
            }
        }
    }
    report
}

pub fn format_aspects(aspects: &[Aspect]) -> String {
    let mut text = String::new();
    for aspect in aspects {
        let _ = writeln!(text, "{aspect}");
    }
    text
}

/// The full pipeline: place, timezone, ephemeris, aspects, rendering.
pub struct NatalChartEngine {
    geocoder: Box<dyn Geocoder>,
    timezones: Box<dyn TimezoneLookup>,
    ephemeris: Box<dyn EphemerisSource>,
    detector: AspectDetector,
    render: RenderOptions,
    max_concurrency: usize,
}

impl NatalChartEngine {
    pub fn new(
        geocoder: impl Geocoder + 'static,
        timezones: impl TimezoneLookup + 'static,
        ephemeris: impl EphemerisSource + 'static,
    ) -> Self {
        NatalChartEngine {
            geocoder: Box::new(geocoder),
            timezones: Box::new(timezones),
            ephemeris: Box::new(ephemeris),
            detector: AspectDetector::default(),
            render: RenderOptions::default(),
            max_concurrency: 1,
        }
    }

    /// Engine backed by Nominatim, the tzf boundary data and JPL Horizons.
    pub fn from_config(config: &ChartConfig) -> Result<Self> {
        config.validate()?;
        let engine = NatalChartEngine::new(
            NominatimGeocoder::new(&config.geocoder, &config.http)?,
            TzfLookup::new(),
            HorizonsClient::new(&config.ephemeris, &config.http)?,
        )
        .with_detector(config.aspect_detector())
        .with_render_options(config.render_options()?)
        .with_max_concurrency(config.max_concurrency());
        Ok(engine)
    }

    pub fn with_detector(mut self, detector: AspectDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render = options;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Computes the chart for `event`.
    ///
    /// Missing ephemeris data for some bodies degrades the report instead of
    /// failing. A render failure returns [`crate::ChartError::Render`] carrying the report.
    #[tracing::instrument(skip(self, event), fields(place = %event.place_name))]
    pub async fn compute(&self, event: &BirthEvent) -> Result<NatalChart> {
        let local = event.naive_datetime()?;
        let coordinate = self.geocoder.geocode(&event.place_name).await?;
        let instant = resolve_instant(self.timezones.as_ref(), coordinate, local)?;

        let outcome = positions_for(
            self.ephemeris.as_ref(),
            &CelestialBody::ALL,
            instant,
            coordinate,
            self.max_concurrency,
        )
        .await;

        let aspects = self.detector.detect(&outcome.positions);
        let report = format_report(&outcome.positions);
        let image = render_chart(&outcome.positions, &aspects, &self.render)
            .map_err(|e| e.with_report(&report))?;

        info!(
            bodies = outcome.positions.len(),
            aspects = aspects.len(),
            "natal chart computed"
        );

        Ok(NatalChart {
            coordinate,
            instant,
            positions: outcome.positions,
            unavailable: outcome.unavailable,
            aspects,
            report,
            image,
        })
    }
}

/// Builds a production engine from `config` and computes one chart.
pub async fn compute_natal_chart(event: &BirthEvent, config: &ChartConfig) -> Result<NatalChart> {
    NatalChartEngine::from_config(config)?.compute(event).await
}
