use async_trait::async_trait;
use natal_core::{
    AspectKind, BirthEvent, CelestialBody, ChartError, EphemerisSource, ErrorKind, GeoCoordinate,
    Geocoder, NatalChartEngine, RenderOptions, ResolvedInstant, Result, TimezoneLookup,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Gazetteer(HashMap<&'static str, (f64, f64)>);

#[async_trait]
impl Geocoder for Gazetteer {
    async fn geocode(&self, place: &str) -> Result<GeoCoordinate> {
        match self.0.get(place) {
            Some(&(lat, lon)) => GeoCoordinate::new(lat, lon),
            None => Err(ChartError::LocationNotFound {
                place: place.to_string(),
            }),
        }
    }
}

struct FixedZone(Option<&'static str>);

impl TimezoneLookup for FixedZone {
    fn timezone_at(&self, _: GeoCoordinate) -> Option<String> {
        self.0.map(str::to_string)
    }
}

/// Serves fixed longitudes and records the instant it was asked about.
#[derive(Default)]
struct Almanac {
    longitudes: HashMap<CelestialBody, f64>,
    seen: Arc<Mutex<Vec<ResolvedInstant>>>,
}

impl Almanac {
    fn with(entries: &[(CelestialBody, f64)]) -> Self {
        Almanac {
            longitudes: entries.iter().copied().collect(),
            seen: Arc::default(),
        }
    }
}

#[async_trait]
impl EphemerisSource for Almanac {
    async fn ecliptic_longitude(
        &self,
        body: CelestialBody,
        instant: ResolvedInstant,
        _: GeoCoordinate,
    ) -> Result<f64> {
        self.seen.lock().unwrap().push(instant);
        self.longitudes
            .get(&body)
            .copied()
            .ok_or_else(|| ChartError::EphemerisUnavailable {
                body,
                reason: "masked value".to_string(),
            })
    }
}

fn gazetteer() -> Gazetteer {
    Gazetteer(HashMap::from([
        ("Calicut", (11.2588, 75.7804)),
        ("Null Island", (0.0, 0.0)),
    ]))
}

fn full_sky() -> Vec<(CelestialBody, f64)> {
    CelestialBody::ALL
        .iter()
        .enumerate()
        .map(|(i, body)| (*body, 7.0 + 33.0 * i as f64))
        .collect()
}

fn small_render() -> RenderOptions {
    RenderOptions {
        size_px: 256,
        ..RenderOptions::default()
    }
}

#[tokio::test]
async fn full_chart_for_a_known_place() {
    let almanac = Almanac::with(&full_sky());
    let seen = Arc::clone(&almanac.seen);
    let engine = NatalChartEngine::new(gazetteer(), FixedZone(Some("Asia/Kolkata")), almanac)
        .with_render_options(small_render())
        .with_max_concurrency(4);

    let event = BirthEvent::new(18, 6, 1991, 7, 10, "Calicut").unwrap();
    let chart = engine.compute(&event).await.unwrap();

    assert_eq!(chart.positions.len(), 10);
    assert!(chart.unavailable.is_empty());
    assert_eq!(chart.report.lines().count(), 11);
    assert!(chart.report.contains("Sun: Aries 7.00°"));
    assert!(!chart.report.contains("unavailable"));
    assert_eq!(
        chart.instant.utc.to_rfc3339(),
        "1991-06-18T01:40:00+00:00"
    );
    assert_eq!((chart.image.width(), chart.image.height()), (256, 256));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 10);
    assert!(seen.iter().all(|instant| *instant == chart.instant));

    let decoded = image::load_from_memory(chart.image.as_png()).unwrap();
    assert_eq!(decoded.width(), 256);
}

#[tokio::test]
async fn missing_body_is_reported_not_fatal() {
    let mut sky = full_sky();
    sky.retain(|(body, _)| *body != CelestialBody::Neptune);

    let engine = NatalChartEngine::new(gazetteer(), FixedZone(None), Almanac::with(&sky))
        .with_render_options(small_render());
    let event = BirthEvent::new(1, 1, 2000, 12, 0, "Null Island").unwrap();
    let chart = engine.compute(&event).await.unwrap();

    assert!(chart.report.contains("Neptune: unavailable"));
    assert_eq!(chart.unavailable.len(), 1);
    assert_eq!(chart.unavailable[0].0, CelestialBody::Neptune);
    assert!(chart
        .aspects
        .iter()
        .all(|a| a.body_a != CelestialBody::Neptune && a.body_b != CelestialBody::Neptune));
    assert!(chart
        .placements()
        .iter()
        .any(|(body, placement)| *body == CelestialBody::Neptune && placement.is_none()));
}

#[tokio::test]
async fn sun_moon_square_end_to_end() {
    let engine = NatalChartEngine::new(
        gazetteer(),
        FixedZone(None),
        Almanac::with(&[(CelestialBody::Sun, 10.0), (CelestialBody::Moon, 100.0)]),
    )
    .with_render_options(small_render());
    let event = BirthEvent::new(1, 1, 2000, 12, 0, "Null Island").unwrap();
    let chart = engine.compute(&event).await.unwrap();

    assert_eq!(chart.aspects.len(), 1);
    let aspect = chart.aspects[0];
    assert_eq!(
        (aspect.body_a, aspect.body_b, aspect.kind),
        (CelestialBody::Sun, CelestialBody::Moon, AspectKind::Square)
    );
    assert_eq!(chart.unavailable.len(), 8);
}

#[tokio::test]
async fn no_ephemeris_data_still_produces_a_chart() {
    let engine = NatalChartEngine::new(gazetteer(), FixedZone(None), Almanac::default())
        .with_render_options(small_render());
    let event = BirthEvent::new(1, 1, 2000, 12, 0, "Null Island").unwrap();
    let chart = engine.compute(&event).await.unwrap();

    assert!(chart.positions.is_empty());
    assert!(chart.aspects.is_empty());
    assert_eq!(chart.report.matches("unavailable").count(), 10);
}

#[tokio::test]
async fn timezone_fallback_uses_utc() {
    let almanac = Almanac::with(&full_sky());
    let engine = NatalChartEngine::new(gazetteer(), FixedZone(None), almanac)
        .with_render_options(small_render());
    let event = BirthEvent::new(18, 6, 1991, 7, 10, "Null Island").unwrap();
    let chart = engine.compute(&event).await.unwrap();
    assert_eq!(chart.instant.utc.to_rfc3339(), "1991-06-18T07:10:00+00:00");
}

#[tokio::test]
async fn unknown_place_aborts_the_pipeline() {
    let engine = NatalChartEngine::new(gazetteer(), FixedZone(None), Almanac::with(&full_sky()));
    let event = BirthEvent::new(1, 1, 2000, 12, 0, "Atlantis").unwrap();
    let err = engine.compute(&event).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LocationNotFound);
    assert!(err.to_string().contains("Atlantis"));
}

#[tokio::test]
async fn dst_gap_is_a_distinct_failure() {
    let almanac = Almanac::with(&full_sky());
    let engine = NatalChartEngine::new(gazetteer(), FixedZone(Some("America/New_York")), almanac);
    let event = BirthEvent::new(14, 3, 2021, 2, 30, "Null Island").unwrap();
    let err = engine.compute(&event).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimezoneNonexistent);
}

#[tokio::test]
async fn render_failure_keeps_the_report() {
    let engine = NatalChartEngine::new(gazetteer(), FixedZone(None), Almanac::with(&full_sky()))
        .with_render_options(RenderOptions {
            size_px: 1,
            ..RenderOptions::default()
        });
    let event = BirthEvent::new(1, 1, 2000, 12, 0, "Null Island").unwrap();

    match engine.compute(&event).await {
        Err(ChartError::Render {
            report: Some(report),
            ..
        }) => assert!(report.starts_with("Planet positions:")),
        other => panic!("expected a render failure with report, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_invocations_are_independent() {
    let make = |lon: f64| {
        NatalChartEngine::new(
            gazetteer(),
            FixedZone(None),
            Almanac::with(&[(CelestialBody::Sun, lon), (CelestialBody::Moon, lon + 180.0)]),
        )
        .with_render_options(small_render())
    };
    let (a, b) = (make(0.0), make(45.0));
    let event = BirthEvent::new(1, 1, 2000, 12, 0, "Null Island").unwrap();

    let (first, second) = tokio::join!(a.compute(&event), b.compute(&event));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.report.contains("Sun: Aries 0.00°"));
    assert!(second.report.contains("Sun: Taurus 15.00°"));
    assert_ne!(first.image, second.image);

    let again = make(0.0).compute(&event).await.unwrap();
    assert_eq!(again.image, first.image);
}
