use tracing::debug;

use crate::{Aspect, AspectKind, BodyPositions, CelestialBody};

/// Orb applied to every canonical angle unless configured otherwise.
pub const DEFAULT_ORB_DEGREES: f64 = 6.0;

/// Smaller arc between two longitudes, in `[0, 180]`.
pub fn angular_separation(a: f64, b: f64) -> f64 {
    let arc = (a - b).abs() % 360.0;
    arc.min(360.0 - arc)
}

/// Classifies pairs of bodies against [`AspectKind::ALL`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AspectDetector {
    orb: f64,
}

impl Default for AspectDetector {
    fn default() -> Self {
        AspectDetector {
            orb: DEFAULT_ORB_DEGREES,
        }
    }
}

impl AspectDetector {
    pub fn with_orb(orb: f64) -> Self {
        AspectDetector { orb: orb.abs() }
    }

    pub fn orb(&self) -> f64 {
        self.orb
    }

    /// First canonical angle whose band holds `separation`.
    ///
    /// Angles are tried in [`AspectKind::ALL`] order and the first match wins,
    /// even when a later angle is numerically closer.
    pub fn classify(&self, separation: f64) -> Option<AspectKind> {
        AspectKind::ALL
            .iter()
            .copied()
            .find(|kind| (separation - kind.angle()).abs() <= self.orb)
    }

    /// Aspects among the present bodies, pairs enumerated in canonical body order.
    pub fn detect(&self, positions: &BodyPositions) -> Vec<Aspect> {
        let present: Vec<(CelestialBody, f64)> = positions.iter().collect();
        let mut aspects = Vec::new();

        for (i, &(body_a, lon_a)) in present.iter().enumerate() {
            for &(body_b, lon_b) in &present[i + 1..] {
                let separation = angular_separation(lon_a, lon_b);
                if let Some(kind) = self.classify(separation) {
                    debug!(%body_a, %body_b, separation, %kind, "aspect found");
                    aspects.push(Aspect {
                        body_a,
                        body_b,
                        kind,
                    });
                }
            }
        }

        aspects
    }
}

/// [`AspectDetector::detect`] with the default orb.
pub fn detect_aspects(positions: &BodyPositions) -> Vec<Aspect> {
    AspectDetector::default().detect(positions)
}
