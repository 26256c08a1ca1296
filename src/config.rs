use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chart::{RenderOptions, RotationConvention, MAX_SIZE_PX, MIN_SIZE_PX};
use crate::{AspectDetector, ChartError, Result, DEFAULT_ORB_DEGREES};

pub const DEFAULT_GEOCODER_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = "natal_chart_bot";
pub const DEFAULT_HORIZONS_ENDPOINT: &str = "https://ssd.jpl.nasa.gov/api/horizons.api";
// Horizons throttles bursts from one address.
const DEFAULT_MAX_CONCURRENCY: usize = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IMAGE_SIZE: u32 = 800;

/// Settings for one natal chart engine. Every field has a default, so an
/// empty TOML file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub geocoder: GeocoderConfig,
    pub ephemeris: EphemerisConfig,
    pub http: HttpConfig,
    pub aspects: AspectConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig {
            endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EphemerisConfig {
    pub endpoint: String,
    /// Upper bound on simultaneous per-body queries.
    pub max_concurrency: usize,
}

impl Default for EphemerisConfig {
    fn default() -> Self {
        EphemerisConfig {
            endpoint: DEFAULT_HORIZONS_ENDPOINT.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AspectConfig {
    pub orb_degrees: f64,
}

impl Default for AspectConfig {
    fn default() -> Self {
        AspectConfig {
            orb_degrees: DEFAULT_ORB_DEGREES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub size_px: u32,
    pub rotation: RotationConvention,
    /// TrueType/OpenType font used for sign and body glyphs.
    pub font_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            size_px: DEFAULT_IMAGE_SIZE,
            rotation: RotationConvention::default(),
            font_path: None,
        }
    }
}

impl ChartConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| ChartError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ChartConfig =
            toml::from_str(text).map_err(|e| ChartError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.aspects.orb_degrees.is_finite() || self.aspects.orb_degrees < 0.0 {
            return Err(ChartError::Config(format!(
                "aspect orb must be a non-negative number, got {}",
                self.aspects.orb_degrees
            )));
        }
        if !(MIN_SIZE_PX..=MAX_SIZE_PX).contains(&self.render.size_px) {
            return Err(ChartError::Config(format!(
                "render.size_px must be within {MIN_SIZE_PX}..={MAX_SIZE_PX}, got {}",
                self.render.size_px
            )));
        }
        if self.http.timeout_secs == 0 {
            return Err(ChartError::Config("http.timeout_secs must be positive".to_string()));
        }
        if self.geocoder.user_agent.trim().is_empty() {
            return Err(ChartError::Config("geocoder.user_agent must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn max_concurrency(&self) -> usize {
        self.ephemeris.max_concurrency.max(1)
    }

    pub fn aspect_detector(&self) -> AspectDetector {
        AspectDetector::with_orb(self.aspects.orb_degrees)
    }

    /// Loads the configured font, if any, into render options.
    pub fn render_options(&self) -> Result<RenderOptions> {
        let mut options = RenderOptions {
            size_px: self.render.size_px,
            rotation: self.render.rotation,
            ..RenderOptions::default()
        };
        if let Some(path) = &self.render.font_path {
            let bytes = fs::read(path)?;
            options = options.with_font_bytes(bytes)?;
        }
        Ok(options)
    }
}
