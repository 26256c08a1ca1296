//! Structured logging setup.
//!
//! Events go to stderr so that stdout carries only the chart report.

use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::{ChartError, Result};

const DEFAULT_FILTER: &str = "natal_core=info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output (development)
    #[default]
    Pretty,
    /// One JSON object per event (production)
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            format: LogFormat::default(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Installs the global subscriber. A second call fails instead of panicking.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(config.env_filter())
        .try_init()
        .map_err(|e| ChartError::Config(format!("logging already initialised: {e}")))
}
