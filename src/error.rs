use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::CelestialBody;

pub type Result<T> = std::result::Result<T, ChartError>;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("place {place:?} was not found")]
    LocationNotFound { place: String },

    #[error("geocoding {place:?} failed: {reason}")]
    Geocoding { place: String, reason: String },

    #[error("local time {local} does not exist in {timezone} (DST gap)")]
    TimezoneNonexistent { local: String, timezone: String },

    #[error("local time {local} is ambiguous in {timezone}: {earliest} or {latest}")]
    TimezoneAmbiguous {
        local: String,
        timezone: String,
        earliest: String,
        latest: String,
    },

    #[error("no ephemeris data for {body}: {reason}")]
    EphemerisUnavailable { body: CelestialBody, reason: String },

    /// Rendering failed after the textual report was built; the report is kept.
    #[error("chart rendering failed: {reason}")]
    Render { report: Option<String>, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stable tag for a [`ChartError`], for callers that branch on the failure class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    LocationNotFound,
    Geocoding,
    TimezoneNonexistent,
    TimezoneAmbiguous,
    EphemerisUnavailable,
    Render,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::LocationNotFound => "location_not_found",
            ErrorKind::Geocoding => "geocoding",
            ErrorKind::TimezoneNonexistent => "timezone_nonexistent",
            ErrorKind::TimezoneAmbiguous => "timezone_ambiguous",
            ErrorKind::EphemerisUnavailable => "ephemeris_unavailable",
            ErrorKind::Render => "render",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChartError::InvalidInput(_) => ErrorKind::InvalidInput,
            ChartError::LocationNotFound { .. } => ErrorKind::LocationNotFound,
            ChartError::Geocoding { .. } => ErrorKind::Geocoding,
            ChartError::TimezoneNonexistent { .. } => ErrorKind::TimezoneNonexistent,
            ChartError::TimezoneAmbiguous { .. } => ErrorKind::TimezoneAmbiguous,
            ChartError::EphemerisUnavailable { .. } => ErrorKind::EphemerisUnavailable,
            ChartError::Render { .. } => ErrorKind::Render,
            ChartError::Config(_) => ErrorKind::Config,
            ChartError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn ephemeris(body: CelestialBody, reason: impl Into<String>) -> Self {
        ChartError::EphemerisUnavailable {
            body,
            reason: reason.into(),
        }
    }

    pub(crate) fn render(reason: impl fmt::Display) -> Self {
        ChartError::Render {
            report: None,
            reason: reason.to_string(),
        }
    }

    /// Attaches the already computed report to a render failure.
    pub(crate) fn with_report(self, text: &str) -> Self {
        match self {
            ChartError::Render { reason, .. } => ChartError::Render {
                report: Some(text.to_string()),
                reason,
            },
            other => other,
        }
    }
}
