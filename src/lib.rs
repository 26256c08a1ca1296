// src/lib.rs

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod aspects;
pub mod chart;
pub mod config;
pub mod ephemeris;
pub mod error;
pub mod horizons;
pub mod location;
pub mod logging;
pub mod natal;
pub mod timezone;
pub mod zodiac;

pub use aspects::{angular_separation, detect_aspects, AspectDetector, DEFAULT_ORB_DEGREES};
pub use chart::{render_chart, ChartArtifact, RenderOptions, RotationConvention};
pub use config::ChartConfig;
pub use ephemeris::{positions_for, EphemerisOutcome, EphemerisSource};
pub use error::{ChartError, ErrorKind, Result};
pub use horizons::HorizonsClient;
pub use location::{Geocoder, NominatimGeocoder};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use natal::{compute_natal_chart, format_report, NatalChart, NatalChartEngine};
pub use timezone::{resolve_instant, TimezoneLookup, TzfLookup};
pub use zodiac::ZodiacPlacement;

/// Oldest birth date, in whole years, accepted by [`BirthEvent::parse`].
pub const MAX_AGE_YEARS: i32 = 120;

// ---------------------------
// ## Enumerations
// ---------------------------

/// The ten bodies plotted on a natal chart, in canonical order.
///
/// The declaration order is load-bearing: aspect pairs are enumerated in it
/// and [`BodyPositions`] iterates in it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CelestialBody {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
}

impl CelestialBody {
    pub const ALL: [CelestialBody; 10] = [
        CelestialBody::Sun,
        CelestialBody::Moon,
        CelestialBody::Mercury,
        CelestialBody::Venus,
        CelestialBody::Mars,
        CelestialBody::Jupiter,
        CelestialBody::Saturn,
        CelestialBody::Uranus,
        CelestialBody::Neptune,
        CelestialBody::Pluto,
    ];

    pub fn iter() -> impl Iterator<Item = CelestialBody> {
        Self::ALL.iter().copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CelestialBody::Sun => "Sun",
            CelestialBody::Moon => "Moon",
            CelestialBody::Mercury => "Mercury",
            CelestialBody::Venus => "Venus",
            CelestialBody::Mars => "Mars",
            CelestialBody::Jupiter => "Jupiter",
            CelestialBody::Saturn => "Saturn",
            CelestialBody::Uranus => "Uranus",
            CelestialBody::Neptune => "Neptune",
            CelestialBody::Pluto => "Pluto",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CelestialBody::Sun => "☉",
            CelestialBody::Moon => "☽",
            CelestialBody::Mercury => "☿",
            CelestialBody::Venus => "♀",
            CelestialBody::Mars => "♂",
            CelestialBody::Jupiter => "♃",
            CelestialBody::Saturn => "♄",
            CelestialBody::Uranus => "♅",
            CelestialBody::Neptune => "♆",
            CelestialBody::Pluto => "♇",
        }
    }

    /// JPL Horizons major-body identifier.
    pub fn horizons_id(self) -> u32 {
        match self {
            CelestialBody::Sun => 10,
            CelestialBody::Moon => 301,
            CelestialBody::Mercury => 199,
            CelestialBody::Venus => 299,
            CelestialBody::Mars => 499,
            CelestialBody::Jupiter => 599,
            CelestialBody::Saturn => 699,
            CelestialBody::Uranus => 799,
            CelestialBody::Neptune => 899,
            CelestialBody::Pluto => 999,
        }
    }
}

impl fmt::Display for CelestialBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZodiacSign {
    Aries = 0,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Fire,
    Earth,
    Air,
    Water,
}

impl ZodiacSign {
    /// Signs in ecliptic order; index 0 starts at longitude 0°.
    pub const ALL: [ZodiacSign; 12] = [
        ZodiacSign::Aries,
        ZodiacSign::Taurus,
        ZodiacSign::Gemini,
        ZodiacSign::Cancer,
        ZodiacSign::Leo,
        ZodiacSign::Virgo,
        ZodiacSign::Libra,
        ZodiacSign::Scorpio,
        ZodiacSign::Sagittarius,
        ZodiacSign::Capricorn,
        ZodiacSign::Aquarius,
        ZodiacSign::Pisces,
    ];

    pub fn from_index(index: usize) -> ZodiacSign {
        Self::ALL[index % 12]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ZodiacSign::Aries => "Aries",
            ZodiacSign::Taurus => "Taurus",
            ZodiacSign::Gemini => "Gemini",
            ZodiacSign::Cancer => "Cancer",
            ZodiacSign::Leo => "Leo",
            ZodiacSign::Virgo => "Virgo",
            ZodiacSign::Libra => "Libra",
            ZodiacSign::Scorpio => "Scorpio",
            ZodiacSign::Sagittarius => "Sagittarius",
            ZodiacSign::Capricorn => "Capricorn",
            ZodiacSign::Aquarius => "Aquarius",
            ZodiacSign::Pisces => "Pisces",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ZodiacSign::Aries => "♈",
            ZodiacSign::Taurus => "♉",
            ZodiacSign::Gemini => "♊",
            ZodiacSign::Cancer => "♋",
            ZodiacSign::Leo => "♌",
            ZodiacSign::Virgo => "♍",
            ZodiacSign::Libra => "♎",
            ZodiacSign::Scorpio => "♏",
            ZodiacSign::Sagittarius => "♐",
            ZodiacSign::Capricorn => "♑",
            ZodiacSign::Aquarius => "♒",
            ZodiacSign::Pisces => "♓",
        }
    }

    pub fn element(self) -> Element {
        match self.index() % 4 {
            0 => Element::Fire,
            1 => Element::Earth,
            2 => Element::Air,
            _ => Element::Water,
        }
    }
}

impl fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical aspect angles, in detection priority order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectKind {
    Conjunction,
    SemiSquare,
    Sextile,
    Square,
    Trine,
    Sesquiquadrate,
    Quincunx,
    Opposition,
}

impl AspectKind {
    pub const ALL: [AspectKind; 8] = [
        AspectKind::Conjunction,
        AspectKind::SemiSquare,
        AspectKind::Sextile,
        AspectKind::Square,
        AspectKind::Trine,
        AspectKind::Sesquiquadrate,
        AspectKind::Quincunx,
        AspectKind::Opposition,
    ];

    pub fn angle(self) -> f64 {
        match self {
            AspectKind::Conjunction => 0.0,
            AspectKind::SemiSquare => 45.0,
            AspectKind::Sextile => 60.0,
            AspectKind::Square => 90.0,
            AspectKind::Trine => 120.0,
            AspectKind::Sesquiquadrate => 135.0,
            AspectKind::Quincunx => 150.0,
            AspectKind::Opposition => 180.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AspectKind::Conjunction => "Conjunction",
            AspectKind::SemiSquare => "Semi-square",
            AspectKind::Sextile => "Sextile",
            AspectKind::Square => "Square",
            AspectKind::Trine => "Trine",
            AspectKind::Sesquiquadrate => "Sesquiquadrate",
            AspectKind::Quincunx => "Quincunx",
            AspectKind::Opposition => "Opposition",
        }
    }
}

impl fmt::Display for AspectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------
// ## Structures
// ---------------------------

/// Birth date, local wall-clock time and place name as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthEvent {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub hour: u32,
    pub minute: u32,
    pub place_name: String,
}

impl BirthEvent {
    /// Builds an event, rejecting dates and times that do not exist on the calendar.
    pub fn new(
        day: u32,
        month: u32,
        year: i32,
        hour: u32,
        minute: u32,
        place_name: impl Into<String>,
    ) -> Result<Self> {
        let event = BirthEvent {
            day,
            month,
            year,
            hour,
            minute,
            place_name: place_name.into(),
        };
        event.naive_datetime()?;
        if event.place_name.trim().is_empty() {
            return Err(ChartError::InvalidInput("place name is empty".to_string()));
        }
        Ok(event)
    }

    /// Parses `DD.MM.YYYY` and `HH:MM` input, checked against today's UTC date.
    pub fn parse(date: &str, time: &str, place: &str) -> Result<Self> {
        Self::parse_on(date, time, place, chrono::Utc::now().date_naive())
    }

    /// Like [`BirthEvent::parse`], with an explicit reference date.
    pub fn parse_on(date: &str, time: &str, place: &str, today: NaiveDate) -> Result<Self> {
        if !has_shape(date.trim(), "00.00.0000") {
            return Err(ChartError::InvalidInput(format!(
                "invalid date {date:?}, expected DD.MM.YYYY"
            )));
        }
        if !has_shape(time.trim(), "00:00") {
            return Err(ChartError::InvalidInput(format!(
                "invalid time {time:?}, expected HH:MM"
            )));
        }
        let date = NaiveDate::parse_from_str(date.trim(), "%d.%m.%Y").map_err(|e| {
            ChartError::InvalidInput(format!("invalid date {date:?}, expected DD.MM.YYYY: {e}"))
        })?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|e| {
            ChartError::InvalidInput(format!("invalid time {time:?}, expected HH:MM: {e}"))
        })?;

        if date > today {
            return Err(ChartError::InvalidInput(
                "birth date cannot be in the future".to_string(),
            ));
        }
        let had_birthday = (today.month(), today.day()) >= (date.month(), date.day());
        let age = today.year() - date.year() - i32::from(!had_birthday);
        if age > MAX_AGE_YEARS {
            return Err(ChartError::InvalidInput(format!(
                "birth date is more than {MAX_AGE_YEARS} years ago"
            )));
        }

        BirthEvent::new(
            date.day(),
            date.month(),
            date.year(),
            time.hour(),
            time.minute(),
            place.trim(),
        )
    }

    pub fn naive_datetime(&self) -> Result<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            ChartError::InvalidInput(format!(
                "{:02}.{:02}.{:04} is not a calendar date",
                self.day, self.month, self.year
            ))
        })?;
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or_else(|| {
            ChartError::InvalidInput(format!(
                "{:02}:{:02} is not a valid time of day",
                self.hour, self.minute
            ))
        })?;
        Ok(date.and_time(time))
    }
}

/// `0` in `shape` stands for any ASCII digit; other characters must match exactly.
fn has_shape(input: &str, shape: &str) -> bool {
    input.len() == shape.len()
        && input.bytes().zip(shape.bytes()).all(|(c, s)| match s {
            b'0' => c.is_ascii_digit(),
            _ => c == s,
        })
}

/// Geographic position in degrees, north and east positive.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ChartError::InvalidInput(format!(
                "latitude {latitude} out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ChartError::InvalidInput(format!(
                "longitude {longitude} out of range [-180, 180]"
            )));
        }
        Ok(GeoCoordinate {
            latitude,
            longitude,
        })
    }
}

/// Birth instant in UTC, after timezone localisation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInstant {
    pub utc: chrono::DateTime<chrono::Utc>,
}

impl ResolvedInstant {
    pub fn julian_day(&self) -> f64 {
        const UNIX_EPOCH_JD: f64 = 2_440_587.5;
        let seconds = self.utc.timestamp() as f64
            + f64::from(self.utc.timestamp_subsec_nanos()) / 1e9;
        UNIX_EPOCH_JD + seconds / 86_400.0
    }
}

/// Maps a longitude into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Ecliptic longitudes keyed by body. Missing bodies had no ephemeris data.
///
/// Serialised as a plain body-to-longitude map; deserialising goes through
/// [`BodyPositions::insert`], so stored values are always finite and in `[0, 360)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<CelestialBody, f64>",
    into = "BTreeMap<CelestialBody, f64>"
)]
pub struct BodyPositions {
    longitudes: BTreeMap<CelestialBody, f64>,
}

impl BodyPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a normalised longitude. Non-finite values are refused and leave the body absent.
    pub fn insert(&mut self, body: CelestialBody, longitude: f64) -> bool {
        if !longitude.is_finite() {
            return false;
        }
        self.longitudes.insert(body, normalize_degrees(longitude));
        true
    }

    pub fn get(&self, body: CelestialBody) -> Option<f64> {
        self.longitudes.get(&body).copied()
    }

    pub fn contains(&self, body: CelestialBody) -> bool {
        self.longitudes.contains_key(&body)
    }

    pub fn len(&self) -> usize {
        self.longitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.longitudes.is_empty()
    }

    /// Present bodies in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (CelestialBody, f64)> + '_ {
        self.longitudes.iter().map(|(body, lon)| (*body, *lon))
    }

    pub fn missing(&self) -> impl Iterator<Item = CelestialBody> + '_ {
        CelestialBody::iter().filter(|body| !self.contains(*body))
    }
}

impl FromIterator<(CelestialBody, f64)> for BodyPositions {
    fn from_iter<I: IntoIterator<Item = (CelestialBody, f64)>>(iter: I) -> Self {
        let mut positions = BodyPositions::new();
        for (body, longitude) in iter {
            positions.insert(body, longitude);
        }
        positions
    }
}

impl TryFrom<BTreeMap<CelestialBody, f64>> for BodyPositions {
    type Error = ChartError;

    fn try_from(map: BTreeMap<CelestialBody, f64>) -> Result<Self> {
        let mut positions = BodyPositions::new();
        for (body, longitude) in map {
            if !positions.insert(body, longitude) {
                return Err(ChartError::InvalidInput(format!(
                    "longitude for {body} is not finite: {longitude}"
                )));
            }
        }
        Ok(positions)
    }
}

impl From<BodyPositions> for BTreeMap<CelestialBody, f64> {
    fn from(positions: BodyPositions) -> Self {
        positions.longitudes
    }
}

/// A classified pair. `body_a` precedes `body_b` in canonical order.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub body_a: CelestialBody,
    pub body_b: CelestialBody,
    pub kind: AspectKind,
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.body_a, self.kind, self.body_b)
    }
}
