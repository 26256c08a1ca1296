use chrono::{LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};
use tzf_rs::DefaultFinder;

use crate::{ChartError, GeoCoordinate, ResolvedInstant, Result};

/// Finds the IANA timezone covering a coordinate.
pub trait TimezoneLookup: Send + Sync {
    fn timezone_at(&self, coordinate: GeoCoordinate) -> Option<String>;
}

/// Offline polygon lookup backed by the tzf timezone boundary data.
pub struct TzfLookup {
    finder: DefaultFinder,
}

impl TzfLookup {
    pub fn new() -> Self {
        TzfLookup {
            finder: DefaultFinder::new(),
        }
    }
}

impl Default for TzfLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneLookup for TzfLookup {
    fn timezone_at(&self, coordinate: GeoCoordinate) -> Option<String> {
        let name = self
            .finder
            .get_tz_name(coordinate.longitude, coordinate.latitude);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Localises a naive birth time at `coordinate` and converts it to UTC.
///
/// Falls back to UTC when no timezone covers the coordinate or the name is
/// unknown to the rules database. Local times skipped or repeated by a DST
/// transition are reported as errors rather than resolved.
#[tracing::instrument(skip(lookup))]
pub fn resolve_instant(
    lookup: &dyn TimezoneLookup,
    coordinate: GeoCoordinate,
    local: NaiveDateTime,
) -> Result<ResolvedInstant> {
    let zone = match lookup.timezone_at(coordinate) {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = %name, "unknown timezone name, falling back to UTC");
                Tz::UTC
            }
        },
        None => {
            warn!("no timezone covers the coordinate, falling back to UTC");
            Tz::UTC
        }
    };

    let utc = localize(zone, local)?;
    info!(timezone = %zone.name(), %utc, "birth instant resolved");
    Ok(ResolvedInstant { utc })
}

/// Applies `zone`'s historical offset rules to `local`.
pub fn localize(zone: Tz, local: NaiveDateTime) -> Result<chrono::DateTime<Utc>> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, latest) => Err(ChartError::TimezoneAmbiguous {
            local: local.to_string(),
            timezone: zone.name().to_string(),
            earliest: earliest.to_rfc3339(),
            latest: latest.to_rfc3339(),
        }),
        LocalResult::None => Err(ChartError::TimezoneNonexistent {
            local: local.to_string(),
            timezone: zone.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::NaiveDate;

    struct Fixed(Option<&'static str>);

    impl TimezoneLookup for Fixed {
        fn timezone_at(&self, _: GeoCoordinate) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn somewhere() -> GeoCoordinate {
        GeoCoordinate::new(0.0, 0.0).unwrap()
    }

    #[test]
    fn missing_timezone_falls_back_to_utc() {
        let instant = resolve_instant(&Fixed(None), somewhere(), local(1991, 6, 18, 7, 10)).unwrap();
        assert_eq!(instant.utc, Utc.with_ymd_and_hms(1991, 6, 18, 7, 10, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_name_falls_back_to_utc() {
        let instant =
            resolve_instant(&Fixed(Some("Mars/Olympus_Mons")), somewhere(), local(2000, 1, 1, 0, 0))
                .unwrap();
        assert_eq!(instant.utc, Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn historical_offsets_are_honoured() {
        // Kerala, India: UTC+05:30 with no DST.
        let instant =
            resolve_instant(&Fixed(Some("Asia/Kolkata")), somewhere(), local(1991, 6, 18, 7, 10))
                .unwrap();
        assert_eq!(instant.utc, Utc.with_ymd_and_hms(1991, 6, 18, 1, 40, 0).unwrap());

        // British Summer Time in July, GMT in January.
        let london = Fixed(Some("Europe/London"));
        let summer = resolve_instant(&london, somewhere(), local(1991, 7, 1, 12, 0)).unwrap();
        assert_eq!(summer.utc, Utc.with_ymd_and_hms(1991, 7, 1, 11, 0, 0).unwrap());
        let winter = resolve_instant(&london, somewhere(), local(1991, 1, 1, 12, 0)).unwrap();
        assert_eq!(winter.utc, Utc.with_ymd_and_hms(1991, 1, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn spring_forward_gap_is_nonexistent() {
        let err = localize(chrono_tz::America::New_York, local(2021, 3, 14, 2, 30)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimezoneNonexistent);
    }

    #[test]
    fn fall_back_overlap_is_ambiguous() {
        let err = localize(chrono_tz::America::New_York, local(2021, 11, 7, 1, 30)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimezoneAmbiguous);
        assert!(err.to_string().contains("America/New_York"));
    }

    #[test]
    fn tzf_finds_known_cities() {
        let lookup = TzfLookup::new();
        let tokyo = GeoCoordinate::new(35.6762, 139.6503).unwrap();
        assert_eq!(lookup.timezone_at(tokyo).as_deref(), Some("Asia/Tokyo"));
    }
}
