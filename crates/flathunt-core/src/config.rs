use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::AppError;
use crate::filter::{
    AreaFilter, Bounds, DistrictFilter, FilterChain, PriceToAreaRatioFilter, RoomCountFilter,
    YearBuiltFilter,
};

/// Format of `PROCESS_FROM_DATE`.
pub const CUTOFF_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timezone of the source channel's wall-clock timestamps.
pub const DEFAULT_SOURCE_TIMEZONE: Tz = chrono_tz::Europe::Warsaw;

/// Pause after a listing site refuses access.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(300);

/// Settings for the per-message state machine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Messages sent before this instant are stale.
    pub cutoff: DateTime<Utc>,
    /// Chat that receives accepted adverts.
    pub destination: i64,
    /// Pause after a forbidden response.
    pub backoff: Duration,
}

impl PipelineConfig {
    pub fn new(cutoff: DateTime<Utc>, destination: i64) -> Self {
        Self {
            cutoff,
            destination,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` cutoff local to `tz` into a UTC instant.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
pub fn parse_cutoff(raw: &str, tz: Tz) -> Result<DateTime<Utc>, AppError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), CUTOFF_FORMAT).map_err(|e| {
        AppError::ConfigError(format!(
            "Invalid cutoff '{raw}': {e} (expected {CUTOFF_FORMAT})"
        ))
    })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            AppError::ConfigError(format!("Cutoff '{raw}' does not exist in timezone {tz}"))
        })
}

/// Parse an IANA timezone name.
pub fn parse_timezone(raw: &str) -> Result<Tz, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ConfigError(format!("Unknown timezone '{raw}'")))
}

/// Thresholds for the acceptance filters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub min_rooms: i32,
    pub max_rooms: i32,
    pub include_districts: BTreeSet<String>,
    pub exclude_districts: BTreeSet<String>,
    pub area: Bounds<f64>,
    pub price_to_area: Bounds<f64>,
    /// Unbounded disables the year-built filter.
    pub year_built: Bounds<i32>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_rooms: 3,
            max_rooms: 4,
            include_districts: BTreeSet::new(),
            exclude_districts: ["Praga_Południe", "Praga_Północ", "Białołęka"]
                .into_iter()
                .map(String::from)
                .collect(),
            area: Bounds::new(Some(50.0), Some(200.0)),
            price_to_area: Bounds::new(Some(60.0), Some(110.0)),
            year_built: Bounds::default(),
        }
    }
}

impl FilterConfig {
    /// Read thresholds from environment variables, defaulting what is unset.
    ///
    /// - `FILTER_MIN_ROOMS` / `FILTER_MAX_ROOMS`
    /// - `FILTER_INCLUDE_DISTRICTS` / `FILTER_EXCLUDE_DISTRICTS` (comma separated)
    /// - `FILTER_MIN_AREA` / `FILTER_MAX_AREA`
    /// - `FILTER_MIN_RATIO` / `FILTER_MAX_RATIO`
    /// - `FILTER_MIN_YEAR` / `FILTER_MAX_YEAR`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            min_rooms: parse_var(&var, "FILTER_MIN_ROOMS")?.unwrap_or(defaults.min_rooms),
            max_rooms: parse_var(&var, "FILTER_MAX_ROOMS")?.unwrap_or(defaults.max_rooms),
            include_districts: var("FILTER_INCLUDE_DISTRICTS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.include_districts),
            exclude_districts: var("FILTER_EXCLUDE_DISTRICTS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.exclude_districts),
            area: Bounds::new(
                parse_var(&var, "FILTER_MIN_AREA")?.or(defaults.area.min),
                parse_var(&var, "FILTER_MAX_AREA")?.or(defaults.area.max),
            ),
            price_to_area: Bounds::new(
                parse_var(&var, "FILTER_MIN_RATIO")?.or(defaults.price_to_area.min),
                parse_var(&var, "FILTER_MAX_RATIO")?.or(defaults.price_to_area.max),
            ),
            year_built: Bounds::new(
                parse_var(&var, "FILTER_MIN_YEAR")?,
                parse_var(&var, "FILTER_MAX_YEAR")?,
            ),
        };

        if config.min_rooms > config.max_rooms {
            return Err(AppError::ConfigError(format!(
                "FILTER_MIN_ROOMS ({}) is greater than FILTER_MAX_ROOMS ({})",
                config.min_rooms, config.max_rooms
            )));
        }

        Ok(config)
    }

    /// Build the chain in its fixed order. The year-built filter is only
    /// added when at least one bound is set.
    pub fn build_chain(&self) -> FilterChain {
        let chain = FilterChain::new()
            .with(RoomCountFilter {
                min: self.min_rooms,
                max: self.max_rooms,
            })
            .with(DistrictFilter {
                include: self.include_districts.clone(),
                exclude: self.exclude_districts.clone(),
            })
            .with(AreaFilter { bounds: self.area })
            .with(PriceToAreaRatioFilter {
                bounds: self.price_to_area,
            });

        if self.year_built.is_unbounded() {
            chain
        } else {
            chain.with(YearBuiltFilter {
                bounds: self.year_built,
            })
        }
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, AppError> {
    match var(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::ConfigError(format!("Invalid {key} '{raw}'"))),
    }
}

fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_cutoff_localises_in_source_timezone() {
        let cutoff = parse_cutoff("2024-08-31 12:00:00", DEFAULT_SOURCE_TIMEZONE).unwrap();
        // CEST is UTC+2 in August
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 8, 31, 10, 0, 0).unwrap());

        let winter = parse_cutoff("2024-01-15 12:00:00", DEFAULT_SOURCE_TIMEZONE).unwrap();
        assert_eq!(winter, Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_cutoff_rejects_malformed() {
        let err = parse_cutoff("31/08/2024", DEFAULT_SOURCE_TIMEZONE).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_parse_cutoff_rejects_nonexistent_local_time() {
        // Clocks jump from 02:00 to 03:00 on 2024-03-31 in Warsaw
        assert!(parse_cutoff("2024-03-31 02:30:00", DEFAULT_SOURCE_TIMEZONE).is_err());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Europe/Warsaw").unwrap(), chrono_tz::Europe::Warsaw);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_filter_config_defaults_when_unset() {
        let config = FilterConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, FilterConfig::default());
        assert_eq!(config.build_chain().len(), 4);
    }

    #[test]
    fn test_filter_config_overrides() {
        let config = FilterConfig::from_lookup(lookup(&[
            ("FILTER_MIN_ROOMS", "2"),
            ("FILTER_MAX_ROOMS", "5"),
            ("FILTER_INCLUDE_DISTRICTS", "Mokotów, Wola,,"),
            ("FILTER_EXCLUDE_DISTRICTS", ""),
            ("FILTER_MAX_AREA", "120.5"),
            ("FILTER_MIN_YEAR", "2017"),
        ]))
        .unwrap();

        assert_eq!((config.min_rooms, config.max_rooms), (2, 5));
        assert_eq!(
            config.include_districts.iter().collect::<Vec<_>>(),
            vec!["Mokotów", "Wola"]
        );
        // Empty value falls back to the default list
        assert_eq!(config.exclude_districts, FilterConfig::default().exclude_districts);
        assert_eq!(config.area, Bounds::new(Some(50.0), Some(120.5)));
        assert_eq!(config.year_built, Bounds::new(Some(2017), None));
        assert_eq!(config.build_chain().len(), 5);
    }

    #[test]
    fn test_filter_config_rejects_malformed_numbers() {
        let err = FilterConfig::from_lookup(lookup(&[("FILTER_MIN_AREA", "fifty")])).unwrap_err();
        assert!(err.to_string().contains("FILTER_MIN_AREA"));
    }

    #[test]
    fn test_filter_config_rejects_inverted_room_range() {
        let err = FilterConfig::from_lookup(lookup(&[
            ("FILTER_MIN_ROOMS", "5"),
            ("FILTER_MAX_ROOMS", "2"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
