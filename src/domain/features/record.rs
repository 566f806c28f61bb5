use crate::domain::errors::MergeError;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

pub const AQI_RANGE: RangeInclusive<f64> = 0.0..=500.0;
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 0.0..=100.0;
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = -60.0..=60.0;
pub const PRESSURE_RANGE: RangeInclusive<f64> = 800.0..=1100.0;
pub const WIND_SPEED_RANGE: RangeInclusive<f64> = 0.0..=100.0;
pub const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
pub const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;

/// Dominant pollutant reported by the monitoring station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl FromStr for Pollutant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pm25" => Ok(Pollutant::Pm25),
            "pm10" => Ok(Pollutant::Pm10),
            "o3" => Ok(Pollutant::O3),
            "no2" => Ok(Pollutant::No2),
            "so2" => Ok(Pollutant::So2),
            "co" => Ok(Pollutant::Co),
            other => Err(format!("unknown pollutant '{}'", other)),
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        };
        write!(f, "{}", label)
    }
}

/// A record as produced by the upstream collector. Every field is optional
/// here; `FeatureRecord::from_raw` decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatureRecord {
    pub entity_id: Option<String>,
    /// Naive (`2024-03-01 10:00:00`) or offset-aware (`2024-03-01T15:00:00+05:00`)
    pub timestamp: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub aqi: Option<f64>,
    pub dominant_pollutant: Option<String>,
    pub pm25: Option<f64>,
    pub dew: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub temp: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Identity of a record in the canonical dataset. Ordered by time first so
/// that a `BTreeMap<FeatureKey, _>` iterates chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey {
    pub timestamp: DateTime<Utc>,
    pub entity_id: String,
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity_id, self.timestamp.to_rfc3339())
    }
}

/// Validated, UTC-normalized feature record.
///
/// Flat on purpose: the canonical log is a CSV file and every field maps to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    /// Run that produced the bundle this record came from
    pub source_run: u64,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub aqi: f64,
    pub dominant_pollutant: Option<Pollutant>,
    pub pm25: Option<f64>,
    pub dew: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub temp: Option<f64>,
    pub wind_speed: Option<f64>,
    // Calendar features, always derived from `timestamp`
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub day_of_week: u32,
}

impl FeatureRecord {
    /// Validate a raw record and normalize its timestamp to UTC.
    ///
    /// Missing required fields, unparseable timestamps, non-finite numbers and
    /// out-of-range values are rejected; nothing is clamped or coerced.
    pub fn from_raw(raw: &RawFeatureRecord, source_run: u64) -> Result<Self, MergeError> {
        let entity_id = raw
            .entity_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid(raw, "missing entity_id"))?
            .to_string();

        let raw_ts = raw
            .timestamp
            .as_deref()
            .ok_or_else(|| invalid(raw, "missing timestamp"))?;
        let timestamp = normalize_timestamp(raw_ts).map_err(|reason| invalid(raw, &reason))?;

        let aqi = raw.aqi.ok_or_else(|| invalid(raw, "missing aqi"))?;
        check_range(raw, "aqi", Some(aqi), &AQI_RANGE)?;
        check_range(raw, "pm25", raw.pm25, &AQI_RANGE)?;
        check_range(raw, "humidity", raw.humidity, &HUMIDITY_RANGE)?;
        check_range(raw, "temp", raw.temp, &TEMPERATURE_RANGE)?;
        check_range(raw, "dew", raw.dew, &TEMPERATURE_RANGE)?;
        check_range(raw, "pressure", raw.pressure, &PRESSURE_RANGE)?;
        check_range(raw, "wind_speed", raw.wind_speed, &WIND_SPEED_RANGE)?;
        check_range(raw, "latitude", raw.latitude, &LATITUDE_RANGE)?;
        check_range(raw, "longitude", raw.longitude, &LONGITUDE_RANGE)?;

        let dominant_pollutant = match raw.dominant_pollutant.as_deref() {
            None => None,
            Some(label) if label.trim().is_empty() => None,
            Some(label) => Some(label.parse::<Pollutant>().map_err(|e| invalid(raw, &e))?),
        };

        Ok(Self {
            entity_id,
            timestamp,
            source_run,
            city: raw
                .city
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            latitude: raw.latitude,
            longitude: raw.longitude,
            aqi,
            dominant_pollutant,
            pm25: raw.pm25,
            dew: raw.dew,
            humidity: raw.humidity,
            pressure: raw.pressure,
            temp: raw.temp,
            wind_speed: raw.wind_speed,
            hour: timestamp.hour(),
            day: timestamp.day(),
            month: timestamp.month(),
            year: timestamp.year(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
        })
    }

    pub fn key(&self) -> FeatureKey {
        FeatureKey {
            timestamp: self.timestamp,
            entity_id: self.entity_id.clone(),
        }
    }

    /// True when both records carry the same observation, ignoring provenance
    pub fn same_values(&self, other: &FeatureRecord) -> bool {
        FeatureRecord {
            source_run: other.source_run,
            ..self.clone()
        } == *other
    }
}

/// Coerce a naive or offset-aware timestamp string into UTC.
///
/// Naive values carry no zone information and are interpreted as UTC.
pub fn normalize_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive = value
        .strip_suffix(" UTC")
        .or_else(|| value.strip_suffix("UTC"))
        .unwrap_or(value)
        .trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Ok(dt.and_utc());
        }
    }

    Err(format!("unparseable timestamp '{}'", value))
}

fn check_range(
    raw: &RawFeatureRecord,
    field: &str,
    value: Option<f64>,
    range: &RangeInclusive<f64>,
) -> Result<(), MergeError> {
    match value {
        Some(v) if !v.is_finite() => Err(invalid(raw, &format!("{} is not finite", field))),
        Some(v) if !range.contains(&v) => Err(invalid(
            raw,
            &format!(
                "{}={} outside [{}, {}]",
                field,
                v,
                range.start(),
                range.end()
            ),
        )),
        _ => Ok(()),
    }
}

fn invalid(raw: &RawFeatureRecord, reason: &str) -> MergeError {
    MergeError::InvalidRecord {
        key: format!(
            "{}@{}",
            raw.entity_id.as_deref().unwrap_or("?"),
            raw.timestamp.as_deref().unwrap_or("?")
        ),
        reason: reason.to_string(),
    }
}
