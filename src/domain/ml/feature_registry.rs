use crate::domain::features::FeatureRecord;

/// Ordered list of model input features.
/// Any change here is a breaking change for stored model artifacts.
pub const FEATURE_NAMES: &[&str] = &[
    "hour",
    "day_of_week",
    "month",
    "year",
    "temp",
    "humidity",
    "pressure",
    "wind_speed",
    "dew",
    "pm25",
];

/// Column the models predict. Never part of `FEATURE_NAMES`.
pub const TARGET_NAME: &str = "aqi";

/// Fallbacks used when an entity has never reported a weather value
pub const DEFAULT_TEMP: f64 = 20.0;
pub const DEFAULT_HUMIDITY: f64 = 50.0;
pub const DEFAULT_PRESSURE: f64 = 1013.25;
pub const DEFAULT_WIND_SPEED: f64 = 0.0;
pub const DEFAULT_DEW: f64 = 10.0;
pub const DEFAULT_PM25: f64 = 0.0;

/// Forward-fill state for one entity. Feed it that entity's records in
/// chronological order.
#[derive(Debug, Clone, Default)]
pub struct ForwardFill {
    temp: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
    wind_speed: Option<f64>,
    dew: Option<f64>,
    pm25: Option<f64>,
}

impl ForwardFill {
    /// Copy of `record` with missing weather values replaced by the most
    /// recent prior value of the same entity. Values never observed stay `None`.
    pub fn fill_record(&mut self, record: &FeatureRecord) -> FeatureRecord {
        let mut filled = record.clone();
        filled.temp = carry(&mut self.temp, record.temp);
        filled.humidity = carry(&mut self.humidity, record.humidity);
        filled.pressure = carry(&mut self.pressure, record.pressure);
        filled.wind_speed = carry(&mut self.wind_speed, record.wind_speed);
        filled.dew = carry(&mut self.dew, record.dew);
        filled.pm25 = carry(&mut self.pm25, record.pm25);
        filled
    }

    /// Builds the feature vector for `record`, filling gaps from the most
    /// recent prior value of the same entity, then from the defaults.
    pub fn fill(&mut self, record: &FeatureRecord) -> Vec<f64> {
        features_to_vector(&self.fill_record(record))
    }
}

fn carry(last: &mut Option<f64>, current: Option<f64>) -> Option<f64> {
    if current.is_some() {
        *last = current;
    }
    *last
}

/// Feature vector of a single record. Gaps take the defaults, so callers
/// holding history should pass a record from `ForwardFill::fill_record`.
pub fn features_to_vector(record: &FeatureRecord) -> Vec<f64> {
    vec![
        f64::from(record.hour),
        f64::from(record.day_of_week),
        f64::from(record.month),
        f64::from(record.year),
        record.temp.unwrap_or(DEFAULT_TEMP),
        record.humidity.unwrap_or(DEFAULT_HUMIDITY),
        record.pressure.unwrap_or(DEFAULT_PRESSURE),
        record.wind_speed.unwrap_or(DEFAULT_WIND_SPEED),
        record.dew.unwrap_or(DEFAULT_DEW),
        record.pm25.unwrap_or(DEFAULT_PM25),
    ]
}
