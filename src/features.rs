//! Feature extraction: turns the most recent readings into the fixed-order
//! numeric vector the forecasting models consume.
//!
//! Two feature sets exist and are selected by the loaded model artifacts:
//!
//! | Mode            | Readings | Features                                               |
//! |-----------------|----------|--------------------------------------------------------|
//! | `Lag`           | 2        | `hour_of_day, temp_lag_1, hum_lag_1, light_lag_1`      |
//! | `CurrentState`  | 1        | `temperature, humidity, light_received, soil_moisture` |
//!
//! `hour_of_day` is the UTC hour of the latest reading's timestamp.

use std::fmt;

use chrono::{DateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::SensorReading;

// ---

const LAG_FEATURES: [&str; 4] = ["hour_of_day", "temp_lag_1", "hum_lag_1", "light_lag_1"];
const CURRENT_STATE_FEATURES: [&str; 4] =
    ["temperature", "humidity", "light_received", "soil_moisture"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    /// Hour of day plus the previous reading's values.
    Lag,
    /// The latest reading's raw values.
    CurrentState,
}

impl FeatureMode {
    pub const fn required_readings(self) -> usize {
        match self {
            FeatureMode::Lag => 2,
            FeatureMode::CurrentState => 1,
        }
    }

    pub const fn feature_names(self) -> [&'static str; 4] {
        match self {
            FeatureMode::Lag => LAG_FEATURES,
            FeatureMode::CurrentState => CURRENT_STATE_FEATURES,
        }
    }

    /// Identify the mode whose feature names match `names` exactly, in order.
    pub fn from_feature_names<S: AsRef<str>>(names: &[S]) -> Option<Self> {
        [FeatureMode::Lag, FeatureMode::CurrentState]
            .into_iter()
            .find(|mode| {
                let expected = mode.feature_names();
                names.len() == expected.len()
                    && names.iter().zip(expected).all(|(n, e)| n.as_ref() == e)
            })
    }
}

impl fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureMode::Lag => f.write_str("lag"),
            FeatureMode::CurrentState => f.write_str("current_state"),
        }
    }
}

/// Ordered feature values tagged with the mode that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    mode: FeatureMode,
    values: [f64; 4],
}

impl FeatureVector {
    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    pub fn values(&self) -> &[f64; 4] {
        &self.values
    }

    /// `(name, value)` pairs, handy for logging.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.mode.feature_names().into_iter().zip(self.values)
    }
}

// ---

/// Build the feature vector for `mode` from `readings` (oldest first,
/// most recent last). Extra leading readings are ignored.
pub fn extract(readings: &[SensorReading], mode: FeatureMode) -> EngineResult<FeatureVector> {
    // ---
    let needed = mode.required_readings();
    if readings.len() < needed {
        return Err(EngineError::InsufficientData {
            needed,
            found: readings.len(),
        });
    }

    let latest = &readings[readings.len() - 1];
    let values = match mode {
        FeatureMode::CurrentState => [
            field(latest.temperature, "temperature")?,
            field(latest.humidity, "humidity")?,
            field(latest.light_received, "light_received")?,
            field(latest.soil_moisture, "soil_moisture")?,
        ],
        FeatureMode::Lag => {
            let previous = &readings[readings.len() - 2];
            let temp_lag = field(previous.temperature, "temperature")?;
            let hum_lag = field(previous.humidity, "humidity")?;
            let light_lag = field(previous.light_received, "light_received")?;
            [hour_of_day(latest)?, temp_lag, hum_lag, light_lag]
        }
    };

    Ok(FeatureVector { mode, values })
}

fn field(value: Option<f64>, name: &'static str) -> EngineResult<f64> {
    value.ok_or(EngineError::MissingField(name))
}

fn hour_of_day(reading: &SensorReading) -> EngineResult<f64> {
    // ---
    let millis = reading
        .timestamp
        .ok_or(EngineError::MissingField("timestamp"))?;
    let at = DateTime::from_timestamp_millis(millis).ok_or(EngineError::InvalidTimestamp(millis))?;
    Ok(f64::from(at.hour()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    // 2023-11-14T22:13:20Z
    const TS_22H: i64 = 1_700_000_000_000;

    fn create_test_reading(ts: i64, temp: f64, hum: f64, light: f64, soil: f64) -> SensorReading {
        // ---
        SensorReading {
            timestamp: Some(ts),
            temperature: Some(temp),
            humidity: Some(hum),
            light_received: Some(light),
            soil_moisture: Some(soil),
        }
    }

    #[test]
    fn test_current_state_passes_latest_through() {
        // ---
        let readings = vec![
            create_test_reading(TS_22H - 60_000, 19.0, 40.0, 900.0, 1400.0),
            create_test_reading(TS_22H, 22.0, 50.0, 1000.0, 1500.0),
        ];

        let features = extract(&readings, FeatureMode::CurrentState).unwrap();
        assert_eq!(features.mode(), FeatureMode::CurrentState);
        assert_eq!(features.values(), &[22.0, 50.0, 1000.0, 1500.0]);
    }

    #[test]
    fn test_current_state_single_reading_succeeds() {
        // ---
        let readings = vec![create_test_reading(TS_22H, 22.0, 50.0, 1000.0, 1500.0)];
        assert!(extract(&readings, FeatureMode::CurrentState).is_ok());
    }

    #[test]
    fn test_lag_uses_previous_values_and_latest_hour() {
        // ---
        let readings = vec![
            create_test_reading(TS_22H - 3_600_000, 25.0, 60.0, 800.0, 2000.0),
            create_test_reading(TS_22H, 30.0, 70.0, 100.0, 2100.0),
        ];

        let features = extract(&readings, FeatureMode::Lag).unwrap();
        assert_eq!(features.values(), &[22.0, 25.0, 60.0, 800.0]);

        let names: Vec<_> = features.named().map(|(n, _)| n).collect();
        assert_eq!(names, LAG_FEATURES);
    }

    #[test]
    fn test_lag_needs_two_readings() {
        // ---
        let err = extract(&[], FeatureMode::Lag).unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { needed: 2, found: 0 });

        let single = vec![create_test_reading(TS_22H, 22.0, 50.0, 1000.0, 1500.0)];
        let err = extract(&single, FeatureMode::Lag).unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { needed: 2, found: 1 });
    }

    #[test]
    fn test_current_state_empty_is_insufficient() {
        // ---
        let err = extract(&[], FeatureMode::CurrentState).unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { needed: 1, found: 0 });
    }

    #[test]
    fn test_missing_field_is_rejected() {
        // ---
        let mut reading = create_test_reading(TS_22H, 22.0, 50.0, 1000.0, 1500.0);
        reading.soil_moisture = None;
        let err = extract(&[reading], FeatureMode::CurrentState).unwrap_err();
        assert_eq!(err, EngineError::MissingField("soil_moisture"));

        // Lag mode only reads the previous reading's values and the latest timestamp.
        let mut previous = create_test_reading(TS_22H - 60_000, 22.0, 50.0, 1000.0, 1500.0);
        previous.humidity = None;
        let latest = create_test_reading(TS_22H, 22.0, 50.0, 1000.0, 1500.0);
        let err = extract(&[previous, latest.clone()], FeatureMode::Lag).unwrap_err();
        assert_eq!(err, EngineError::MissingField("humidity"));

        let mut untimed = latest;
        untimed.timestamp = None;
        let previous = create_test_reading(TS_22H - 60_000, 22.0, 50.0, 1000.0, 1500.0);
        let err = extract(&[previous, untimed], FeatureMode::Lag).unwrap_err();
        assert_eq!(err, EngineError::MissingField("timestamp"));
    }

    #[test]
    fn test_lag_ignores_missing_soil() {
        // ---
        let mut previous = create_test_reading(TS_22H - 60_000, 22.0, 50.0, 1000.0, 0.0);
        previous.soil_moisture = None;
        let mut latest = create_test_reading(TS_22H, 22.0, 50.0, 1000.0, 0.0);
        latest.soil_moisture = None;
        latest.temperature = None;

        assert!(extract(&[previous, latest], FeatureMode::Lag).is_ok());
    }

    #[test]
    fn test_mode_from_feature_names() {
        // ---
        assert_eq!(
            FeatureMode::from_feature_names(&LAG_FEATURES),
            Some(FeatureMode::Lag)
        );
        assert_eq!(
            FeatureMode::from_feature_names(&CURRENT_STATE_FEATURES),
            Some(FeatureMode::CurrentState)
        );

        // Same names, wrong order
        let shuffled = ["temp_lag_1", "hour_of_day", "hum_lag_1", "light_lag_1"];
        assert_eq!(FeatureMode::from_feature_names(&shuffled), None);

        // The three-feature variant without hour_of_day is not supported
        let short = ["temp_lag_1", "hum_lag_1", "light_lag_1"];
        assert_eq!(FeatureMode::from_feature_names(&short), None);
    }
}
