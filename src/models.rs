//! Data models shared by the control engine: readings, metrics, actuators,
//! user limits and forecast vectors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize};

// ---

/// One timestamped observation for a device, as stored in `sensor_logs`.
///
/// Every field is optional because the telemetry store does not enforce a
/// schema; the feature extractor decides which ones it needs. Devices that
/// report numbers as strings (`"23.5"`) are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    // ---
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub light_received: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub soil_moisture: Option<f64>,
}

/// A JSON number or a string holding one.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Int(n)) => Ok(Some(n as f64)),
        Some(NumberOrText::Float(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("'{text}' is not a number"))),
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Int(n)) => Ok(Some(n)),
        Some(NumberOrText::Float(n)) if n.is_finite() && n.fract() == 0.0 => Ok(Some(n as i64)),
        Some(NumberOrText::Float(n)) => Err(de::Error::custom(format!("{n} is not an integer"))),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("'{text}' is not an integer"))),
    }
}

/// Device ids become store keys and URL path segments, so they must be
/// non-empty, short, and free of whitespace, URL delimiters and RTDB key
/// metacharacters.
pub fn is_valid_device_id(device_id: &str) -> bool {
    // ---
    !device_id.is_empty()
        && device_id.len() <= 128
        && !device_id.chars().any(|c| {
            matches!(c, '.' | '$' | '#' | '[' | ']' | '/' | '?' | '%')
                || c.is_whitespace()
                || c.is_control()
        })
}

/// The four tracked metrics, each with its own forecasting model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temp,
    Hum,
    Light,
    Soil,
}

impl Metric {
    /// Evaluation order used everywhere a metric list is walked.
    pub const ALL: [Metric; 4] = [Metric::Temp, Metric::Hum, Metric::Light, Metric::Soil];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temp => "temp",
            Metric::Hum => "hum",
            Metric::Light => "light",
            Metric::Soil => "soil",
        }
    }

    /// File name of the persisted model artifact for this metric.
    pub fn artifact_file(self) -> String {
        format!("model_{}.json", self.as_str())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actuators the engine can command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuator {
    Fan,
    Heater,
    Irrigation,
    Lights,
}

impl Actuator {
    pub fn as_str(self) -> &'static str {
        match self {
            Actuator::Fan => "fan",
            Actuator::Heater => "heater",
            Actuator::Irrigation => "irrigation",
            Actuator::Lights => "lights",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Actuator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan" => Ok(Actuator::Fan),
            "heater" => Ok(Actuator::Heater),
            "irrigation" => Ok(Actuator::Irrigation),
            "lights" => Ok(Actuator::Lights),
            other => Err(format!("unknown actuator '{other}'")),
        }
    }
}

/// Sparse actuator state: only the keys present are written or reported.
pub type Commands = BTreeMap<Actuator, bool>;

// ---

pub const DEFAULT_MAX_TEMP: f64 = 28.0;
pub const DEFAULT_MIN_TEMP: f64 = 18.0;
pub const DEFAULT_MAX_HUM: f64 = 70.0;
pub const DEFAULT_SOIL_DRY_LIMIT: f64 = 3000.0;

/// User-supplied thresholds for one decision cycle. Never persisted.
///
/// Field names follow the dashboard's JSON keys; `soilLimit` is the wire
/// name, `soilDryLimit` is accepted as an alias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    // ---
    #[serde(rename = "maxTemp", default = "default_max_temp")]
    pub max_temp: f64,

    #[serde(rename = "minTemp", default = "default_min_temp")]
    pub min_temp: f64,

    #[serde(rename = "maxHum", default = "default_max_hum")]
    pub max_hum: f64,

    /// Raw soil sensor value above which the soil counts as dry.
    #[serde(
        rename = "soilLimit",
        alias = "soilDryLimit",
        default = "default_soil_dry_limit"
    )]
    pub soil_dry_limit: f64,
}

fn default_max_temp() -> f64 {
    DEFAULT_MAX_TEMP
}

fn default_min_temp() -> f64 {
    DEFAULT_MIN_TEMP
}

fn default_max_hum() -> f64 {
    DEFAULT_MAX_HUM
}

fn default_soil_dry_limit() -> f64 {
    DEFAULT_SOIL_DRY_LIMIT
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_temp: DEFAULT_MAX_TEMP,
            min_temp: DEFAULT_MIN_TEMP,
            max_hum: DEFAULT_MAX_HUM,
            soil_dry_limit: DEFAULT_SOIL_DRY_LIMIT,
        }
    }
}

/// One single-step-ahead forecast per metric. `None` means no prediction was
/// available this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ForecastVector {
    // ---
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub light: Option<f64>,
    pub soil: Option<f64>,
}

impl ForecastVector {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temp => self.temp,
            Metric::Hum => self.hum,
            Metric::Light => self.light,
            Metric::Soil => self.soil,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        let slot = match metric {
            Metric::Temp => &mut self.temp,
            Metric::Hum => &mut self.hum,
            Metric::Light => &mut self.light,
            Metric::Soil => &mut self.soil,
        };
        *slot = Some(value);
    }

    /// Value used by the decision rules: absent predictions read as 0.
    pub fn value_or_neutral(&self, metric: Metric) -> f64 {
        self.get(metric).unwrap_or(0.0)
    }
}
