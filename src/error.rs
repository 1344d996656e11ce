//! Error taxonomy for the forecast-and-decide engine.
//!
//! Stage-local failures abort the current control cycle. `ModelUnavailable`
//! is the exception: the ensemble records it as a warning and carries on
//! without that metric.

use thiserror::Error;

use crate::models::Metric;

// ---

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // ---
    /// Fewer readings than the feature mode needs.
    #[error("insufficient data: need {needed} readings, found {found}")]
    InsufficientData { needed: usize, found: usize },

    /// A reading lacks a field the feature mode consumes.
    #[error("reading is missing required field '{0}'")]
    MissingField(&'static str),

    /// Timestamp present but not representable as a UTC date-time.
    #[error("reading has invalid timestamp {0}")]
    InvalidTimestamp(i64),

    /// The telemetry store has nothing for this device yet.
    #[error("no telemetry for device '{0}'")]
    DeviceNotFound(String),

    #[error("model for '{metric}' unavailable: {reason}")]
    ModelUnavailable { metric: Metric, reason: String },

    /// Telemetry read failed.
    #[error("telemetry read failed: {0}")]
    Telemetry(String),

    /// Actuator write failed.
    #[error("actuator write failed: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
