//! Forecast ensemble: up to four independently trained predictors, one per
//! metric, all fed the same feature vector.
//!
//! Predictors are read-only after startup and shared across concurrent
//! cycles. A predictor that is missing or fails is dropped for the cycle
//! and reported as a warning; it never aborts the forecast.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::features::{FeatureMode, FeatureVector};
use crate::models::{ForecastVector, Metric};

// ---

/// A trained single-step-ahead model for one metric.
pub trait Predictor: Send + Sync {
    /// Feature set this model was trained on.
    fn mode(&self) -> FeatureMode;

    fn predict(&self, features: &FeatureVector) -> Result<f64, String>;
}

/// Serialized form of a linear regression model, one JSON file per metric.
///
/// ```json
/// {"features": ["temperature", "humidity", "light_received", "soil_moisture"],
///  "intercept": 0.4, "coefficients": [0.98, 0.0, 0.0, 0.0]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModelArtifact {
    // ---
    pub features: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

/// `intercept + Σ coefficient_i * feature_i`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    mode: FeatureMode,
    intercept: f64,
    coefficients: [f64; 4],
}

impl LinearModel {
    pub fn new(mode: FeatureMode, intercept: f64, coefficients: [f64; 4]) -> Self {
        Self {
            mode,
            intercept,
            coefficients,
        }
    }
}

impl TryFrom<LinearModelArtifact> for LinearModel {
    type Error = String;

    fn try_from(artifact: LinearModelArtifact) -> Result<Self, Self::Error> {
        // ---
        let mode = FeatureMode::from_feature_names(artifact.features.as_slice())
            .ok_or_else(|| format!("unsupported feature list {:?}", artifact.features))?;

        let coefficients: [f64; 4] = artifact.coefficients.as_slice().try_into().map_err(|_| {
            format!(
                "expected 4 coefficients, found {}",
                artifact.coefficients.len()
            )
        })?;

        if !artifact.intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err("artifact contains non-finite parameters".to_string());
        }

        Ok(Self::new(mode, artifact.intercept, coefficients))
    }
}

impl Predictor for LinearModel {
    fn mode(&self) -> FeatureMode {
        self.mode
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, String> {
        // ---
        if features.mode() != self.mode {
            return Err(format!(
                "model expects {} features, got {}",
                self.mode,
                features.mode()
            ));
        }

        let value = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.values())
                .map(|(c, x)| c * x)
                .sum::<f64>();

        if value.is_finite() {
            Ok(value)
        } else {
            Err("prediction is not finite".to_string())
        }
    }
}

// ---

/// Result of one ensemble pass: the forecasts that succeeded plus a soft
/// warning for every registered predictor that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    pub vector: ForecastVector,
    pub warnings: Vec<EngineError>,
}

pub struct Ensemble {
    mode: FeatureMode,
    predictors: BTreeMap<Metric, Box<dyn Predictor>>,
}

impl Ensemble {
    /// An empty ensemble; every metric forecasts as absent.
    pub fn new(mode: FeatureMode) -> Self {
        Self {
            mode,
            predictors: BTreeMap::new(),
        }
    }

    /// Register the predictor for `metric`, replacing any previous one.
    ///
    /// All predictors share one feature vector, so a predictor trained on a
    /// different feature set is a configuration error.
    pub fn with_predictor<P>(mut self, metric: Metric, predictor: P) -> EngineResult<Self>
    where
        P: Predictor + 'static,
    {
        // ---
        if predictor.mode() != self.mode {
            return Err(EngineError::Configuration(format!(
                "{metric} model uses {} features but the ensemble uses {}",
                predictor.mode(),
                self.mode
            )));
        }
        self.predictors.insert(metric, Box::new(predictor));
        Ok(self)
    }

    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        self.predictors.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    pub fn forecast(&self, features: &FeatureVector) -> Forecast {
        // ---
        let mut forecast = Forecast::default();

        for metric in Metric::ALL {
            let Some(predictor) = self.predictors.get(&metric) else {
                continue;
            };

            match predictor.predict(features) {
                Ok(value) => {
                    debug!(%metric, value, "forecast");
                    forecast.vector.set(metric, value);
                }
                Err(reason) => {
                    warn!(%metric, %reason, "predictor failed, dropping metric for this cycle");
                    forecast
                        .warnings
                        .push(EngineError::ModelUnavailable { metric, reason });
                }
            }
        }

        forecast
    }
}

impl std::fmt::Debug for Ensemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ensemble")
            .field("mode", &self.mode)
            .field("metrics", &self.predictors.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---

/// Load one artifact. A missing file yields `Ok(None)`; anything unreadable
/// or malformed is a configuration error.
pub fn load_artifact(path: &Path) -> EngineResult<Option<LinearModel>> {
    // ---
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(EngineError::Configuration(format!(
                "cannot read model '{}': {e}",
                path.display()
            )))
        }
    };

    let artifact: LinearModelArtifact = serde_json::from_str(&raw).map_err(|e| {
        EngineError::Configuration(format!("invalid model '{}': {e}", path.display()))
    })?;

    LinearModel::try_from(artifact)
        .map(Some)
        .map_err(|e| EngineError::Configuration(format!("invalid model '{}': {e}", path.display())))
}

/// Load `model_{temp,hum,light,soil}.json` from `dir`.
///
/// The ensemble's feature mode comes from the artifacts themselves; they
/// must all agree. With no artifacts present the ensemble is empty and
/// defaults to current-state mode.
pub fn load_ensemble(dir: &Path) -> EngineResult<Ensemble> {
    // ---
    let mut loaded = Vec::new();
    for metric in Metric::ALL {
        let path = dir.join(metric.artifact_file());
        match load_artifact(&path)? {
            Some(model) => loaded.push((metric, model)),
            None => warn!(
                %metric,
                path = %path.display(),
                "model artifact not found, metric will not be forecast"
            ),
        }
    }

    let mode = loaded
        .first()
        .map(|(_, model)| model.mode())
        .unwrap_or(FeatureMode::CurrentState);

    let mut ensemble = Ensemble::new(mode);
    for (metric, model) in loaded {
        ensemble = ensemble.with_predictor(metric, model)?;
    }

    info!(
        %mode,
        metrics = ?ensemble.metrics().collect::<Vec<_>>(),
        "forecast ensemble loaded"
    );
    Ok(ensemble)
}

/// Load the temperature-only lag model behind the legacy `/predict` route.
pub fn load_legacy_model(path: &Path) -> EngineResult<Option<LinearModel>> {
    // ---
    let Some(model) = load_artifact(path)? else {
        warn!(path = %path.display(), "legacy temperature model not found, /predict disabled");
        return Ok(None);
    };

    if model.mode() != FeatureMode::Lag {
        return Err(EngineError::Configuration(format!(
            "legacy model '{}' must use lag features",
            path.display()
        )));
    }
    Ok(Some(model))
}
