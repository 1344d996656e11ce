//! `GET /predict`: legacy temperature-only forecast.
//!
//! Serves the older dashboard, which expects a single lag-feature
//! temperature model and its English reasoning strings. Nothing is
//! persisted.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, response::Response,
    routing::get, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{error_response, round_to, AppState};
use crate::control::legacy_temperature_forecast;
use crate::decision::Status;
use crate::error::EngineError;
use crate::models::{is_valid_device_id, Limits};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/predict", get(handler))
}

const HEAT_REASONING: &str = "🔥 Heat Spike Predicted! Strategy: Cooling (Fan ON)";
const COLD_REASONING: &str = "❄️ Drop Predicted! Strategy: Heating (Heater ON)";
const STABLE_REASONING: &str = "✅ Forecast Stable. No action needed.";
const GATHERING_MESSAGE: &str = "Gathering more data...";

/// Reasoning the legacy dashboard expects for a temperature forecast,
/// judged against the default temperature band.
fn legacy_reasoning(temp: f64) -> (&'static str, Status) {
    // ---
    let limits = Limits::default();
    if temp > limits.max_temp {
        (HEAT_REASONING, Status::Warning)
    } else if temp < limits.min_temp {
        (COLD_REASONING, Status::Warning)
    } else {
        (STABLE_REASONING, Status::Optimal)
    }
}

#[derive(Debug, Deserialize)]
struct PredictQuery {
    device_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    status: &'static str,
    predicted_temperature: f64,
    ai_reasoning: &'static str,
    ai_condition_status: Status,
}

async fn handler(
    Query(params): Query<PredictQuery>,
    State(state): State<AppState>,
) -> Response {
    // ---
    let Some(model) = state.legacy_model.clone() else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "legacy temperature model is not loaded",
        );
    };

    let Some(device_id) = params.device_id.or(state.legacy_device_id.clone()) else {
        return error_response(StatusCode::BAD_REQUEST, "device_id is required");
    };
    if !is_valid_device_id(&device_id) {
        return error_response(StatusCode::BAD_REQUEST, "device_id is invalid");
    }

    info!("GET /predict - device {}", device_id);

    let telemetry = &**state.control.telemetry();
    match legacy_temperature_forecast(telemetry, &model, &device_id).await {
        Ok(temp) => {
            let temp = round_to(temp, 2);
            let (reasoning, status) = legacy_reasoning(temp);
            let body = PredictResponse {
                status: "success",
                predicted_temperature: temp,
                ai_reasoning: reasoning,
                ai_condition_status: status,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e @ (EngineError::InsufficientData { .. }
        | EngineError::MissingField(_)
        | EngineError::InvalidTimestamp(_))) => {
            warn!("GET /predict - not enough data for {}: {}", device_id, e);
            let body = json!({
                "status": "error",
                "message": GATHERING_MESSAGE,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
        Err(e) => {
            warn!("GET /predict - failed for {}: {}", device_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
