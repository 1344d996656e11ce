//! `POST /predict_and_control`: run one control cycle for a device and
//! report the forecast, the decision and its rationale.

use axum::{
    extract::rejection::JsonRejection, extract::State, http::StatusCode, response::IntoResponse,
    response::Response, routing::post, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{error_response, round_to, AppState};
use crate::control::CycleReport;
use crate::decision::Status;
use crate::error::EngineError;
use crate::messages::{render, Lang, ReasonCode};
use crate::models::{is_valid_device_id, Commands, Limits, Metric};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/predict_and_control", post(handler))
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    device_id: Option<String>,
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    lang: Lang,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    // ---
    predicted_temperature: f64,
    predicted_humidity: f64,
    predicted_soil: f64,
    predicted_light: f64,
    ai_reasoning: String,
    ai_condition_status: Status,
    commands: Commands,
    warnings: Vec<String>,
}

impl From<CycleReport> for ControlResponse {
    fn from(report: CycleReport) -> Self {
        // ---
        let forecast = report.forecast;
        Self {
            predicted_temperature: round_to(forecast.value_or_neutral(Metric::Temp), 1),
            predicted_humidity: round_to(forecast.value_or_neutral(Metric::Hum), 1),
            predicted_soil: round_to(forecast.value_or_neutral(Metric::Soil), 0),
            predicted_light: round_to(forecast.value_or_neutral(Metric::Light), 0),
            ai_reasoning: report.decision.message,
            ai_condition_status: report.decision.status,
            commands: report.decision.commands,
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WaitingResponse {
    status: &'static str,
    message: String,
}

async fn handler(
    State(state): State<AppState>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Response {
    // ---
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("POST /predict_and_control - rejected body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let Some(device_id) = request.device_id.filter(|d| !d.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "device_id is required");
    };
    if !is_valid_device_id(&device_id) {
        return error_response(StatusCode::BAD_REQUEST, "device_id is invalid");
    }

    info!("POST /predict_and_control - device {}", device_id);

    match state
        .control
        .run_cycle(&device_id, &request.limits, request.lang)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(ControlResponse::from(report))).into_response(),
        Err(EngineError::DeviceNotFound(_)) => {
            info!("No telemetry yet for {}, waiting", device_id);
            let waiting = WaitingResponse {
                status: "waiting",
                message: render(ReasonCode::Gathering, None, request.lang),
            };
            (StatusCode::OK, Json(waiting)).into_response()
        }
        Err(e) => {
            error!("Control cycle failed for {}: {}", device_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
