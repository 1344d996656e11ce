//! Ingestion and read-back endpoints around the stores:
//!
//! - `POST /sensor_logs/{device_id}` appends a reading
//! - `GET /actuator_controls/{device_id}` returns persisted actuator state

use axum::{
    extract::rejection::JsonRejection, extract::Path, extract::State, http::StatusCode,
    response::IntoResponse, response::Response, routing::get, routing::post, Json, Router,
};
use serde_json::json;
use tracing::{debug, error};

use super::{error_response, AppState};
use crate::models::{is_valid_device_id, SensorReading};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/sensor_logs/{device_id}", post(append_reading))
        .route("/actuator_controls/{device_id}", get(actuator_state))
}

async fn append_reading(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<SensorReading>, JsonRejection>,
) -> Response {
    // ---
    if !is_valid_device_id(&device_id) {
        return error_response(StatusCode::BAD_REQUEST, "device_id is invalid");
    }
    let Json(reading) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state.control.telemetry().append(&device_id, &reading).await {
        Ok(key) => {
            debug!("Stored reading {} for {}", key, device_id);
            (StatusCode::CREATED, Json(json!({ "key": key }))).into_response()
        }
        Err(e) => {
            error!("Failed to store reading for {}: {}", device_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn actuator_state(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    // ---
    if !is_valid_device_id(&device_id) {
        return error_response(StatusCode::BAD_REQUEST, "device_id is invalid");
    }

    match state.control.actuators().current(&device_id).await {
        Ok(commands) => (StatusCode::OK, Json(commands)).into_response(),
        Err(e) => {
            error!("Failed to read actuators for {}: {}", device_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
