//! Route gateway: merges every endpoint's subrouter and attaches the shared
//! state, so `main.rs` never touches individual endpoints.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::control::ControlLoop;
use crate::forecast::LinearModel;

mod health;
mod predict;
mod predict_and_control;
mod telemetry;

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub control: ControlLoop,
    /// Temperature-only lag model behind `GET /predict`; `None` disables it.
    pub legacy_model: Option<Arc<LinearModel>>,
    pub legacy_device_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(predict_and_control::router())
        .merge(predict::router())
        .merge(telemetry::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `{"error": message}` with the given status.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Round to `decimals` places, ties to even (what the dashboard's
/// numpy-based predecessor reported).
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_round_to() {
        // ---
        assert_eq!(round_to(31.44, 1), 31.4);
        assert_eq!(round_to(3499.6, 0), 3500.0);
        assert_eq!(round_to(22.004, 2), 22.0);

        // Exact ties go to the even neighbour.
        assert_eq!(round_to(2500.5, 0), 2500.0);
        assert_eq!(round_to(2501.5, 0), 2502.0);
        assert_eq!(round_to(-2.25, 1), -2.2);
    }
}
