//! Application entry point for the `codemetal-agrocontrol` service.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting the configured telemetry/actuator store (creating the
//!   PostgreSQL schema when that backend is selected)
//! - Loading the forecasting model artifacts
//! - Starting the periodic control loop when `CONTROL_DEVICES` is set
//! - Mounting all API routes via the `routes` gateway and serving until
//!   Ctrl-C
//!
//! # Environment Variables
//! See [`agrocontrol::config::load_from_env`] for the store and control
//! settings. Logging is controlled by:
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `FORCE_COLOR` (optional) – force ANSI colors on or off
use std::{env, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::{anyhow, Result};

use agrocontrol::config::{self, StoreBackend};
use agrocontrol::forecast::{load_ensemble, load_legacy_model};
use agrocontrol::routes::{self, AppState};
use agrocontrol::schema;
use agrocontrol::store::{ActuatorStore, FirebaseStore, MemoryStore, PgStore, TelemetryStore};
use agrocontrol::ControlLoop;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let (telemetry, actuators) = connect_stores(&cfg.backend).await?;

    let ensemble = load_ensemble(&cfg.model_dir)
        .map_err(|e| anyhow!("Failed to load models from '{}': {}", cfg.model_dir.display(), e))?;
    if ensemble.is_empty() {
        tracing::warn!("No forecasting models loaded, every cycle will report a stable forecast");
    }
    let legacy_model = load_legacy_model(&cfg.legacy_model_file)
        .map_err(|e| anyhow!("Failed to load legacy model: {}", e))?
        .map(Arc::new);

    let mut control = ControlLoop::new(telemetry, actuators, Arc::new(ensemble));
    if cfg.single_flight {
        control = control.with_single_flight();
    }

    let cancel = CancellationToken::new();
    let periodic = if cfg.control_devices.is_empty() {
        None
    } else {
        let control = control.clone();
        let devices = cfg.control_devices.clone();
        let every = cfg.control_interval;
        let cancel = cancel.clone();
        Some(tokio::spawn(async move {
            control.run_periodic(devices, every, cancel).await;
        }))
    };

    // Build app from routes gateway
    let app: Router = routes::router(AppState {
        control,
        legacy_model,
        legacy_device_id: cfg.legacy_device_id.clone(),
    });

    tracing::info!("Listening on {}", cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = periodic {
        if let Err(e) = handle.await {
            tracing::warn!("Periodic control loop ended abnormally: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Build the telemetry and actuator stores for the selected backend.
async fn connect_stores(
    backend: &StoreBackend,
) -> Result<(Arc<dyn TelemetryStore>, Arc<dyn ActuatorStore>)> {
    // ---
    match backend {
        StoreBackend::Postgres { db_url, db_pool_max } => {
            tracing::info!("Attempting to connect to database");

            let pool = PgPoolOptions::new()
                .max_connections(*db_pool_max)
                .connect(db_url)
                .await
                .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

            tracing::info!("Successfully connected to database");

            schema::create_schema(&pool).await?;

            let store = Arc::new(PgStore::new(pool));
            let telemetry: Arc<dyn TelemetryStore> = store.clone();
            let actuators: Arc<dyn ActuatorStore> = store;
            Ok((telemetry, actuators))
        }
        StoreBackend::Firebase { db_url, auth_token } => {
            let store = FirebaseStore::new(db_url, auth_token)
                .map_err(|e| anyhow!("Failed to set up Firebase store: {}", e))?;
            let store = Arc::new(store);
            let telemetry: Arc<dyn TelemetryStore> = store.clone();
            let actuators: Arc<dyn ActuatorStore> = store;
            Ok((telemetry, actuators))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            let telemetry: Arc<dyn TelemetryStore> = store.clone();
            let actuators: Arc<dyn ActuatorStore> = store;
            Ok((telemetry, actuators))
        }
    }
}

/// Resolve on Ctrl-C and stop the periodic loop alongside the server.
async fn shutdown_signal(cancel: CancellationToken) {
    // ---
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    cancel.cancel();
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off  
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
